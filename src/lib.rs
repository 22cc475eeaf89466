//! FastConvert - Concurrent Batch Upload Converter
//!
//! Accepts a batch of uploaded images, stores each original in an upload
//! directory and converts it to lossy WebP next to the original, processing
//! every file of the batch in parallel.
//!
//! # Features
//!
//! - **Parallel Batches**: One conversion unit per file, joined in input order
//! - **Content Sniffing**: Input format detected from magic bytes, not names
//! - **Single Output Codec**: WebP at a fixed, configurable quality
//! - **HTTP Boundary**: Multipart `POST /upload` endpoint built on axum
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use fastconvert::{BatchCoordinator, ConversionConfig, FileDescriptor};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = BatchCoordinator::new(
//!     ConversionConfig::new().upload_dir("uploads").quality(80.0)
//! );
//!
//! let batch = vec![
//!     FileDescriptor::from_path("a.png"),
//!     FileDescriptor::from_path("b.jpg"),
//! ];
//!
//! for path in coordinator.process(batch).await?.into_result()? {
//!     println!("Converted: {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod parallel;
pub mod processing;
pub mod server;

// Re-export commonly used types
pub use config::{Config, ConversionConfig, InputFormat};
pub use error::{Result, FastConvertError};
pub use parallel::{BatchCoordinator, BatchResult};
pub use processing::{ConversionOutcome, ConversionUnit, FileDescriptor, UploadSource};
pub use server::UploadServer;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize with custom configuration
///
/// `RUST_LOG`, when set, takes precedence over `logging.level`.
pub fn init_with_config(config: &Config) -> Result<()> {
    config.validate()?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level)
            .map_err(|e| FastConvertError::config(
                format!("Invalid log level {:?}: {}", config.logging.level, e)
            ))?,
    };

    if install_subscriber(filter, config.logging.json_format) {
        info!("FastConvert v{} initialized with custom config", VERSION);
    }

    log_codec_support();
    Ok(())
}

fn install_subscriber(filter: EnvFilter, json: bool) -> bool {
    // stdout is reserved for command output
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.is_ok()
}

fn log_codec_support() {
    debug!("Image format support:");
    debug!("  PNG: {}", image::ImageFormat::Png.can_read());
    debug!("  JPEG: {}", image::ImageFormat::Jpeg.can_read());
    debug!("  GIF: {}", image::ImageFormat::Gif.can_read());
    debug!("  WebP: {}", image::ImageFormat::WebP.can_read());
}
