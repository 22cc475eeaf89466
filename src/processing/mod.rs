//! Per-file conversion: store the original, decode it, write the WebP derivative

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::ConversionConfig;
use crate::error::{Result, FastConvertError, ErrorContext};

pub mod formats;
pub mod validation;

pub use formats::*;
pub use validation::*;

/// Where the bytes of an uploaded file come from
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Part body buffered from a multipart request
    Memory(Vec<u8>),
    /// File already on local disk
    Path(PathBuf),
}

impl UploadSource {
    /// Open a reader over the source bytes
    pub fn open(&self) -> Result<Box<dyn Read + Send + '_>> {
        match self {
            Self::Memory(bytes) => Ok(Box::new(bytes.as_slice())),
            Self::Path(path) => {
                let file = File::open(path).with_file_context(path.clone())?;
                Ok(Box::new(file))
            }
        }
    }
}

/// One input file of a batch: declared name plus readable bytes
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub filename: String,
    pub source: UploadSource,
}

impl FileDescriptor {
    /// Describe an in-memory upload
    pub fn from_bytes<S: Into<String>>(filename: S, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            source: UploadSource::Memory(bytes),
        }
    }

    /// Describe a local file, keeping its file name as the declared name
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            filename,
            source: UploadSource::Path(path),
        }
    }
}

/// Result of converting the file at `index` of a batch
#[derive(Debug)]
pub struct ConversionOutcome {
    pub index: usize,
    pub result: Result<PathBuf>,
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Shared flag letting pending units skip their remaining steps
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Derivative path: the original path with the configured suffix appended
pub fn derivative_path(original: &Path, suffix: &str) -> PathBuf {
    let mut path = original.as_os_str().to_owned();
    path.push(".");
    path.push(suffix.trim_start_matches('.'));
    PathBuf::from(path)
}

/// Strictly sequential store, decode, encode pipeline for one file
pub struct ConversionUnit {
    config: Arc<ConversionConfig>,
    cancellation: Option<CancellationFlag>,
}

impl ConversionUnit {
    /// Create a conversion unit for the given settings
    pub fn new(config: Arc<ConversionConfig>) -> Self {
        Self {
            config,
            cancellation: None,
        }
    }

    /// Skip remaining steps once the flag is raised
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    /// Convert one file, blocking the current thread
    pub fn convert(&self, descriptor: &FileDescriptor, index: usize) -> ConversionOutcome {
        let start_time = Instant::now();
        let result = self.run(descriptor, index);

        debug!(
            "Unit {} ({}) finished in {:.2}ms: {}",
            index,
            descriptor.filename,
            start_time.elapsed().as_secs_f64() * 1000.0,
            if result.is_ok() { "ok" } else { "failed" }
        );

        ConversionOutcome { index, result }
    }

    /// Convert one file on the blocking thread pool
    pub async fn convert_async(self: Arc<Self>, descriptor: FileDescriptor, index: usize) -> ConversionOutcome {
        tokio::task::spawn_blocking(move || self.convert(&descriptor, index))
            .await
            .unwrap_or_else(|e| ConversionOutcome {
                index,
                result: Err(FastConvertError::system(format!("Task join error: {}", e))),
            })
    }

    fn run(&self, descriptor: &FileDescriptor, index: usize) -> Result<PathBuf> {
        let filename = sanitize_filename(&descriptor.filename)?;
        let original_path = self.config.upload_dir.join(filename);

        self.checkpoint(index)?;
        let bytes = store_original(descriptor, &original_path)?;
        debug!("Stored {} bytes at {:?}", bytes, original_path);

        self.checkpoint(index)?;
        let image = decode_original(&original_path, &self.config)?;
        debug!("Decoded {:?}: {}x{}", original_path, image.width(), image.height());

        self.checkpoint(index)?;
        let output_path = derivative_path(&original_path, &self.config.suffix);
        encode_derivative(&image, &output_path, self.config.quality)?;
        debug!("Wrote derivative {:?}", output_path);

        Ok(output_path)
    }

    fn checkpoint(&self, index: usize) -> Result<()> {
        match &self.cancellation {
            Some(flag) if flag.is_cancelled() => Err(FastConvertError::Cancelled { index }),
            _ => Ok(()),
        }
    }
}

/// Step 1: copy the upload's bytes to `path`, creating or truncating it
fn store_original(descriptor: &FileDescriptor, path: &Path) -> Result<u64> {
    let mut reader = descriptor.source.open()?;
    let mut file = File::create(path).with_file_context(path.to_path_buf())?;

    let written = std::io::copy(&mut reader, &mut file)
        .with_file_context(path.to_path_buf())?;
    file.flush().with_file_context(path.to_path_buf())?;

    Ok(written)
}

/// Step 2: reopen the stored original and decode it by content
fn decode_original(path: &Path, config: &ConversionConfig) -> Result<image::DynamicImage> {
    let data = std::fs::read(path).map_err(|e| FastConvertError::decode(
        format!("Cannot reopen stored original: {}", e),
        Some(path.to_path_buf()),
    ))?;

    decode_image(&data, path, config)
}

/// Step 3: create the derivative file and write the encoded WebP into it
fn encode_derivative(image: &image::DynamicImage, path: &Path, quality: f32) -> Result<()> {
    let mut file = File::create(path).map_err(|e| FastConvertError::encode(
        format!("Cannot create derivative: {}", e),
        Some(path.to_path_buf()),
    ))?;

    let encoded = encode_webp(image, quality, path)?;

    file.write_all(&encoded).map_err(|e| FastConvertError::encode(
        format!("Cannot write derivative: {}", e),
        Some(path.to_path_buf()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([10, 120, 220, 255]),
        ));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageOutputFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn unit_in(dir: &TempDir) -> ConversionUnit {
        ConversionUnit::new(Arc::new(ConversionConfig::new().upload_dir(dir.path())))
    }

    #[test]
    fn test_derivative_path() {
        assert_eq!(
            derivative_path(Path::new("uploads/a.png"), "webp"),
            PathBuf::from("uploads/a.png.webp")
        );
        assert_eq!(
            derivative_path(Path::new("uploads/noext"), ".webp"),
            PathBuf::from("uploads/noext.webp")
        );
    }

    #[test]
    fn test_from_path_keeps_file_name() {
        let descriptor = FileDescriptor::from_path("/srv/in/photo.jpg");
        assert_eq!(descriptor.filename, "photo.jpg");
        assert!(matches!(descriptor.source, UploadSource::Path(_)));
    }

    #[test]
    fn test_convert_stores_original_and_derivative() {
        let dir = TempDir::new().unwrap();
        let bytes = png_bytes(10, 10);
        let descriptor = FileDescriptor::from_bytes("a.png", bytes.clone());

        let outcome = unit_in(&dir).convert(&descriptor, 0);

        let output = outcome.result.unwrap();
        assert_eq!(output, dir.path().join("a.png.webp"));
        assert_eq!(std::fs::read(dir.path().join("a.png")).unwrap(), bytes);

        let derivative = image::open(&output).unwrap();
        assert_eq!((derivative.width(), derivative.height()), (10, 10));
    }

    #[test]
    fn test_convert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let unit = unit_in(&dir);
        let descriptor = FileDescriptor::from_bytes("again.png", png_bytes(4, 6));

        let first = unit.convert(&descriptor, 2).result.unwrap();
        let second = unit.convert(&descriptor, 2).result.unwrap();

        assert_eq!(first, second);
        assert!(image::open(&second).is_ok());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_corrupt_input_keeps_original_only() {
        let dir = TempDir::new().unwrap();
        let descriptor = FileDescriptor::from_bytes("corrupt.png", b"garbage bytes".to_vec());

        let outcome = unit_in(&dir).convert(&descriptor, 1);

        assert_eq!(outcome.index, 1);
        assert!(matches!(outcome.result, Err(FastConvertError::DecodeError { .. })));
        assert!(dir.path().join("corrupt.png").exists());
        assert!(!dir.path().join("corrupt.png.webp").exists());
    }

    #[test]
    fn test_blocked_derivative_is_encode_error() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("a.png.webp")).unwrap();
        let descriptor = FileDescriptor::from_bytes("a.png", png_bytes(10, 10));

        let outcome = unit_in(&dir).convert(&descriptor, 0);

        match outcome.result {
            Err(FastConvertError::EncodeError { file, .. }) => {
                assert_eq!(file.unwrap(), dir.path().join("a.png.webp"));
            }
            other => panic!("expected encode failure, got {other:?}"),
        }
        assert!(dir.path().join("a.png").is_file());
        assert!(dir.path().join("a.png.webp").is_dir());
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let dir = TempDir::new().unwrap();
        let descriptor = FileDescriptor::from_path(dir.path().join("missing.png"));

        let outcome = unit_in(&dir).convert(&descriptor, 0);
        assert!(matches!(outcome.result, Err(FastConvertError::IoError { .. })));
    }

    #[test]
    fn test_missing_upload_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let config = ConversionConfig::new().upload_dir(dir.path().join("absent"));
        let unit = ConversionUnit::new(Arc::new(config));

        let outcome = unit.convert(&FileDescriptor::from_bytes("a.png", png_bytes(2, 2)), 0);
        assert!(matches!(outcome.result, Err(FastConvertError::IoError { .. })));
    }

    #[test]
    fn test_client_directories_are_ignored() {
        let dir = TempDir::new().unwrap();
        let descriptor = FileDescriptor::from_bytes("../../escape.png", png_bytes(3, 3));

        let output = unit_in(&dir).convert(&descriptor, 0).result.unwrap();
        assert_eq!(output, dir.path().join("escape.png.webp"));
    }

    #[test]
    fn test_cancelled_unit_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let flag = CancellationFlag::new();
        flag.cancel();
        let unit = unit_in(&dir).with_cancellation(flag);

        let outcome = unit.convert(&FileDescriptor::from_bytes("a.png", png_bytes(2, 2)), 5);

        assert!(matches!(outcome.result, Err(FastConvertError::Cancelled { index: 5 })));
        assert!(!dir.path().join("a.png").exists());
    }

    #[tokio::test]
    async fn test_convert_async() {
        let dir = TempDir::new().unwrap();
        let unit = Arc::new(unit_in(&dir));

        let outcome = unit
            .convert_async(FileDescriptor::from_bytes("b.png", png_bytes(8, 8)), 3)
            .await;

        assert_eq!(outcome.index, 3);
        assert!(outcome.is_success());
    }
}
