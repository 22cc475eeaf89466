//! FastConvert CLI - Concurrent Batch Upload Converter
//!
//! Runs the multipart upload server, or converts local files through the
//! same batch pipeline without HTTP.

use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use fastconvert::{
    init_with_config, BatchCoordinator, BatchResult, Config, FileDescriptor, UploadServer,
};
use fastconvert::server::{UploadResponse, SUCCESS_MESSAGE};

/// FastConvert - Concurrent Batch Upload Converter
#[derive(Parser)]
#[command(
    name = "fastconvert",
    version,
    about = "Store uploaded images and convert them to WebP in parallel",
    long_about = "FastConvert accepts batches of images over a multipart HTTP endpoint, stores \
                  every original in an upload directory and writes a WebP derivative next to it. \
                  Without a subcommand it runs the server."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    settings: Settings,
}

/// Settings shared by the server and the offline converter
#[derive(Args)]
struct Settings {
    /// Configuration file path (.toml or .yaml)
    #[arg(short, long, value_name = "FILE", env = "FASTCONVERT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, value_name = "ADDR", env = "FASTCONVERT_HOST", global = true)]
    host: Option<std::net::IpAddr>,

    /// Port to listen on
    #[arg(short, long, value_name = "PORT", env = "FASTCONVERT_PORT", global = true)]
    port: Option<u16>,

    /// Directory receiving originals and derivatives
    #[arg(short, long, value_name = "PATH", env = "FASTCONVERT_UPLOAD_DIR", global = true)]
    upload_dir: Option<PathBuf>,

    /// WebP quality (1-100)
    #[arg(short, long, value_name = "QUALITY", global = true)]
    quality: Option<f32>,

    /// Maximum number of files converted at once (default: one per file)
    #[arg(long, value_name = "COUNT", global = true)]
    max_concurrent: Option<usize>,

    /// Stop converting remaining files once one fails
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Run the upload server (default)
    Serve,
    /// Convert local files as one batch
    Convert {
        /// Image files, in the order results should be reported
        #[arg(required = true, value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Print the result in the same JSON shape as the upload endpoint
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration file
    Config {
        /// Configuration file to validate
        file: PathBuf,
    },
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path
        #[arg(short, long, default_value = "fastconvert.toml")]
        output: PathBuf,
        /// Use YAML format instead of TOML
        #[arg(long)]
        yaml: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}: {:#}", style("Error").red().bold(), e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Config { file } => validate_config_file(&file),
        Commands::ExampleConfig { output, yaml } => generate_example_config(&output, yaml),
        Commands::Serve => {
            let config = load_config(&cli.settings)?;
            init_with_config(&config)?;
            let server = UploadServer::new(&config);
            info!("Starting upload server on {}", server.addr());
            server.serve().await
        }
        Commands::Convert { files, json } => {
            let config = load_config(&cli.settings)?;
            init_with_config(&config)?;
            let show_progress = !json && !cli.settings.quiet;
            run_convert(&config, files, json, show_progress).await
        }
    }
}

/// Load the configuration file (if any) and apply command-line overrides
fn load_config(settings: &Settings) -> Result<Config> {
    let mut config = match &settings.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(host) = settings.host {
        config.server.host = host;
    }
    if let Some(port) = settings.port {
        config.server.port = port;
    }
    if let Some(dir) = &settings.upload_dir {
        config.conversion.upload_dir = dir.clone();
    }
    if let Some(quality) = settings.quality {
        config.conversion.quality = quality;
    }
    if let Some(limit) = settings.max_concurrent {
        config.conversion.max_concurrent = Some(limit);
    }
    if settings.fail_fast {
        config.conversion.fail_fast = true;
    }
    if settings.json_logs {
        config.logging.json_format = true;
    }
    if settings.quiet {
        config.logging.level = "error".to_string();
    } else if settings.verbose {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

/// Run one batch over local files and report it like the upload endpoint
async fn run_convert(config: &Config, files: Vec<PathBuf>, json: bool, show_progress: bool) -> Result<()> {
    let start_time = Instant::now();
    let total = files.len();
    let batch = files.into_iter().map(FileDescriptor::from_path).collect();

    info!("Converting {} local files", total);

    let spinner = if show_progress {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        spinner.set_message(format!("Converting {} files...", total));
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    } else {
        None
    };

    let result = BatchCoordinator::new(config.conversion.clone()).process(batch).await;

    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }

    match result? {
        BatchResult::AllSucceeded(paths) => {
            if json {
                let response = UploadResponse {
                    message: SUCCESS_MESSAGE.to_string(),
                    results: paths.iter().map(|p| p.to_string_lossy().into_owned()).collect(),
                };
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                for path in &paths {
                    println!("{}", path.display());
                }
                if show_progress {
                    eprintln!(
                        "{}: {} files in {:.2}s",
                        style("Converted").green().bold(),
                        paths.len(),
                        start_time.elapsed().as_secs_f64()
                    );
                }
            }
            Ok(())
        }
        BatchResult::Failed(error) => Err(error.into()),
    }
}

/// Validate configuration file
fn validate_config_file(file_path: &Path) -> Result<()> {
    let config = Config::from_file(file_path)?;
    config.validate()?;

    println!("{}: Configuration file is valid", style("Success").green().bold());
    println!("Listen address: {}", config.server.socket_addr());
    println!("Upload directory: {}", config.conversion.upload_dir.display());

    Ok(())
}

/// Generate example configuration file
fn generate_example_config(output_path: &Path, use_yaml: bool) -> Result<()> {
    let output_path = if use_yaml {
        output_path.with_extension("yaml")
    } else {
        output_path.to_path_buf()
    };

    Config::default().to_file(&output_path)?;

    let format = if use_yaml { "YAML" } else { "TOML" };
    println!(
        "{}: Generated example {} configuration: {}",
        style("Success").green().bold(),
        format,
        output_path.display()
    );

    Ok(())
}
