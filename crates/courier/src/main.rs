//! Courier: device upload relay
//!
//! Main binary with subcommands:
//! - `serve`: HTTP server, device channel and scheduler
//! - `devices`: List configured devices and their connection state

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod devices;
mod serve;

const DEFAULT_LOG_FILTER: &str =
    "courier=info,courier_device=info,courier_scheduler=info,courier_pipeline=info,courier_web=info";
const DEBUG_LOG_FILTER: &str = "courier=debug,courier_device=debug,courier_scheduler=debug,courier_pipeline=debug,courier_web=debug,tower_http=debug";

/// Parse boolean from environment variable, accepting common truthy values.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{s}', expected 1/true/yes/on or 0/false/no/off"
        )),
    }
}

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Device upload relay with scheduled publishing", long_about = None)]
struct Cli {
    /// Verbose logging (ignored when RUST_LOG is set)
    #[arg(long, global = true, env = "COURIER_DEBUG", action = clap::ArgAction::Set, value_parser = parse_bool_env, default_value = "false")]
    debug: bool,

    /// Directory for the daily rolling log files
    #[arg(long, global = true, env = "COURIER_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server with the device channel and scheduler
    Serve {
        /// Listen address
        #[arg(long, env = "COURIER_HOST", default_value = "0.0.0.0")]
        host: String,

        /// Listen port
        #[arg(long, env = "COURIER_PORT", default_value = "8000")]
        port: u16,

        /// Root directory for staged uploads
        #[arg(long, env = "COURIER_UPLOAD_DIR", default_value = "uploads")]
        upload_dir: PathBuf,

        /// Control-channel binary
        #[arg(long, env = "COURIER_ADB_PATH", default_value = "adb")]
        adb_path: PathBuf,

        /// Device registry JSON file (built-in defaults when absent)
        #[arg(long, env = "COURIER_DEVICES")]
        devices: Option<PathBuf>,

        /// UI-automation driver program
        #[arg(long, env = "COURIER_AUTOMATION_COMMAND")]
        automation_command: Option<PathBuf>,

        /// Timeout for one automation driver invocation, in seconds
        #[arg(long, env = "COURIER_AUTOMATION_TIMEOUT", default_value = "300")]
        automation_timeout: u64,

        /// Maximum request body size in bytes
        #[arg(long, env = "COURIER_MAX_BODY_BYTES", default_value_t = courier_web::DEFAULT_MAX_BODY_BYTES)]
        max_body_bytes: usize,
    },

    /// List configured devices and whether they are reachable
    Devices {
        /// Control-channel binary
        #[arg(long, env = "COURIER_ADB_PATH", default_value = "adb")]
        adb_path: PathBuf,

        /// Device registry JSON file (built-in defaults when absent)
        #[arg(long, env = "COURIER_DEVICES")]
        devices: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        DEBUG_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    std::fs::create_dir_all(&cli.log_dir)
        .map_err(|e| miette::miette!("failed to create log directory: {}", e))?;
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(courier_web::LOG_FILE_PREFIX)
        .filename_suffix(courier_web::LOG_FILE_SUFFIX)
        .max_log_files(courier_web::MAX_LOG_FILES)
        .build(&cli.log_dir)
        .map_err(|e| miette::miette!("failed to open log file: {}", e))?;
    // Flushes buffered lines on drop.
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    match cli.command {
        Commands::Serve {
            host,
            port,
            upload_dir,
            adb_path,
            devices,
            automation_command,
            automation_timeout,
            max_body_bytes,
        } => {
            serve::run(serve::ServeConfig {
                host,
                port,
                upload_dir,
                adb_path,
                devices,
                automation_command,
                automation_timeout_secs: automation_timeout,
                max_body_bytes,
                log_dir: cli.log_dir,
            })
            .await
        }

        Commands::Devices { adb_path, devices } => {
            devices::run(&adb_path, devices.as_deref()).await
        }
    }
}
