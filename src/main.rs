/*!
 * sftp-decrypt CLI
 *
 * `route` runs the size-based router for one workflow event and prints its
 * response; `execute` runs the decryption pipeline for the request described
 * by the environment (the delegated task entry point).
 */

use clap::{Parser, Subcommand, ValueEnum};
use sftp_decrypt::{
    backend::aws::{
        load_shared_config, EcsTaskLauncher, S3ObjectStore, SecretsManagerKeyStore,
        TransferWorkflowNotifier,
    },
    backend::WorkflowNotifier,
    config::{LogConfig, LogFormat, LogLevel, RouterConfig},
    core::executor::load_settings,
    core::router::reject_unconfigured,
    error::{DecryptError, Result, EXIT_FAILURE, EXIT_SUCCESS},
    logging, Executor, Router, RouterResponse, TransferEvent,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sftp-decrypt")]
#[command(version, about = "Decrypt PGP files uploaded through an SFTP transfer gateway", long_about = None)]
struct Cli {
    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevelArg,

    /// Console log format
    #[arg(long, value_enum, default_value = "compact", global = true)]
    log_format: LogFormatArg,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one workflow event: delegate large files, reject small ones
    Route {
        /// Event JSON file (default: read from stdin)
        #[arg(short, long, value_name = "FILE")]
        event: Option<PathBuf>,

        /// Router settings as TOML (default: read from the environment)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Run the decryption pipeline for the request in the environment
    Execute,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogFormatArg {
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    logging::init_logging(&LogConfig {
        level: cli.log_level.into(),
        format: cli.log_format.into(),
        file: cli.log_file.clone(),
    })?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| DecryptError::Other(format!("Failed to start async runtime: {}", e)))?;

    match cli.command {
        Commands::Route { event, config } => runtime.block_on(route(event, config)),
        Commands::Execute => runtime.block_on(execute()),
    }
}

fn read_event(path: Option<PathBuf>) -> Result<TransferEvent> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(&path).map_err(|e| {
            DecryptError::Config(format!("Failed to read event {}: {}", path.display(), e))
        })?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(|e| DecryptError::Other(format!("Failed to read stdin: {}", e)))?;
            raw
        }
    };

    serde_json::from_str(&raw)
        .map_err(|e| DecryptError::Config(format!("Invalid event JSON: {}", e)))
}

async fn route(event: Option<PathBuf>, config: Option<PathBuf>) -> Result<i32> {
    let event = read_event(event)?;

    let shared = load_shared_config().await;
    let notifier: Arc<dyn WorkflowNotifier> =
        Arc::new(TransferWorkflowNotifier::from_config(&shared));

    let config = match config {
        Some(path) => RouterConfig::from_file(&path),
        None => RouterConfig::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            print_response(&reject_unconfigured(notifier, &event, &e).await)?;
            return Err(e);
        }
    };

    let router = Router::new(
        Arc::new(S3ObjectStore::from_config(&shared)),
        Arc::new(EcsTaskLauncher::from_config(
            &shared,
            config.delegation.clone(),
        )),
        notifier,
        config,
    );

    let response = router.handle(&event).await;
    print_response(&response)?;

    Ok(if response.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

fn print_response(response: &RouterResponse) -> Result<()> {
    let rendered = serde_json::to_string(response)
        .map_err(|e| DecryptError::Other(format!("Failed to render response: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}

async fn execute() -> Result<i32> {
    let shared = load_shared_config().await;
    let notifier = Arc::new(TransferWorkflowNotifier::from_config(&shared));

    let (request, config) =
        load_settings(|name: &str| std::env::var(name).ok(), notifier.clone()).await?;

    let executor = Executor::new(
        Arc::new(S3ObjectStore::from_config(&shared)),
        Arc::new(SecretsManagerKeyStore::from_config(&shared)),
        notifier,
        config,
    );

    executor.run(&request).await?;
    Ok(EXIT_SUCCESS)
}
