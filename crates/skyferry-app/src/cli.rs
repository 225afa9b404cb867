//! `skyferry` command-line entry: argument parsing, dispatch and exit codes.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use skyferry_core::{TransferError, TransferOutcome, TransferRequest, TransferService};
use skyferry_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use tracing::{info, warn};

use crate::bootstrap::{self, AppContext};
use crate::error::AppError;

/// Exit code for a copied blob.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code when the request is rejected before any remote call.
pub const EXIT_VALIDATION: i32 = 2;
/// Exit code for configuration faults, interrupted transfers and other non-retryable failures.
pub const EXIT_FAILURE: i32 = 3;
/// Exit code when the transfer failed in a way that a retry may fix, including remote faults
/// while provisioning, submitting or polling.
pub const EXIT_RETRYABLE: i32 = 4;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "skyferry", about = "Copy blobs between storage accounts with Data Factory")]
pub struct Cli {
    /// JSON settings document layered underneath `SKYFERRY_*` environment variables.
    #[arg(long, env = "SKYFERRY_CONFIG", global = true)]
    pub config: Option<PathBuf>,
    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, env = "SKYFERRY_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL, global = true)]
    pub log_level: String,
    /// Log output format (`json` or `pretty`).
    #[arg(long, env = "SKYFERRY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,
    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check a request without touching any remote service.
    Validate(RequestArgs),
    /// Validate a request, then run the transfer to completion.
    Transfer(RequestArgs),
}

/// Location of a transfer request document.
#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Path to a JSON transfer request.
    #[arg(long)]
    pub request: PathBuf,
}

/// Error classes that map onto exit codes.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
    Retryable(String),
}

type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => EXIT_VALIDATION,
            Self::Failure(_) => EXIT_FAILURE,
            Self::Retryable(_) => EXIT_RETRYABLE,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) | Self::Retryable(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<AppError> for CliError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::RequestDocument { .. } | AppError::NoService { .. } => {
                Self::validation(err.detail())
            }
            other => Self::failure(anyhow!(other.detail())),
        }
    }
}

/// Parse arguments, run the command and return the process exit code.
pub async fn run() -> i32 {
    run_with(Cli::parse()).await
}

/// Run an already parsed command line.
pub async fn run_with(cli: Cli) -> i32 {
    let format = cli
        .log_format
        .as_deref()
        .map_or_else(LogFormat::infer, LogFormat::from_name);
    let logging = LoggingConfig {
        level: &cli.log_level,
        format,
        ..LoggingConfig::default()
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err}");
    }

    match dispatch(cli).await {
        Ok(outcome) => {
            if let Some(outcome) = outcome {
                print_outcome(&outcome);
            }
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

async fn dispatch(cli: Cli) -> CliResult<Option<TransferOutcome>> {
    let context = bootstrap::from_env(cli.config.as_deref())?;
    match cli.command {
        Command::Validate(args) => {
            let request = read_request(&args.request)?;
            validate(&context, &request)?;
            println!("request {} is valid", request.id);
            Ok(None)
        }
        Command::Transfer(args) => {
            let request = read_request(&args.request)?;
            transfer(&context, request).await.map(Some)
        }
    }
}

/// Read a transfer request document.
pub(crate) fn read_request(path: &Path) -> Result<TransferRequest, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AppError::Io {
        operation: "request.read",
        path: Some(path.to_path_buf()),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| AppError::RequestDocument {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a service for the request and run its local checks.
pub(crate) fn validate(
    context: &AppContext,
    request: &TransferRequest,
) -> CliResult<Arc<dyn TransferService>> {
    let service = context.registry().resolve(request).ok_or_else(|| {
        CliError::from(AppError::NoService {
            request_id: request.id.clone(),
            source_type: request.source.kind.clone(),
            destination_type: request.destination.kind.clone(),
        })
    })?;
    service
        .validate(request)
        .map_err(|err| CliError::validation(err.to_string()))?;
    Ok(service)
}

/// Validate and transfer, mapping the result onto the CLI error classes.
pub(crate) async fn transfer(
    context: &AppContext,
    request: TransferRequest,
) -> CliResult<TransferOutcome> {
    let service = validate(context, &request)?;
    let request_id = request.id.clone();

    let pending = service.transfer(request);
    tokio::pin!(pending);
    let result = tokio::select! {
        result = &mut pending => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(request_id = %request_id, "interrupt received; cancelling transfer");
            context.shutdown();
            pending.await
        }
    };

    let snapshot = context.metrics().snapshot();
    info!(
        request_id = %request_id,
        metrics = %serde_json::to_string(&snapshot).unwrap_or_default(),
        "transfer finished"
    );
    classify(result)
}

/// Map a transfer result onto success or a CLI error class.
pub(crate) fn classify(result: Result<TransferOutcome, TransferError>) -> CliResult<TransferOutcome> {
    match result {
        Ok(outcome) if outcome.succeeded => Ok(outcome),
        Ok(outcome) => {
            let message = outcome
                .message
                .clone()
                .unwrap_or_else(|| "transfer failed".to_string());
            if outcome.retryable {
                Err(CliError::Retryable(message))
            } else {
                Err(CliError::failure(anyhow!(message)))
            }
        }
        Err(TransferError::Validation(err)) => Err(CliError::validation(err.to_string())),
        Err(err) if err.is_retryable() && !matches!(err, TransferError::Cancelled { .. }) => {
            Err(CliError::Retryable(err.detail()))
        }
        Err(err) => Err(CliError::failure(anyhow!(err.detail()))),
    }
}

fn print_outcome(outcome: &TransferOutcome) {
    match serde_json::to_string_pretty(outcome) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("warning: failed to render outcome: {err}"),
    }
}
