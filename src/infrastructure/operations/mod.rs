//! Runners for the operations executed before and after a deployment
//!
//! Every runner resolves placeholders through the operation context's values
//! and gives up as soon as the cancellation token fires.

pub mod compile;
pub mod http;
pub mod process;
pub mod sql;
pub mod wait;

use crate::application::services::value_resolver::ValueResolver;
use crate::domain::entities::DeployOperation;
use crate::infrastructure::plugins::plugin_interface::panic_message;
use crate::infrastructure::process::CommandExecutorError;
use futures::FutureExt;
use reqwest::StatusCode;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Operation runner errors
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("{url} answered with client error {status}")]
    ClientError { url: String, status: StatusCode },

    #[error("{url} answered with server error {status}")]
    ServerError { url: String, status: StatusCode },

    #[error("{url} answered with unexpected status {status}")]
    UnexpectedStatus { url: String, status: StatusCode },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unsupported SQL engine '{0}'")]
    UnsupportedEngine(String),

    #[error("SQL error: {0}")]
    Sql(String),

    #[error("Unknown compiler '{0}'")]
    UnknownCompiler(String),

    #[error("{failed} of {total} files failed to compile")]
    CompileFailed {
        failed: usize,
        total: usize,
        all_failed: bool,
    },

    #[error(transparent)]
    Command(#[from] CommandExecutorError),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Operation panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Command(CommandExecutorError::Cancelled)
        )
    }
}

/// What a runner may use besides the operation itself
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub cancellation: CancellationToken,
    pub values: ValueResolver,
    pub workspace_root: PathBuf,
}

impl OperationContext {
    pub fn new(
        cancellation: CancellationToken,
        values: ValueResolver,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cancellation,
            values,
            workspace_root: workspace_root.into(),
        }
    }

    pub fn check_cancelled(&self) -> Result<(), OperationError> {
        if self.cancellation.is_cancelled() {
            Err(OperationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve a path setting, relative paths start at the workspace root
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let resolved = PathBuf::from(self.values.resolve(path));
        if resolved.is_absolute() {
            resolved
        } else {
            self.workspace_root.join(resolved)
        }
    }
}

/// Run one operation, a panicking runner is reported as an error
pub async fn run_operation(
    operation: &DeployOperation,
    ctx: &OperationContext,
) -> Result<(), OperationError> {
    ctx.check_cancelled()?;
    info!("Running {} operation: {}", operation.kind(), operation.describe());

    let runner = async {
        match operation {
            DeployOperation::Http(op) => http::run(op, ctx).await,
            DeployOperation::Sql(op) => sql::run(op, ctx).await,
            DeployOperation::Compile(op) => compile::run(op, ctx).await,
            DeployOperation::Open(op) => process::open(op, ctx).await,
            DeployOperation::WebDeploy(op) => process::web_deploy(op, ctx).await,
            DeployOperation::Wait(op) => wait::run(op, ctx).await,
        }
    };

    match AssertUnwindSafe(runner).catch_unwind().await {
        Ok(result) => {
            debug!("{} operation finished: {:?}", operation.kind(), result.as_ref().err());
            result
        }
        Err(panic) => Err(OperationError::Panicked(panic_message(panic.as_ref()))),
    }
}

/// Parse a raw operation entry of a target and run it
pub async fn run_operation_value(
    raw: &serde_json::Value,
    ctx: &OperationContext,
) -> Result<(), OperationError> {
    let operation = DeployOperation::from_value(raw)
        .map_err(|e| OperationError::InvalidOperation(e.to_string()))?;
    run_operation(&operation, ctx).await
}
