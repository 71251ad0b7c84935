use super::{OperationContext, OperationError};
use crate::domain::entities::WaitOperation;
use std::time::Duration;

/// Sleep for the configured time unless cancelled first
pub async fn run(op: &WaitOperation, ctx: &OperationContext) -> Result<(), OperationError> {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(op.time)) => Ok(()),
        _ = ctx.cancellation.cancelled() => Err(OperationError::Cancelled),
    }
}
