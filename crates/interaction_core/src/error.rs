use shared::error::{ErrorCode, FailureNotice};
use thiserror::Error;

/// Instance-fatal failures. Step-local problems (validation, blocked
/// delivery) are recovered inside the step and never surface here.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("precondition violated: {0}")]
    PreconditionViolated(String),
    #[error("event source closed")]
    SourceClosed,
    #[error("responder failed: {0:#}")]
    Responder(anyhow::Error),
    #[error("draft store failed: {0:#}")]
    Store(anyhow::Error),
    #[error("side channel failed: {0:#}")]
    Delivery(anyhow::Error),
    #[error("page render failed: {0:#}")]
    Render(anyhow::Error),
    #[error("publish failed: {0:#}")]
    Publish(anyhow::Error),
}

impl FlowError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolated(message.into())
    }
}

impl From<&FlowError> for FailureNotice {
    fn from(value: &FlowError) -> Self {
        match value {
            FlowError::PreconditionViolated(_) => FailureNotice::new(
                ErrorCode::Precondition,
                "This interaction can no longer be continued.",
            ),
            FlowError::Delivery(_) => FailureNotice::new(
                ErrorCode::DeliveryBlocked,
                "I could not reach you in direct messages.",
            ),
            _ => FailureNotice::new(
                ErrorCode::Internal,
                "Something went wrong, please try again.",
            ),
        }
    }
}
