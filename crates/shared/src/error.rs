use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    DeliveryBlocked,
    Precondition,
    Internal,
}

/// User-visible failure message produced by the top-level command handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNotice {
    pub code: ErrorCode,
    pub message: String,
}

impl FailureNotice {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A step rejected user input. Reported in place; never touches persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationRejected {
    pub field: String,
    pub reason: String,
}

impl ValidationRejected {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ValidationRejected> for FailureNotice {
    fn from(value: ValidationRejected) -> Self {
        Self::new(ErrorCode::Validation, value.to_string())
    }
}
