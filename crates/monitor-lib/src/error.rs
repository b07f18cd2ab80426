//! Error taxonomy for the monitoring core

use std::time::Duration;
use thiserror::Error;

/// A collector could not produce a snapshot this cycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("poll timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A snapshot failed validation and was dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// Acknowledge target is not in the open set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("alert not found: {0}")]
pub struct AlertNotFound(pub String);

/// A notification sink failed to deliver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("sink rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}
