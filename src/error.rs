//! Error types for the sync and metrics engines
//!
//! Errors are classified by recoverability:
//! - Retryable: busy lock, unreachable calendar or store
//! - NonRetryable: bad input (period strings, missing plan fields)
//!
//! Per-event anomalies are never surfaced here — the engines log and skip
//! those locally so one malformed event cannot abort a batch.

use thiserror::Error;

/// Error types shared by the reconciliation and metrics engines.
#[derive(Debug, Error)]
pub enum EngineError {
    // Non-retryable input errors
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),

    // Retryable collaborator errors
    #[error("Calendar unavailable: {0}")]
    CalendarUnavailable(String),

    #[error("Plan store unavailable: {0}")]
    StoreUnavailable(String),

    /// Lock acquisition timed out — another sync or save is in flight.
    #[error("Service busy: {operation} could not acquire the engine lock within {waited_secs}s")]
    Busy {
        operation: &'static str,
        waited_secs: u64,
    },
}

impl EngineError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Busy { .. }
                | EngineError::CalendarUnavailable(_)
                | EngineError::StoreUnavailable(_)
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EngineError::InvalidPeriod(_) => "Use dd/mm/yyyy dates with start on or before end.",
            EngineError::MissingRequiredField(_) => "Check the plan data before saving.",
            EngineError::CalendarUnavailable(_) => "Check calendar access and try again.",
            EngineError::StoreUnavailable(_) => "Check the plan store and try again.",
            EngineError::Busy { .. } => {
                "The server is processing another request. Try again in a few seconds."
            }
        }
    }
}
