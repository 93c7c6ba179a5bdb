//! Error types for scheduler operations.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::core::job::JobState;
use crate::util::serde::JobId;

/// Per-field validation messages for a job record or directory-monitor entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Messages recorded for a field, empty if none.
    #[must_use]
    pub fn on(&self, field: &str) -> &[String] {
        self.errors.get(field).map_or(&[], Vec::as_slice)
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into `Ok(())` when empty, otherwise a validation error.
    pub fn into_result(self) -> Result<(), SchedulerError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SchedulerError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.errors {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A job record or directory-monitor entry failed validation.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    /// The requested state change is not permitted from the record's current state,
    /// or the record changed underneath the caller.
    #[error("illegal transition for job {job_id}: cannot {event} from {from}")]
    IllegalTransition {
        /// Job the transition targeted.
        job_id: JobId,
        /// State observed when the transition was attempted.
        from: JobState,
        /// Name of the attempted event.
        event: &'static str,
    },
    /// The job body returned an error.
    #[error("handler failed: {0}")]
    HandlerFailure(String),
    /// A throttle predicate errored while being evaluated.
    #[error("throttle `{throttle}` misconfigured: {reason}")]
    ThrottleMisconfiguration {
        /// Throttle name.
        throttle: String,
        /// Error reported by the predicate.
        reason: String,
    },
    /// Resolving a directory-monitor pattern failed.
    #[error("scan of `{pattern}` failed: {reason}")]
    Scan {
        /// Pattern being resolved.
        pattern: String,
        /// Underlying failure.
        reason: String,
    },
    /// A record could not be found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

impl SchedulerError {
    /// True for lost races and other disallowed transitions.
    #[must_use]
    pub const fn is_illegal_transition(&self) -> bool {
        matches!(self, Self::IllegalTransition { .. })
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
