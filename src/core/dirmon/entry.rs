//! Directory-monitor entries: a watch pattern plus the job to spawn per file.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::dirmon::pattern::PathPattern;
use crate::core::error::{SchedulerError, ValidationErrors};
use crate::core::handler::JobTypeRegistry;
use crate::core::job::{Arguments, NewJob, DEFAULT_PERFORM_METHOD};
use crate::util::serde::{EntryId, Priority};

/// Whether an entry takes part in scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirmonState {
    /// Scanned on every pass.
    Enabled,
    /// Skipped until an operator enables it.
    Disabled,
    /// Skipped after a scan or spawn error until an operator re-enables it.
    Failed,
}

impl fmt::Display for DirmonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Failed => "failed",
        })
    }
}

/// A watch rule mapping a file pattern to a job template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirmonEntry {
    /// Unique id.
    pub id: EntryId,
    /// Optional operator-facing name.
    #[serde(default)]
    pub name: Option<String>,
    /// Glob pattern or literal file path.
    pub pattern: String,
    /// Job type spawned for each new file.
    pub job_type: String,
    /// Perform-method of the spawned job.
    #[serde(default = "default_perform_method")]
    pub perform_method: String,
    /// Arguments of the spawned job.
    #[serde(default)]
    pub arguments: Arguments,
    /// Priority of the spawned job.
    #[serde(default)]
    pub priority: Priority,
    /// Participation in scans.
    pub state: DirmonState,
    /// Time of the last completed scan of this entry.
    #[serde(default)]
    pub last_scanned_ms: Option<u128>,
    /// Error that moved the entry to `failed`.
    #[serde(default)]
    pub failure: Option<String>,
}

fn default_perform_method() -> String {
    DEFAULT_PERFORM_METHOD.to_string()
}

impl DirmonEntry {
    /// Enabled entry watching `pattern` for `job_type` with no arguments.
    pub fn new(pattern: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(),
            name: None,
            pattern: pattern.into(),
            job_type: job_type.into(),
            perform_method: default_perform_method(),
            arguments: Arguments::none(),
            priority: Priority::default(),
            state: DirmonState::Enabled,
            last_scanned_ms: None,
            failure: None,
        }
    }

    /// Set a display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the perform-method.
    #[must_use]
    pub fn with_perform_method(mut self, method: impl Into<String>) -> Self {
        self.perform_method = method.into();
        self
    }

    /// Set the arguments.
    #[must_use]
    pub fn with_arguments(mut self, arguments: impl Into<Arguments>) -> Self {
        self.arguments = arguments.into();
        self
    }

    /// Set the priority of spawned jobs.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Priority(priority);
        self
    }

    /// Set the state.
    #[must_use]
    pub fn with_state(mut self, state: DirmonState) -> Self {
        self.state = state;
        self
    }

    /// Check mandatory fields, pattern syntax and arity against the live job type.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Validation` naming every problem found.
    pub fn validate(&self, job_types: &JobTypeRegistry) -> Result<(), SchedulerError> {
        let mut errors = ValidationErrors::new();
        if self.pattern.trim().is_empty() {
            errors.add("path", "can't be blank");
        } else if let Err(SchedulerError::Scan { reason, .. }) = PathPattern::parse(&self.pattern) {
            errors.add("path", reason);
        }
        if self.job_type.trim().is_empty() {
            errors.add("job_type", "can't be blank");
        }
        job_types.check_arguments(
            &self.job_type,
            &self.perform_method,
            &self.arguments,
            &mut errors,
        );
        errors.into_result()
    }

    /// Template of the job spawned for `source`.
    #[must_use]
    pub fn job_template(&self, source: &Path) -> NewJob {
        NewJob::new(self.job_type.clone())
            .with_perform_method(self.perform_method.clone())
            .with_arguments(self.arguments.clone())
            .with_priority(self.priority.0)
            .with_source_path(source)
    }
}
