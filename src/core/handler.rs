//! Job handler contract and the registry resolving job types to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::error::{AppResult, SchedulerError, ValidationErrors};
use crate::core::job::Arguments;
use crate::core::throttle::{Throttle, ThrottleRegistry};

/// Capability interface a job type exposes to the scheduler.
///
/// The scheduler inspects nothing beyond the declared arity of each
/// perform-method and the default throttle set; `perform` is only invoked by
/// workers after a successful claim.
///
/// # Example
///
/// ```rust,ignore
/// struct SumJob;
///
/// #[async_trait]
/// impl JobHandler for SumJob {
///     fn job_type(&self) -> &str { "Sum" }
///
///     fn arity(&self, perform_method: &str) -> Option<usize> {
///         match perform_method {
///             "perform" => Some(1),
///             "sum" => Some(2),
///             _ => None,
///         }
///     }
///
///     async fn perform(&self, perform_method: &str, arguments: &Arguments) -> AppResult<Value> {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Identifier stored on job records.
    fn job_type(&self) -> &str;

    /// Number of arguments `perform_method` takes, or `None` if the method is not defined.
    fn arity(&self, perform_method: &str) -> Option<usize>;

    /// Throttles attached to every job of this type at registration time.
    fn default_throttles(&self) -> Vec<Arc<dyn Throttle>> {
        Vec::new()
    }

    /// Run the job body.
    async fn perform(&self, perform_method: &str, arguments: &Arguments) -> AppResult<Value>;
}

/// Resolves job type identifiers to handlers.
#[derive(Clone, Default)]
pub struct JobTypeRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobTypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its job type.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the job type is blank or already registered.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> Result<(), SchedulerError> {
        let job_type = handler.job_type().to_string();
        let mut errors = ValidationErrors::new();
        if job_type.trim().is_empty() {
            errors.add("job_type", "can't be blank");
        } else if self.handlers.contains_key(&job_type) {
            errors.add("job_type", format!("`{job_type}` is already registered"));
        }
        errors.into_result()?;
        self.handlers.insert(job_type, handler);
        Ok(())
    }

    /// Builder-style registration.
    ///
    /// # Errors
    ///
    /// See [`JobTypeRegistry::register`].
    pub fn with_handler(mut self, handler: Arc<dyn JobHandler>) -> Result<Self, SchedulerError> {
        self.register(handler)?;
        Ok(self)
    }

    /// Handler for `job_type`.
    #[must_use]
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// True when `job_type` is registered.
    #[must_use]
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted.
    #[must_use]
    pub fn job_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Declared arity of `perform_method` on `job_type`.
    #[must_use]
    pub fn arity(&self, job_type: &str, perform_method: &str) -> Option<usize> {
        self.handlers
            .get(job_type)
            .and_then(|handler| handler.arity(perform_method))
    }

    /// Record every problem with invoking `perform_method` on `job_type` with `arguments`.
    pub fn check_arguments(
        &self,
        job_type: &str,
        perform_method: &str,
        arguments: &Arguments,
        errors: &mut ValidationErrors,
    ) {
        if job_type.trim().is_empty() {
            return;
        }
        let Some(handler) = self.handlers.get(job_type) else {
            errors.add("job_type", format!("job type `{job_type}` is not registered"));
            return;
        };
        match handler.arity(perform_method) {
            None => errors.add(
                "perform_method",
                format!("`{perform_method}` is not defined for job type `{job_type}`"),
            ),
            Some(expected) if expected != arguments.len() => {
                errors.add("arguments", format!("There must be {expected} argument(s)"));
            }
            Some(_) => {}
        }
    }

    /// Define every handler's default throttles on `throttles`.
    pub fn install_default_throttles(&self, throttles: &ThrottleRegistry) {
        for (job_type, handler) in &self.handlers {
            for throttle in handler.default_throttles() {
                throttles.define(job_type, throttle);
            }
        }
    }
}

impl std::fmt::Debug for JobTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTypeRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
