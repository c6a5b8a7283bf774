//! Compensating transaction stack
//!
//! Each completed step pushes its undo action. On failure the undo actions
//! run newest first, exactly once. On success the stack is cleared.

use errors::KeelResult;
use futures::future::BoxFuture;
use std::future::Future;
use tracing::{debug, error, warn};

type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, KeelResult<()>> + Send>;

/// One completed step and the action that undoes it
pub struct SagaStep {
    name: String,
    undo: Compensation,
}

impl SagaStep {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of a rollback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub compensated: usize,
    pub failed: usize,
}

pub struct Saga {
    name: String,
    steps: Vec<SagaStep>,
}

impl Saga {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Record a completed step
    pub fn push<F, Fut>(&mut self, name: impl Into<String>, undo: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = KeelResult<()>> + Send + 'static,
    {
        let name = name.into();
        debug!("Saga {}: step {} done", self.name, name);
        self.steps.push(SagaStep {
            name,
            undo: Box::new(move || Box::pin(undo())),
        });
    }

    /// Run `action`; when it succeeds, record `undo` for it
    pub async fn step<T, A, F, Fut>(&mut self, name: &str, action: A, undo: F) -> KeelResult<T>
    where
        A: Future<Output = KeelResult<T>>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = KeelResult<()>> + Send + 'static,
    {
        let value = action.await?;
        self.push(name, undo);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Names of the recorded steps, oldest first
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(SagaStep::name).collect()
    }

    /// Discard all compensations
    pub fn commit(mut self) {
        debug!("Saga {} committed after {} steps", self.name, self.steps.len());
        self.steps.clear();
    }

    /// Run every compensation newest first
    ///
    /// Failures are logged and do not stop the remaining compensations.
    pub async fn rollback(mut self) -> RollbackReport {
        let mut report = RollbackReport::default();
        let steps = std::mem::take(&mut self.steps);
        if !steps.is_empty() {
            warn!("Saga {}: rolling back {} steps", self.name, steps.len());
        }

        for step in steps.into_iter().rev() {
            match (step.undo)().await {
                Ok(()) => {
                    debug!("Saga {}: compensated {}", self.name, step.name);
                    report.compensated += 1;
                },
                Err(e) => {
                    error!("Saga {}: compensation {} failed: {}", self.name, step.name, e);
                    report.failed += 1;
                },
            }
        }
        report
    }
}

impl Drop for Saga {
    fn drop(&mut self) {
        if !self.steps.is_empty() {
            error!(
                "Saga {} dropped with {} pending compensations",
                self.name,
                self.steps.len()
            );
        }
    }
}
