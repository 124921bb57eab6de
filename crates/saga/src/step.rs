//! Saga steps.

use std::future::Future;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;

/// A boxed forward or compensate action.
///
/// Actions receive the context they run under and capture everything else
/// (collaborators, shared flow state) by move.
pub type Action<E> =
    Box<dyn Fn(ExecutionContext) -> BoxFuture<'static, Result<(), E>> + Send + Sync>;

/// Per-step execution options.
///
/// The coordinator carries these into the execution log but does not
/// enforce them; timeout discipline belongs to the contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOptions {
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
}

/// A named unit of work paired with its compensation.
pub struct Step<E> {
    name: String,
    forward: Option<Action<E>>,
    compensate: Option<Action<E>>,
    options: StepOptions,
}

impl<E> Step<E> {
    /// Starts a step with no actions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            forward: None,
            compensate: None,
            options: StepOptions::default(),
        }
    }

    /// Sets the forward action.
    pub fn forward<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.forward = Some(Box::new(move |ctx| Box::pin(action(ctx))));
        self
    }

    /// Sets the compensate action.
    ///
    /// It runs if this step or any later step fails, including when this
    /// step's own forward action failed part way.
    pub fn compensate<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        self.compensate = Some(Box::new(move |ctx| Box::pin(action(ctx))));
        self
    }

    pub fn options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_options(&self) -> StepOptions {
        self.options
    }

    pub fn has_forward(&self) -> bool {
        self.forward.is_some()
    }

    pub fn has_compensation(&self) -> bool {
        self.compensate.is_some()
    }

    pub(crate) async fn run_forward(&self, ctx: ExecutionContext) -> Result<(), E> {
        match &self.forward {
            Some(action) => action(ctx).await,
            // Saga::add_step rejects steps without a forward action.
            None => Ok(()),
        }
    }

    /// Returns `None` if the step has nothing to compensate.
    pub(crate) async fn run_compensation(&self, ctx: ExecutionContext) -> Option<Result<(), E>> {
        match &self.compensate {
            Some(action) => Some(action(ctx).await),
            None => None,
        }
    }
}

impl<E> std::fmt::Debug for Step<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("forward", &self.forward.is_some())
            .field("compensate", &self.compensate.is_some())
            .field("options", &self.options)
            .finish()
    }
}
