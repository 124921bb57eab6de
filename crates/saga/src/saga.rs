//! Saga builder.

use crate::error::SagaError;
use crate::step::Step;

/// An ordered, named list of steps.
///
/// Building a saga never runs anything; steps execute only when a
/// [`Coordinator`](crate::Coordinator) plays it.
#[derive(Debug)]
pub struct Saga<E> {
    name: String,
    steps: Vec<Step<E>>,
}

impl<E> Saga<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step after validating its structure.
    pub fn add_step(&mut self, step: Step<E>) -> Result<(), SagaError> {
        if step.name().trim().is_empty() {
            return Err(SagaError::EmptyStepName {
                saga: self.name.clone(),
            });
        }
        if !step.has_forward() {
            return Err(SagaError::MissingForward {
                saga: self.name.clone(),
                step: step.name().to_string(),
            });
        }
        if self.steps.iter().any(|s| s.name() == step.name()) {
            return Err(SagaError::DuplicateStep {
                saga: self.name.clone(),
                step: step.name().to_string(),
            });
        }
        self.steps.push(step);
        Ok(())
    }

    /// Builder-style variant of [`Saga::add_step`].
    pub fn with_step(mut self, step: Step<E>) -> Result<Self, SagaError> {
        self.add_step(step)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Step<E>>) {
        (self.name, self.steps)
    }
}
