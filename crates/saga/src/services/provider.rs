//! Raw provider responses and their classified form.

use domain::{Outcome, StatusClassifier, StatusCode};
use serde::{Deserialize, Serialize};

/// What a bank gateway or card/bill provider answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub code: StatusCode,
    /// Provider-side trace identifier, when the provider assigned one.
    pub trace_id: Option<String>,
    pub message: Option<String>,
}

impl ProviderResponse {
    pub fn new(code: impl Into<StatusCode>) -> Self {
        Self {
            code: code.into(),
            trace_id: None,
            message: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Human-readable reason, falling back to the raw code.
    pub fn reason(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => format!("provider returned code {}", self.code),
        }
    }
}

/// A response after it went through the [`StatusClassifier`].
///
/// The outcome travels alongside the payload, so a pending answer is a
/// branch to handle rather than an error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified<T> {
    pub outcome: Outcome,
    pub response: ProviderResponse,
    pub payload: Option<T>,
}

impl<T> Classified<T> {
    pub fn new(classifier: &StatusClassifier, response: ProviderResponse, payload: Option<T>) -> Self {
        Self {
            outcome: classifier.classify(&response.code),
            response,
            payload,
        }
    }
}
