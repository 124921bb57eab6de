//! Provider status classification.
//!
//! Bank and card-provider responses carry a numeric-prefixed status code
//! and no structured outcome. [`StatusClassifier`] is the single place
//! where those codes become business outcomes; flows and reconciliation
//! never inspect raw codes themselves.
//!
//! Rules, in order:
//! 1. Designated exact codes (in-flight and the OTP sub-outcomes).
//! 2. Prefix `2` is success, prefix `4` is a definite failure.
//! 3. Anything else is indeterminate and parks the order as verifying.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::order::ProviderCode;

/// Default code for a call that timed out or is still in flight at the bank.
pub const IN_FLIGHT: &str = "102";
/// Default code asking the user for a one-time password.
pub const NEEDS_OTP: &str = "103";
/// Default code refusing an OTP bypass for this user or amount.
pub const NOT_ELIGIBLE_FOR_BYPASS: &str = "405";
/// Default code reporting too many OTP attempts.
pub const MAX_OTP_ATTEMPTS: &str = "406";
/// Default code reporting a wrong OTP.
pub const WRONG_OTP: &str = "407";

/// Raw status code returned by an external provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(String);

impl StatusCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StatusCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Business outcome of an external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Definite failure; triggers compensation.
    Failure,
    /// Outcome unknown; never to be treated as a failure.
    Verifying,
    /// The user must enter a one-time password.
    NeedsOtp,
    /// The user may not skip OTP for this operation.
    NotEligibleForBypass,
    /// The user exhausted their OTP attempts.
    MaxOtpAttemptsExceeded,
    /// The entered OTP was wrong; the user may retry.
    WrongOtp,
}

/// Coarse grouping of [`Outcome`] for branch selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failure,
    Pending,
    NeedsAuth,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success => OutcomeKind::Success,
            Outcome::Failure | Outcome::NotEligibleForBypass | Outcome::MaxOtpAttemptsExceeded => {
                OutcomeKind::Failure
            }
            Outcome::Verifying => OutcomeKind::Pending,
            Outcome::NeedsOtp | Outcome::WrongOtp => OutcomeKind::NeedsAuth,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
            Outcome::Verifying => "verifying",
            Outcome::NeedsOtp => "needs_otp",
            Outcome::NotEligibleForBypass => "not_eligible_for_bypass",
            Outcome::MaxOtpAttemptsExceeded => "max_otp_attempts_exceeded",
            Outcome::WrongOtp => "wrong_otp",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps provider status codes to [`Outcome`]s.
///
/// The default instance carries the standard designated codes. Providers
/// that use different designated values get their own instance from
/// [`StatusClassifier::builder`]; the prefix rules are shared by all.
#[derive(Debug, Clone)]
pub struct StatusClassifier {
    designated: HashMap<StatusCode, Outcome>,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::builder()
            .designate(IN_FLIGHT, Outcome::Verifying)
            .designate(NEEDS_OTP, Outcome::NeedsOtp)
            .designate(NOT_ELIGIBLE_FOR_BYPASS, Outcome::NotEligibleForBypass)
            .designate(MAX_OTP_ATTEMPTS, Outcome::MaxOtpAttemptsExceeded)
            .designate(WRONG_OTP, Outcome::WrongOtp)
            .build()
    }
}

impl StatusClassifier {
    /// Starts a classifier with no designated codes.
    pub fn builder() -> StatusClassifierBuilder {
        StatusClassifierBuilder::default()
    }

    /// Classifies a raw status code.
    pub fn classify(&self, code: &StatusCode) -> Outcome {
        if let Some(outcome) = self.designated.get(code) {
            return *outcome;
        }
        match code.as_str().chars().next() {
            Some('2') => Outcome::Success,
            Some('4') => Outcome::Failure,
            _ => {
                tracing::warn!(%code, "unmapped provider status code, treating as verifying");
                Outcome::Verifying
            }
        }
    }
}

/// Builder for provider-specific classifiers.
#[derive(Debug, Default)]
pub struct StatusClassifierBuilder {
    designated: HashMap<StatusCode, Outcome>,
}

impl StatusClassifierBuilder {
    /// Routes an exact code to an outcome ahead of the prefix rules.
    /// A later designation of the same code replaces the earlier one.
    pub fn designate(mut self, code: impl Into<StatusCode>, outcome: Outcome) -> Self {
        self.designated.insert(code.into(), outcome);
        self
    }

    pub fn build(self) -> StatusClassifier {
        StatusClassifier {
            designated: self.designated,
        }
    }
}

/// Per-provider classifiers with a shared fallback.
///
/// Flows and reconciliation classify every answer through the classifier
/// of the provider that produced it.
#[derive(Debug, Clone, Default)]
pub struct ClassifierRegistry {
    fallback: StatusClassifier,
    providers: HashMap<ProviderCode, StatusClassifier>,
}

impl ClassifierRegistry {
    pub fn new(fallback: StatusClassifier) -> Self {
        Self {
            fallback,
            providers: HashMap::new(),
        }
    }

    /// Registers the classifier used for `provider`'s answers.
    pub fn with_provider(
        mut self,
        provider: impl Into<ProviderCode>,
        classifier: StatusClassifier,
    ) -> Self {
        self.providers.insert(provider.into(), classifier);
        self
    }

    /// The classifier for `provider`, or the fallback when it has none.
    pub fn for_provider(&self, provider: Option<&ProviderCode>) -> &StatusClassifier {
        provider
            .and_then(|p| self.providers.get(p))
            .unwrap_or(&self.fallback)
    }

    pub fn classify(&self, provider: Option<&ProviderCode>, code: &StatusCode) -> Outcome {
        self.for_provider(provider).classify(code)
    }
}

impl From<StatusClassifier> for ClassifierRegistry {
    fn from(fallback: StatusClassifier) -> Self {
        Self::new(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: &str) -> Outcome {
        StatusClassifier::default().classify(&StatusCode::new(code))
    }

    #[test]
    fn test_prefix_rules() {
        assert_eq!(classify("200"), Outcome::Success);
        assert_eq!(classify("201"), Outcome::Success);
        assert_eq!(classify("400"), Outcome::Failure);
        assert_eq!(classify("422"), Outcome::Failure);
    }

    #[test]
    fn test_in_flight_is_verifying_not_failure() {
        assert_eq!(classify("102"), Outcome::Verifying);
        assert_eq!(classify("102").kind(), OutcomeKind::Pending);
    }

    #[test]
    fn test_otp_sub_outcomes() {
        assert_eq!(classify("103"), Outcome::NeedsOtp);
        assert_eq!(classify("405"), Outcome::NotEligibleForBypass);
        assert_eq!(classify("406"), Outcome::MaxOtpAttemptsExceeded);
        assert_eq!(classify("407"), Outcome::WrongOtp);
    }

    #[test]
    fn test_designated_codes_win_over_prefix() {
        // 405..407 start with '4' but are routed to distinct OTP branches.
        assert_ne!(classify("406"), Outcome::Failure);
    }

    #[test]
    fn test_unmapped_codes_are_never_success() {
        for code in ["", "000", "101", "302", "500", "504", "999", "ERR", " "] {
            assert_eq!(classify(code), Outcome::Verifying, "code {code:?}");
        }
    }

    #[test]
    fn test_totality_over_three_digit_codes() {
        let classifier = StatusClassifier::default();
        for n in 100..1000 {
            let code = StatusCode::new(n.to_string());
            let outcome = classifier.classify(&code);
            if outcome == Outcome::Success {
                assert!(code.as_str().starts_with('2'), "{code} classified as success");
            }
            if code.as_str().starts_with('4') && outcome != Outcome::Failure {
                assert!(
                    [NOT_ELIGIBLE_FOR_BYPASS, MAX_OTP_ATTEMPTS, WRONG_OTP].contains(&code.as_str())
                );
            }
        }
    }

    #[test]
    fn test_status_code_is_trimmed() {
        assert_eq!(classify(" 200 "), Outcome::Success);
    }

    #[test]
    fn test_provider_specific_designations() {
        let classifier = StatusClassifier::builder()
            .designate("504", Outcome::Verifying)
            .designate("411", Outcome::NeedsOtp)
            .build();
        assert_eq!(classifier.classify(&"411".into()), Outcome::NeedsOtp);
        assert_eq!(classifier.classify(&"504".into()), Outcome::Verifying);
        // Not designated for this provider, so the prefix rule applies.
        assert_eq!(classifier.classify(&"406".into()), Outcome::Failure);
    }

    #[test]
    fn test_outcome_kinds() {
        assert_eq!(Outcome::Success.kind(), OutcomeKind::Success);
        assert_eq!(Outcome::Failure.kind(), OutcomeKind::Failure);
        assert_eq!(Outcome::MaxOtpAttemptsExceeded.kind(), OutcomeKind::Failure);
        assert_eq!(Outcome::NotEligibleForBypass.kind(), OutcomeKind::Failure);
        assert_eq!(Outcome::NeedsOtp.kind(), OutcomeKind::NeedsAuth);
        assert_eq!(Outcome::WrongOtp.kind(), OutcomeKind::NeedsAuth);
    }

    #[test]
    fn test_registry_selects_provider_classifier() {
        let registry = ClassifierRegistry::default().with_provider(
            "napas",
            StatusClassifier::builder()
                .designate("504", Outcome::Verifying)
                .designate("411", Outcome::NeedsOtp)
                .build(),
        );
        let napas = ProviderCode::new("NAPAS");
        let vcb = ProviderCode::new("VCB");

        assert_eq!(registry.classify(Some(&napas), &"411".into()), Outcome::NeedsOtp);
        assert_eq!(registry.classify(Some(&vcb), &"411".into()), Outcome::Failure);
        assert_eq!(registry.classify(Some(&vcb), &"103".into()), Outcome::NeedsOtp);
        assert_eq!(registry.classify(None, &"407".into()), Outcome::WrongOtp);
    }
}
