//! Error types for the billing engine
//!
//! Every fallible operation returns [`BillingResult`]. Lifecycle events for
//! unknown customers are deliberately NOT an error: the provider may deliver
//! events for accounts outside this system (test mode, deleted accounts), so
//! handlers treat them as a no-op.

use thiserror::Error;

/// Result type for all billing operations
pub type BillingResult<T> = Result<T, BillingError>;

/// Billing engine errors
#[derive(Debug, Error)]
pub enum BillingError {
    /// A required field was missing or malformed. No state was changed.
    #[error("validation error: {0}")]
    Validation(String),

    /// An account, subscription, price, or plan reference could not be
    /// resolved. No state was changed.
    #[error("not found: {0}")]
    NotFound(String),

    /// The payment provider rejected or failed a call. The provider-supplied
    /// error code is surfaced verbatim when available. No local state is
    /// committed on this path.
    #[error("payment provider error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Provider {
        code: Option<String>,
        message: String,
    },

    /// The account's plan limit for the current period has been reached.
    #[error("usage limit reached for plan {plan} ({limit}/month)")]
    UsageLimitReached { plan: String, limit: u32 },

    /// The account's subscription is neither active nor trialing.
    #[error("subscription is not active or trialing")]
    SubscriptionInactive,

    /// Missing or invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The account ledger failed to read or persist a record.
    #[error("ledger error: {0}")]
    Storage(String),

    /// Notification delivery failed. Callers treat this as best-effort:
    /// it never rolls back a committed state update.
    #[error("notification delivery failed: {0}")]
    Notification(String),
}

impl BillingError {
    /// Provider error without a provider-supplied code
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            code: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_formats_code_when_present() {
        let err = BillingError::Provider {
            code: Some("resource_missing".to_string()),
            message: "No such subscription".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "payment provider error [resource_missing]: No such subscription"
        );

        let err = BillingError::provider("timeout");
        assert_eq!(err.to_string(), "payment provider error: timeout");
    }
}
