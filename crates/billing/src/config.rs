//! Engine configuration
//!
//! All configuration is an explicit value injected at construction; there is
//! no process-wide mutable state. Provider credentials live with the
//! `PaymentProvider` implementation, not here.

use crate::error::{BillingError, BillingResult};

/// Configuration for the billing engine
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Length of the free trial granted at registration, in days
    pub trial_days: i64,
    /// Catalog name of the plan assigned during the trial
    pub trial_plan: String,
    /// Currency reported when the provider does not supply one
    pub default_currency: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            trial_days: 14,
            trial_plan: "FreeTrial".to_string(),
            default_currency: "usd".to_string(),
        }
    }
}

impl BillingConfig {
    /// Load configuration from `PRORATA_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> BillingResult<Self> {
        let defaults = Self::default();

        let trial_days = match std::env::var("PRORATA_TRIAL_DAYS") {
            Ok(raw) => raw.parse::<i64>().map_err(|_| {
                BillingError::Config(format!("PRORATA_TRIAL_DAYS must be an integer, got '{raw}'"))
            })?,
            Err(_) => defaults.trial_days,
        };

        if trial_days < 0 {
            return Err(BillingError::Config(
                "PRORATA_TRIAL_DAYS must not be negative".to_string(),
            ));
        }

        Ok(Self {
            trial_days,
            trial_plan: std::env::var("PRORATA_TRIAL_PLAN").unwrap_or(defaults.trial_plan),
            default_currency: std::env::var("PRORATA_DEFAULT_CURRENCY")
                .unwrap_or(defaults.default_currency),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_seeded_trial() {
        let config = BillingConfig::default();
        assert_eq!(config.trial_days, 14);
        assert_eq!(config.trial_plan, "FreeTrial");
        assert_eq!(config.default_currency, "usd");
    }
}
