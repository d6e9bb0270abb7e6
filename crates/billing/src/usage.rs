//! Usage metering against the plan limit
//!
//! Gates one unit of usage per call: the account must hold an active or
//! trial subscription and sit below its plan's monthly limit. Denials are
//! error values, never panics, so callers can branch on the kind.

use std::sync::Arc;

use serde::Serialize;

use crate::account::{Catalog, Ledger, SubscriptionStatus};
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventType, EventSink};

/// Proof that one unit of usage was recorded
#[derive(Debug, Clone, Serialize)]
pub struct UsageReceipt {
    pub plan: String,
    /// Counter value after this unit
    pub used_this_period: u32,
    pub limit: u32,
}

/// Checks and records per-period usage
pub struct UsageMeter {
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn Ledger>,
    event_sink: Arc<dyn EventSink>,
}

impl UsageMeter {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn Ledger>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            event_sink,
        }
    }

    /// Authorize and record one unit of usage for the account.
    ///
    /// Fails with `SubscriptionInactive` unless the status is Active or
    /// Trial, and with `UsageLimitReached` once the period counter hits the
    /// plan limit. The counter resets when the lifecycle engine processes a
    /// renewal invoice.
    pub async fn authorize(&self, email: &str) -> BillingResult<UsageReceipt> {
        let mut account = self
            .ledger
            .find_by_email(email)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("no account for {email}")))?;

        if !matches!(
            account.subscription_status,
            SubscriptionStatus::Active | SubscriptionStatus::Trial
        ) {
            tracing::debug!(
                account_id = %account.id,
                status = %account.subscription_status,
                "Usage denied: subscription not active"
            );
            return Err(BillingError::SubscriptionInactive);
        }

        let plan = self
            .catalog
            .plan_by_name(&account.plan)
            .await?
            .ok_or_else(|| {
                BillingError::Config(format!("plan '{}' is not in the catalog", account.plan))
            })?;

        if account.usage_this_period >= plan.monthly_usage_limit {
            tracing::info!(
                account_id = %account.id,
                plan = %plan.name,
                limit = plan.monthly_usage_limit,
                "Usage denied: monthly limit reached"
            );
            return Err(BillingError::UsageLimitReached {
                plan: plan.name,
                limit: plan.monthly_usage_limit,
            });
        }

        account.usage_this_period += 1;
        self.ledger.persist(&account).await?;

        if let Err(e) = self
            .event_sink
            .record(
                BillingEventBuilder::new(account.id, BillingEventType::UsageRecorded)
                    .data(serde_json::json!({
                        "used_this_period": account.usage_this_period,
                        "limit": plan.monthly_usage_limit,
                    }))
                    .build(),
            )
            .await
        {
            tracing::warn!(error = %e, "Failed to record billing event");
        }

        Ok(UsageReceipt {
            plan: plan.name,
            used_this_period: account.usage_this_period,
            limit: plan.monthly_usage_limit,
        })
    }
}
