//! Billing audit events
//!
//! Every state transition the engines make is mirrored into an append-only
//! event stream for audit and debugging. Recording is best-effort: a sink
//! failure is logged and never aborts the billing operation that produced it.

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Kinds of billing events the engines emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventType {
    AccountRegistered,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
    PlanChanged,
    InvoicePaid,
    InvoicePaymentFailed,
    InvoiceVoided,
    UsageRecorded,
    UsageReset,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountRegistered => "account_registered",
            Self::SubscriptionCreated => "subscription_created",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionCanceled => "subscription_canceled",
            Self::PlanChanged => "plan_changed",
            Self::InvoicePaid => "invoice_paid",
            Self::InvoicePaymentFailed => "invoice_payment_failed",
            Self::InvoiceVoided => "invoice_voided",
            Self::UsageRecorded => "usage_recorded",
            Self::UsageReset => "usage_reset",
        }
    }
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded billing event
#[derive(Debug, Clone, Serialize)]
pub struct BillingEvent {
    pub account_id: Uuid,
    pub event_type: BillingEventType,
    pub data: serde_json::Value,
    /// Provider-side reference the event relates to, when one exists
    pub subscription_ref: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

/// Builder for [`BillingEvent`]
pub struct BillingEventBuilder {
    account_id: Uuid,
    event_type: BillingEventType,
    data: serde_json::Value,
    subscription_ref: Option<String>,
}

impl BillingEventBuilder {
    pub fn new(account_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            account_id,
            event_type,
            data: serde_json::Value::Null,
            subscription_ref: None,
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn subscription_ref(mut self, subscription_ref: impl Into<String>) -> Self {
        self.subscription_ref = Some(subscription_ref.into());
        self
    }

    pub fn build(self) -> BillingEvent {
        BillingEvent {
            account_id: self.account_id,
            event_type: self.event_type,
            data: self.data,
            subscription_ref: self.subscription_ref,
            recorded_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Destination for billing events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: BillingEvent) -> BillingResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_carries_all_fields() {
        let account_id = Uuid::new_v4();
        let event = BillingEventBuilder::new(account_id, BillingEventType::PlanChanged)
            .data(serde_json::json!({ "from": "Basic", "to": "Pro" }))
            .subscription_ref("sub_123")
            .build();
        assert_eq!(event.account_id, account_id);
        assert_eq!(event.event_type, BillingEventType::PlanChanged);
        assert_eq!(event.subscription_ref.as_deref(), Some("sub_123"));
        assert_eq!(event.data["to"], "Pro");
    }

    #[test]
    fn event_type_serializes_snake_case() {
        let json = serde_json::to_string(&BillingEventType::InvoicePaymentFailed)
            .unwrap_or_default();
        assert_eq!(json, "\"invoice_payment_failed\"");
    }
}
