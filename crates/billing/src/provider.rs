//! Payment provider boundary
//!
//! The engine never talks to a billing provider SDK directly. It consumes
//! raw subscription/invoice facts and emits calls through the
//! [`PaymentProvider`] trait; the transport (HTTP client, SDK, signature
//! verification) is the implementor's concern.
//!
//! Provider-side string enums ("active", "create_prorations", ...) are
//! validated once at this boundary into closed types so internal logic is
//! exhaustively matched rather than string-compared.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::{BillingError, BillingResult};

/// Subscription status as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Unpaid,
    Canceled,
    Incomplete,
    IncompleteExpired,
}

impl ProviderSubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
        }
    }

    /// Parse a provider wire value. Unknown values are a validation error so
    /// they surface at ingestion instead of deep inside a mapping pass.
    pub fn from_wire(raw: &str) -> BillingResult<Self> {
        match raw {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "past_due" => Ok(Self::PastDue),
            "unpaid" => Ok(Self::Unpaid),
            "canceled" => Ok(Self::Canceled),
            "incomplete" => Ok(Self::Incomplete),
            "incomplete_expired" => Ok(Self::IncompleteExpired),
            other => Err(BillingError::Validation(format!(
                "unknown provider subscription status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderSubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the provider should handle proration when a subscription changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProrationBehavior {
    /// Prorated charges/credits applied to the next invoice
    CreateProrations,
    /// Prorations invoiced and charged immediately
    AlwaysInvoice,
    /// No proration; full new price from the next billing cycle
    None,
    /// Queue the change while the current invoice is incomplete
    PendingIfIncomplete,
}

impl ProrationBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProrations => "create_prorations",
            Self::AlwaysInvoice => "always_invoice",
            Self::None => "none",
            Self::PendingIfIncomplete => "pending_if_incomplete",
        }
    }
}

impl std::fmt::Display for ProrationBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a plan change resets the billing cycle anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorPolicy {
    /// Keep the existing renewal date
    #[default]
    Unchanged,
    /// Start a new billing period immediately
    Now,
}

/// Why the provider issued an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingReason {
    /// First invoice of a new subscription
    SubscriptionCreate,
    /// Renewal at the start of a new billing period
    SubscriptionCycle,
    /// Invoice issued because the subscription changed mid-period
    SubscriptionUpdate,
    /// Manually created invoice
    Manual,
}

/// The single line item of a provider subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionItemFacts {
    pub item_id: String,
    pub price_ref: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
}

/// Ephemeral snapshot of a provider subscription
///
/// Consumed once per mapping pass and never persisted verbatim; the durable
/// record is the reconciled [`Account`](crate::account::Account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionFacts {
    pub subscription_ref: String,
    pub customer_ref: String,
    pub status: ProviderSubscriptionStatus,
    pub cancel_at_period_end: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub cancel_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub item: Option<SubscriptionItemFacts>,
}

/// Ephemeral snapshot of a provider invoice, as delivered with invoice
/// lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceFacts {
    pub customer_ref: String,
    pub subscription_ref: Option<String>,
    pub billing_reason: Option<BillingReason>,
    pub amount_paid_cents: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub voided_at: Option<OffsetDateTime>,
}

/// Billing interval of a recurring price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringInterval {
    Day,
    Week,
    Month,
    Year,
}

/// A provider price (catalog entry on the provider side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceInfo {
    pub price_ref: String,
    pub unit_amount_cents: i64,
    pub currency: String,
    pub interval: RecurringInterval,
    pub interval_count: u32,
}

impl PriceInfo {
    /// An annual price is either a true yearly price or a monthly price
    /// billed twelve months at a time.
    pub fn is_annual(&self) -> bool {
        match self.interval {
            RecurringInterval::Year => true,
            RecurringInterval::Month => self.interval_count == 12,
            _ => false,
        }
    }
}

/// One line of a hypothetical (preview) invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewLineItem {
    pub description: Option<String>,
    /// Negative amounts are credits, positive amounts are charges
    pub amount_cents: i64,
}

/// A hypothetical invoice built by the provider for a plan-change preview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePreviewFacts {
    pub line_items: Vec<PreviewLineItem>,
    pub amount_due_cents: i64,
    pub currency: String,
}

/// Options for creating a provider subscription
#[derive(Debug, Clone, Default)]
pub struct CreateSubscriptionOptions {
    pub proration_behavior: Option<ProrationBehavior>,
    /// Virtual start date in the past, so the provider's own proration math
    /// produces the desired partial first charge
    pub backdate_start: Option<Date>,
    /// Date the full-price billing cycle anchors to
    pub billing_cycle_anchor: Option<Date>,
    /// Trial end for subscriptions that begin with a trial period
    pub trial_end: Option<OffsetDateTime>,
}

/// Capability the billing provider collaborator implements
///
/// Implementations own transport, credentials, and vendor-specific parameter
/// translation. The engine assumes at-most-one in-flight mutation per
/// subscription reference; callers serialize concurrent changes upstream.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Fetch the current snapshot of a subscription
    async fn get_subscription(&self, subscription_ref: &str) -> BillingResult<SubscriptionFacts>;

    /// Swap the price on an existing subscription item
    async fn update_subscription_item(
        &self,
        subscription_ref: &str,
        item_id: &str,
        new_price_ref: &str,
        proration_behavior: ProrationBehavior,
        anchor: AnchorPolicy,
    ) -> BillingResult<SubscriptionFacts>;

    /// Fetch a price by reference
    async fn get_price(&self, price_ref: &str) -> BillingResult<PriceInfo>;

    /// Build a hypothetical invoice for swapping the item to a new price
    async fn create_invoice_preview(
        &self,
        customer_ref: &str,
        item_id: &str,
        new_price_ref: &str,
    ) -> BillingResult<InvoicePreviewFacts>;

    /// Create a provider customer, returning its reference
    async fn create_customer(&self, email: &str) -> BillingResult<String>;

    /// Create a subscription for a customer
    async fn create_subscription(
        &self,
        customer_ref: &str,
        price_ref: &str,
        payment_method_ref: &str,
        options: CreateSubscriptionOptions,
    ) -> BillingResult<SubscriptionFacts>;

    /// Cancel a subscription, either immediately or at period end
    async fn cancel_subscription(
        &self,
        subscription_ref: &str,
        at_period_end: bool,
    ) -> BillingResult<SubscriptionFacts>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_round_trip() {
        for raw in [
            "active",
            "trialing",
            "past_due",
            "unpaid",
            "canceled",
            "incomplete",
            "incomplete_expired",
        ] {
            let status = ProviderSubscriptionStatus::from_wire(raw).unwrap();
            assert_eq!(status.as_str(), raw);
        }
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = ProviderSubscriptionStatus::from_wire("paused").unwrap_err();
        assert!(matches!(err, crate::error::BillingError::Validation(_)));
    }

    #[test]
    fn annual_price_detection() {
        let yearly = PriceInfo {
            price_ref: "price_year".to_string(),
            unit_amount_cents: 120_000,
            currency: "usd".to_string(),
            interval: RecurringInterval::Year,
            interval_count: 1,
        };
        assert!(yearly.is_annual());

        let twelve_months = PriceInfo {
            interval: RecurringInterval::Month,
            interval_count: 12,
            ..yearly.clone()
        };
        assert!(twelve_months.is_annual());

        let monthly = PriceInfo {
            interval: RecurringInterval::Month,
            interval_count: 1,
            ..yearly.clone()
        };
        assert!(!monthly.is_annual());

        let weekly = PriceInfo {
            interval: RecurringInterval::Week,
            interval_count: 12,
            ..yearly
        };
        assert!(!weekly.is_annual());
    }
}
