//! Local account model and the collaborator seams around it
//!
//! The account record is the durable source of truth for subscription state.
//! Persistence mechanics live behind [`Ledger`]; the plan catalog behind
//! [`Catalog`]; outbound notifications behind [`Notifier`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Local subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Trial,
    PendingCancel,
    PastDue,
    Incomplete,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Trial => "Trial",
            Self::PendingCancel => "PendingCancel",
            Self::PastDue => "PastDue",
            Self::Incomplete => "Incomplete",
            Self::Canceled => "Canceled",
        }
    }

    /// Whether this status grants premium features
    pub fn grants_premium(&self) -> bool {
        matches!(self, Self::Active | Self::Trial | Self::PendingCancel)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local subscriber record
///
/// `has_premium_features` and `subscription_end` are derived state: they are
/// only ever written from a StatusMapper pass (or the documented invoice
/// overrides in the lifecycle engine), never set independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    /// Provider customer reference; lookup key for all lifecycle events
    pub customer_ref: String,
    /// Provider subscription reference; None until a subscription exists
    pub subscription_ref: Option<String>,
    /// Name of the currently assigned plan (mirrors the provider price)
    pub plan: String,
    pub subscription_status: SubscriptionStatus,
    pub has_premium_features: bool,
    /// Meaning depends on status: trial end, scheduled cancel date, or
    /// actual end
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_end: Option<OffsetDateTime>,
    /// Usage this billing period; reset only on successful new-period
    /// invoice events
    pub usage_this_period: u32,
}

/// Catalog entry
///
/// Seeded at initialization; never mutated by lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub monthly_usage_limit: u32,
    /// Provider price reference; None for trial-only plans
    pub price_ref: Option<String>,
}

/// Plan catalog lookup
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn plan_by_name(&self, name: &str) -> BillingResult<Option<Plan>>;
    async fn plan_by_price_ref(&self, price_ref: &str) -> BillingResult<Option<Plan>>;
}

/// Account store
///
/// `persist` writes the whole record atomically: either the full reconciled
/// state commits or none of it does.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn find_by_customer_ref(&self, customer_ref: &str) -> BillingResult<Option<Account>>;
    async fn find_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> BillingResult<Option<Account>>;
    async fn find_by_email(&self, email: &str) -> BillingResult<Option<Account>>;
    async fn persist(&self, account: &Account) -> BillingResult<()>;
}

/// Outbound notification channel. Best-effort: delivery failure never rolls
/// back the state update that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, address: &str, subject: &str, body: &str) -> BillingResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premium_follows_status() {
        assert!(SubscriptionStatus::Active.grants_premium());
        assert!(SubscriptionStatus::Trial.grants_premium());
        assert!(SubscriptionStatus::PendingCancel.grants_premium());
        assert!(!SubscriptionStatus::PastDue.grants_premium());
        assert!(!SubscriptionStatus::Incomplete.grants_premium());
        assert!(!SubscriptionStatus::Canceled.grants_premium());
    }

    #[test]
    fn status_display_matches_stored_form() {
        assert_eq!(SubscriptionStatus::PendingCancel.to_string(), "PendingCancel");
        assert_eq!(SubscriptionStatus::PastDue.as_str(), "PastDue");
    }
}
