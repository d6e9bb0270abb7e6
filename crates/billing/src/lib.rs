// Billing crate clippy configuration
#![allow(clippy::module_name_repetitions)] // BillingError, BillingEvent etc. read better qualified
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Prorata Billing Engine
//!
//! Reconciles subscription state between a billing provider and the local
//! account ledger.
//!
//! ## Features
//!
//! - **Status Mapping**: Pure translation of provider subscription facts
//!   into local status, entitlement, and end date
//! - **Lifecycle Engine**: Idempotent, event-driven state transitions with
//!   usage-counter resets and best-effort notifications
//! - **Plan Changes**: Upgrades and downgrades with proration policy,
//!   read-only previews with a degraded price-difference fallback
//! - **Annual Commitments**: Mid-cycle annual subscriptions prorated via a
//!   backdated start and computed billing anchor
//! - **Customer Onboarding**: Registration with a time-boxed trial
//! - **Usage Metering**: Per-period counters gated against plan limits
//!
//! Transport, persistence, and the provider SDK live behind the traits in
//! [`provider`], [`account`], and [`events`].

pub mod account;
pub mod config;
pub mod customer;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod plan_change;
pub mod proration;
pub mod provider;
pub mod status;
pub mod usage;


// Account model
pub use account::{Account, Catalog, Ledger, Notifier, Plan, SubscriptionStatus};

// Configuration
pub use config::BillingConfig;

// Customer onboarding
pub use customer::CustomerService;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{BillingEvent, BillingEventBuilder, BillingEventType, EventSink};

// Lifecycle
pub use lifecycle::{LifecycleEvent, SubscriptionLifecycleEngine};

// Plan changes
pub use plan_change::{
    AnnualCommitmentResult, PlanChangeEngine, PlanChangePreview, PlanChangeResult,
};

// Proration
pub use proration::{annual_prorated_amount, calc_addon_proration, ProrationSchedule};

// Provider boundary
pub use provider::{
    AnchorPolicy, BillingReason, CreateSubscriptionOptions, InvoiceFacts, InvoicePreviewFacts,
    PaymentProvider, PreviewLineItem, PriceInfo, ProrationBehavior, ProviderSubscriptionStatus,
    RecurringInterval, SubscriptionFacts, SubscriptionItemFacts,
};

// Status mapping
pub use status::{map_facts, map_subscription_status, StatusMapping};

// Usage metering
pub use usage::{UsageMeter, UsageReceipt};
