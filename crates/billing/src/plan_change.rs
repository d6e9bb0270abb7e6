//! Plan change orchestration
//!
//! Swaps a subscription's price, previews the proration an intended swap
//! would produce, and creates mid-cycle annual commitments whose first
//! charge is prorated via a backdated start.
//!
//! Reads-then-writes the provider's current item id; callers must not run
//! two changes for the same subscription concurrently.

use std::sync::Arc;

use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::account::{Catalog, Ledger, SubscriptionStatus};
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventType, EventSink};
use crate::proration::{add_months, annual_prorated_amount, calc_addon_proration, ProrationSchedule};
use crate::provider::{
    AnchorPolicy, CreateSubscriptionOptions, PaymentProvider, ProrationBehavior,
};
use crate::status::map_facts;

/// Outcome of a completed plan change
#[derive(Debug, Clone, Serialize)]
pub struct PlanChangeResult {
    pub old_price_ref: String,
    pub new_price_ref: String,
    pub is_upgrade: bool,
    pub is_downgrade: bool,
    /// Behavior actually sent to the provider, after the upgrade escalation
    pub applied_behavior: ProrationBehavior,
    /// When the new price takes effect: now on an anchor reset, otherwise
    /// the current period end
    #[serde(with = "time::serde::rfc3339")]
    pub effective_date: OffsetDateTime,
    /// Amount charged for the change when the provider reports it inline.
    /// None means unknown, not zero.
    pub prorated_amount_due: Option<i64>,
    pub status: SubscriptionStatus,
    pub plan: String,
}

/// Read-only proration preview for an intended plan change
#[derive(Debug, Clone, Serialize)]
pub struct PlanChangePreview {
    pub old_price_ref: String,
    pub new_price_ref: String,
    pub old_price_amount_cents: i64,
    pub new_price_amount_cents: i64,
    pub is_upgrade: bool,
    pub is_downgrade: bool,
    /// Sum of the preview invoice's negative lines; zero or negative
    pub prorated_credits_cents: i64,
    /// Sum of the preview invoice's positive lines; zero or positive
    pub prorated_charges_cents: i64,
    pub immediate_amount_due_cents: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_billing_date: Option<OffsetDateTime>,
    pub currency: String,
    /// True when the provider could not build a hypothetical invoice and
    /// the numbers are a simple price-difference estimate
    pub estimated: bool,
}

/// Outcome of creating a mid-cycle annual commitment
#[derive(Debug, Clone, Serialize)]
pub struct AnnualCommitmentResult {
    pub subscription_ref: String,
    pub schedule: ProrationSchedule,
    /// Floor-rounded first-year charge for the remaining days
    pub prorated_amount_cents: i64,
    pub status: SubscriptionStatus,
}

/// Orchestrates upgrades, downgrades, and annual commitments
pub struct PlanChangeEngine {
    provider: Arc<dyn PaymentProvider>,
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn Ledger>,
    event_sink: Arc<dyn EventSink>,
}

impl PlanChangeEngine {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn Ledger>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            provider,
            catalog,
            ledger,
            event_sink,
        }
    }

    /// Swap the subscription's single item to a new price and reconcile the
    /// local account in one persist.
    ///
    /// An upgrade requested with `CreateProrations` escalates to
    /// `AlwaysInvoice` so the difference is charged immediately; downgrades
    /// keep the caller's behavior and the credit lands on the next invoice.
    pub async fn change_plan(
        &self,
        subscription_ref: &str,
        new_price_ref: &str,
        behavior: ProrationBehavior,
        reset_billing_cycle: bool,
    ) -> BillingResult<PlanChangeResult> {
        if subscription_ref.trim().is_empty() || new_price_ref.trim().is_empty() {
            return Err(BillingError::Validation(
                "subscription and price references must not be blank".into(),
            ));
        }

        let current = self.provider.get_subscription(subscription_ref).await?;
        let item = current.item.as_ref().ok_or_else(|| {
            BillingError::NotFound(format!(
                "subscription {subscription_ref} has no line item"
            ))
        })?;

        let old_price = self.provider.get_price(&item.price_ref).await?;
        let new_price = self.provider.get_price(new_price_ref).await?;

        let is_upgrade = new_price.unit_amount_cents > old_price.unit_amount_cents;
        let is_downgrade = new_price.unit_amount_cents < old_price.unit_amount_cents;

        let applied_behavior = if behavior == ProrationBehavior::CreateProrations && is_upgrade {
            ProrationBehavior::AlwaysInvoice
        } else {
            behavior
        };
        let anchor = if reset_billing_cycle {
            AnchorPolicy::Now
        } else {
            AnchorPolicy::Unchanged
        };

        tracing::info!(
            subscription_ref = %subscription_ref,
            old_price = %old_price.price_ref,
            new_price = %new_price.price_ref,
            behavior = %applied_behavior,
            is_upgrade,
            "Changing subscription plan"
        );

        let updated = self
            .provider
            .update_subscription_item(
                subscription_ref,
                &item.item_id,
                new_price_ref,
                applied_behavior,
                anchor,
            )
            .await?;

        let now = OffsetDateTime::now_utc();
        let effective_date = if reset_billing_cycle {
            now
        } else {
            updated
                .item
                .as_ref()
                .and_then(|i| i.current_period_end)
                .unwrap_or_else(|| now.replace_date(add_months(now.date(), 1)))
        };

        let mut account = self
            .ledger
            .find_by_subscription_ref(subscription_ref)
            .await?
            .ok_or_else(|| {
                BillingError::NotFound(format!(
                    "no account for subscription {subscription_ref}"
                ))
            })?;

        if let Some(plan) = self.catalog.plan_by_price_ref(new_price_ref).await? {
            account.plan = plan.name;
        } else {
            tracing::warn!(
                account_id = %account.id,
                price_ref = %new_price_ref,
                "New price has no catalog plan; keeping current plan name"
            );
        }

        let mapping = map_facts(&updated);
        account.subscription_status = mapping.status;
        account.has_premium_features = mapping.has_premium;
        account.subscription_end = mapping.subscription_end;
        self.ledger.persist(&account).await?;

        self.record_event(
            BillingEventBuilder::new(account.id, BillingEventType::PlanChanged)
                .data(serde_json::json!({
                    "old_price_ref": old_price.price_ref,
                    "new_price_ref": new_price.price_ref,
                    "is_upgrade": is_upgrade,
                    "behavior": applied_behavior.as_str(),
                }))
                .subscription_ref(subscription_ref),
        )
        .await;

        Ok(PlanChangeResult {
            old_price_ref: old_price.price_ref,
            new_price_ref: new_price.price_ref,
            is_upgrade,
            is_downgrade,
            applied_behavior,
            effective_date,
            // Inline amounts are not part of the update response; callers
            // wanting exact numbers use the preview.
            prorated_amount_due: None,
            status: account.subscription_status,
            plan: account.plan,
        })
    }

    /// Build a read-only proration preview for swapping to `new_price_ref`.
    ///
    /// Mutates nothing. When the provider cannot produce a hypothetical
    /// invoice the preview degrades to a signed price-difference estimate
    /// and says so via `estimated`.
    pub async fn preview_plan_change(
        &self,
        subscription_ref: &str,
        new_price_ref: &str,
    ) -> BillingResult<PlanChangePreview> {
        if subscription_ref.trim().is_empty() || new_price_ref.trim().is_empty() {
            return Err(BillingError::Validation(
                "subscription and price references must not be blank".into(),
            ));
        }

        let current = self.provider.get_subscription(subscription_ref).await?;
        let item = current.item.as_ref().ok_or_else(|| {
            BillingError::NotFound(format!(
                "subscription {subscription_ref} has no line item"
            ))
        })?;

        let old_price = self.provider.get_price(&item.price_ref).await?;
        let new_price = self.provider.get_price(new_price_ref).await?;
        let is_upgrade = new_price.unit_amount_cents > old_price.unit_amount_cents;
        let is_downgrade = new_price.unit_amount_cents < old_price.unit_amount_cents;
        let next_billing_date = item.current_period_end;

        match self
            .provider
            .create_invoice_preview(&current.customer_ref, &item.item_id, new_price_ref)
            .await
        {
            Ok(preview) => {
                let credits: i64 = preview
                    .line_items
                    .iter()
                    .map(|l| l.amount_cents)
                    .filter(|a| *a < 0)
                    .sum();
                let charges: i64 = preview
                    .line_items
                    .iter()
                    .map(|l| l.amount_cents)
                    .filter(|a| *a > 0)
                    .sum();
                Ok(PlanChangePreview {
                    old_price_ref: old_price.price_ref,
                    new_price_ref: new_price.price_ref,
                    old_price_amount_cents: old_price.unit_amount_cents,
                    new_price_amount_cents: new_price.unit_amount_cents,
                    is_upgrade,
                    is_downgrade,
                    prorated_credits_cents: credits,
                    prorated_charges_cents: charges,
                    immediate_amount_due_cents: preview.amount_due_cents,
                    next_billing_date,
                    currency: preview.currency,
                    estimated: false,
                })
            }
            Err(e) => {
                tracing::warn!(
                    subscription_ref = %subscription_ref,
                    error = %e,
                    "Provider preview unavailable; falling back to price-difference estimate"
                );
                let diff = new_price.unit_amount_cents - old_price.unit_amount_cents;
                Ok(PlanChangePreview {
                    old_price_ref: old_price.price_ref,
                    new_price_ref: new_price.price_ref,
                    old_price_amount_cents: old_price.unit_amount_cents,
                    new_price_amount_cents: new_price.unit_amount_cents,
                    is_upgrade,
                    is_downgrade,
                    prorated_credits_cents: diff.min(0),
                    prorated_charges_cents: diff.max(0),
                    immediate_amount_due_cents: diff.max(0),
                    next_billing_date,
                    currency: new_price.currency.clone(),
                    estimated: true,
                })
            }
        }
    }

    /// Create an annual subscription part-way through a billing year.
    ///
    /// The commitment aligns to the caller's `period_end`; the provider's
    /// own proration produces the partial first charge via the backdated
    /// start and billing anchor from the schedule.
    pub async fn create_annual_commitment(
        &self,
        email: &str,
        price_ref: &str,
        payment_method_ref: &str,
        start_date: Option<Date>,
        period_end: Date,
    ) -> BillingResult<AnnualCommitmentResult> {
        let mut account = self
            .ledger
            .find_by_email(email)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("no account for {email}")))?;

        let price = self.provider.get_price(price_ref).await?;
        if !price.is_annual() {
            return Err(BillingError::Validation(format!(
                "price {price_ref} is not billed annually"
            )));
        }

        let now = start_date.unwrap_or_else(|| OffsetDateTime::now_utc().date());
        let schedule = calc_addon_proration(now, period_end);
        let prorated_amount_cents =
            annual_prorated_amount(price.unit_amount_cents, schedule.backdate_start);

        tracing::info!(
            account_id = %account.id,
            price_ref = %price_ref,
            billable_months = schedule.billable_months,
            extra_days = schedule.extra_days,
            "Creating annual commitment"
        );

        let facts = self
            .provider
            .create_subscription(
                &account.customer_ref,
                price_ref,
                payment_method_ref,
                CreateSubscriptionOptions {
                    proration_behavior: Some(ProrationBehavior::CreateProrations),
                    backdate_start: Some(schedule.backdate_start),
                    billing_cycle_anchor: Some(schedule.billing_anchor),
                    trial_end: None,
                },
            )
            .await?;

        account.subscription_ref = Some(facts.subscription_ref.clone());
        if let Some(plan) = self.catalog.plan_by_price_ref(price_ref).await? {
            account.plan = plan.name;
        }
        let mapping = map_facts(&facts);
        account.subscription_status = mapping.status;
        account.has_premium_features = mapping.has_premium;
        account.subscription_end = mapping.subscription_end;
        self.ledger.persist(&account).await?;

        self.record_event(
            BillingEventBuilder::new(account.id, BillingEventType::SubscriptionCreated)
                .data(serde_json::json!({
                    "price_ref": price_ref,
                    "billable_months": schedule.billable_months,
                    "extra_days": schedule.extra_days,
                    "prorated_amount_cents": prorated_amount_cents,
                }))
                .subscription_ref(&facts.subscription_ref),
        )
        .await;

        Ok(AnnualCommitmentResult {
            subscription_ref: facts.subscription_ref,
            schedule,
            prorated_amount_cents,
            status: account.subscription_status,
        })
    }

    async fn record_event(&self, builder: BillingEventBuilder) {
        if let Err(e) = self.event_sink.record(builder.build()).await {
            tracing::warn!(error = %e, "Failed to record billing event");
        }
    }
}
