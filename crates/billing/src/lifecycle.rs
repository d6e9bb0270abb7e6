//! Subscription lifecycle engine
//!
//! Applies provider lifecycle events to the local account record. Every
//! handler recomputes the target state from the event's embedded facts, so
//! redelivered events are naturally idempotent. Events for customers this
//! system does not know are ignored without error; the provider may emit
//! events for accounts outside our purview.
//!
//! Webhook transport, signature verification, and envelope parsing are the
//! caller's concern; this engine receives already-deserialized facts.

use std::sync::Arc;

use crate::account::{Account, Catalog, Ledger, Notifier, SubscriptionStatus};
use crate::error::BillingResult;
use crate::events::{BillingEventBuilder, BillingEventType, EventSink};
use crate::provider::{
    BillingReason, InvoiceFacts, PaymentProvider, ProviderSubscriptionStatus, SubscriptionFacts,
};
use crate::status::map_facts;

/// A provider lifecycle event, already verified and deserialized
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    SubscriptionCreated(SubscriptionFacts),
    SubscriptionUpdated(SubscriptionFacts),
    SubscriptionDeleted(SubscriptionFacts),
    InvoicePaid(InvoiceFacts),
    InvoiceFailed(InvoiceFacts),
    InvoiceVoided(InvoiceFacts),
    ChargeSucceeded { customer_ref: String },
    PaymentIntentSucceeded { customer_ref: String },
    PaymentIntentCanceled { customer_ref: String },
}

impl LifecycleEvent {
    fn customer_ref(&self) -> &str {
        match self {
            Self::SubscriptionCreated(facts)
            | Self::SubscriptionUpdated(facts)
            | Self::SubscriptionDeleted(facts) => &facts.customer_ref,
            Self::InvoicePaid(facts) | Self::InvoiceFailed(facts) | Self::InvoiceVoided(facts) => {
                &facts.customer_ref
            }
            Self::ChargeSucceeded { customer_ref }
            | Self::PaymentIntentSucceeded { customer_ref }
            | Self::PaymentIntentCanceled { customer_ref } => customer_ref,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::SubscriptionCreated(_) => "subscription_created",
            Self::SubscriptionUpdated(_) => "subscription_updated",
            Self::SubscriptionDeleted(_) => "subscription_deleted",
            Self::InvoicePaid(_) => "invoice_paid",
            Self::InvoiceFailed(_) => "invoice_failed",
            Self::InvoiceVoided(_) => "invoice_voided",
            Self::ChargeSucceeded { .. } => "charge_succeeded",
            Self::PaymentIntentSucceeded { .. } => "payment_intent_succeeded",
            Self::PaymentIntentCanceled { .. } => "payment_intent_canceled",
        }
    }
}

/// Drives account state from provider lifecycle events
pub struct SubscriptionLifecycleEngine {
    provider: Arc<dyn PaymentProvider>,
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn Notifier>,
    event_sink: Arc<dyn EventSink>,
}

impl SubscriptionLifecycleEngine {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            provider,
            catalog,
            ledger,
            notifier,
            event_sink,
        }
    }

    /// Apply one lifecycle event.
    ///
    /// Returns Ok(()) without touching anything when the customer reference
    /// is unknown.
    pub async fn handle_event(&self, event: LifecycleEvent) -> BillingResult<()> {
        let customer_ref = event.customer_ref().to_owned();
        let Some(account) = self.ledger.find_by_customer_ref(&customer_ref).await? else {
            tracing::debug!(
                customer_ref = %customer_ref,
                event = event.name(),
                "Ignoring lifecycle event for unknown customer"
            );
            return Ok(());
        };

        tracing::info!(
            account_id = %account.id,
            customer_ref = %customer_ref,
            event = event.name(),
            "Processing lifecycle event"
        );

        match event {
            LifecycleEvent::SubscriptionCreated(facts) => {
                self.apply_subscription_facts(account, &facts, BillingEventType::SubscriptionCreated)
                    .await
            }
            LifecycleEvent::SubscriptionUpdated(facts) => {
                self.apply_subscription_facts(account, &facts, BillingEventType::SubscriptionUpdated)
                    .await
            }
            LifecycleEvent::SubscriptionDeleted(facts) => {
                self.apply_subscription_facts(account, &facts, BillingEventType::SubscriptionCanceled)
                    .await
            }
            LifecycleEvent::InvoicePaid(facts) => self.handle_invoice_paid(account, &facts).await,
            LifecycleEvent::InvoiceFailed(facts) => {
                self.handle_invoice_failed(account, &facts).await
            }
            LifecycleEvent::InvoiceVoided(facts) => {
                self.handle_invoice_voided(account, &facts).await
            }
            LifecycleEvent::ChargeSucceeded { .. }
            | LifecycleEvent::PaymentIntentSucceeded { .. } => {
                self.set_payment_confirmed(account).await
            }
            LifecycleEvent::PaymentIntentCanceled { .. } => {
                self.set_payment_canceled(account).await
            }
        }
    }

    /// Shared path for subscription created/updated/deleted: re-derive the
    /// plan from the current price, recompute status through the mapper,
    /// persist, then notify.
    async fn apply_subscription_facts(
        &self,
        mut account: Account,
        facts: &SubscriptionFacts,
        event_type: BillingEventType,
    ) -> BillingResult<()> {
        if account.subscription_ref.is_none() {
            account.subscription_ref = Some(facts.subscription_ref.clone());
        }

        if let Some(item) = &facts.item {
            if let Some(plan) = self.catalog.plan_by_price_ref(&item.price_ref).await? {
                account.plan = plan.name;
            } else {
                tracing::warn!(
                    account_id = %account.id,
                    price_ref = %item.price_ref,
                    "Subscription price has no catalog plan; keeping current plan"
                );
            }
        }

        let mapping = map_facts(facts);
        account.subscription_status = mapping.status;
        account.has_premium_features = mapping.has_premium;
        account.subscription_end = mapping.subscription_end;

        self.ledger.persist(&account).await?;

        tracing::info!(
            account_id = %account.id,
            status = %account.subscription_status,
            plan = %account.plan,
            "Subscription state reconciled"
        );

        self.record_event(
            BillingEventBuilder::new(account.id, event_type)
                .data(serde_json::json!({
                    "status": account.subscription_status.as_str(),
                    "plan": account.plan,
                    "cancel_at_period_end": facts.cancel_at_period_end,
                }))
                .subscription_ref(&facts.subscription_ref),
        )
        .await;

        self.notify_status(&account).await;
        Ok(())
    }

    /// A paid invoice either confirms a trial start or confirms an active
    /// paid period.
    ///
    /// The trial guard matters: the zero-amount invoice the provider issues
    /// when a trial subscription is created must not flip the account to
    /// Active or burn a usage reset.
    async fn handle_invoice_paid(
        &self,
        mut account: Account,
        facts: &InvoiceFacts,
    ) -> BillingResult<()> {
        let mut trial_end = None;
        let mut subscription_trialing = false;
        if let Some(sub_ref) = &facts.subscription_ref {
            let sub = self.provider.get_subscription(sub_ref).await?;
            subscription_trialing = sub.status == ProviderSubscriptionStatus::Trialing;
            trial_end = sub.trial_end;
        }
        let trial_start_invoice = facts.billing_reason == Some(BillingReason::SubscriptionCreate)
            && facts.amount_paid_cents == 0;

        if subscription_trialing || trial_start_invoice {
            account.subscription_status = SubscriptionStatus::Trial;
            account.has_premium_features = true;
            if trial_end.is_some() {
                account.subscription_end = trial_end;
            }
            self.ledger.persist(&account).await?;

            tracing::info!(
                account_id = %account.id,
                "Zero-amount trial invoice; keeping trial status and usage counter"
            );

            self.record_event(
                BillingEventBuilder::new(account.id, BillingEventType::InvoicePaid).data(
                    serde_json::json!({
                        "amount_paid_cents": facts.amount_paid_cents,
                        "trial": true,
                    }),
                ),
            )
            .await;
            self.notify_status(&account).await;
            return Ok(());
        }

        account.subscription_status = SubscriptionStatus::Active;
        account.has_premium_features = true;

        // Only a renewal opens a fresh usage period. The initial creation
        // invoice pays for the period the counter already lives in.
        let renewed = facts.billing_reason == Some(BillingReason::SubscriptionCycle);
        if renewed {
            account.usage_this_period = 0;
        }

        self.ledger.persist(&account).await?;

        tracing::info!(
            account_id = %account.id,
            amount_paid_cents = facts.amount_paid_cents,
            usage_reset = renewed,
            "Invoice paid"
        );

        self.record_event(
            BillingEventBuilder::new(account.id, BillingEventType::InvoicePaid).data(
                serde_json::json!({
                    "amount_paid_cents": facts.amount_paid_cents,
                    "usage_reset": renewed,
                }),
            ),
        )
        .await;
        if renewed {
            self.record_event(BillingEventBuilder::new(
                account.id,
                BillingEventType::UsageReset,
            ))
            .await;
        }

        self.notify_status(&account).await;
        Ok(())
    }

    async fn handle_invoice_failed(
        &self,
        mut account: Account,
        facts: &InvoiceFacts,
    ) -> BillingResult<()> {
        account.subscription_status = SubscriptionStatus::PastDue;
        account.has_premium_features = false;
        self.ledger.persist(&account).await?;

        tracing::warn!(
            account_id = %account.id,
            "Invoice payment failed; premium features suspended"
        );

        self.record_event(
            BillingEventBuilder::new(account.id, BillingEventType::InvoicePaymentFailed).data(
                serde_json::json!({ "amount_paid_cents": facts.amount_paid_cents }),
            ),
        )
        .await;
        self.notify_status(&account).await;
        Ok(())
    }

    async fn handle_invoice_voided(
        &self,
        mut account: Account,
        facts: &InvoiceFacts,
    ) -> BillingResult<()> {
        account.subscription_status = SubscriptionStatus::Canceled;
        account.has_premium_features = false;
        if facts.voided_at.is_some() {
            account.subscription_end = facts.voided_at;
        }
        self.ledger.persist(&account).await?;

        tracing::info!(account_id = %account.id, "Invoice voided; subscription canceled");

        self.record_event(BillingEventBuilder::new(
            account.id,
            BillingEventType::InvoiceVoided,
        ))
        .await;
        self.notify_status(&account).await;
        Ok(())
    }

    async fn set_payment_confirmed(&self, mut account: Account) -> BillingResult<()> {
        account.subscription_status = SubscriptionStatus::Active;
        account.has_premium_features = true;
        self.ledger.persist(&account).await?;

        tracing::info!(account_id = %account.id, "Payment confirmed; account active");
        self.notify_status(&account).await;
        Ok(())
    }

    async fn set_payment_canceled(&self, mut account: Account) -> BillingResult<()> {
        account.subscription_status = SubscriptionStatus::Canceled;
        account.has_premium_features = false;
        self.ledger.persist(&account).await?;

        tracing::info!(account_id = %account.id, "Payment canceled; subscription canceled");
        self.notify_status(&account).await;
        Ok(())
    }

    /// Notification subject reflects the resulting status, never the raw
    /// event name. Failures are logged and discarded; persisted state is the
    /// source of truth.
    async fn notify_status(&self, account: &Account) {
        let (subject, body) = match account.subscription_status {
            SubscriptionStatus::Active => (
                "Your subscription is active",
                format!("Your {} subscription is active. Thank you!", account.plan),
            ),
            SubscriptionStatus::Trial => (
                "Your trial has started",
                format!("Your {} trial is underway. Enjoy!", account.plan),
            ),
            SubscriptionStatus::PendingCancel => (
                "Your subscription will end soon",
                format!(
                    "Your {} subscription is scheduled to cancel at the end of the current period.",
                    account.plan
                ),
            ),
            SubscriptionStatus::PastDue => (
                "Payment problem with your subscription",
                "We could not collect your latest payment. Please update your payment method."
                    .to_owned(),
            ),
            SubscriptionStatus::Incomplete => (
                "Action needed to start your subscription",
                "Your subscription needs a completed payment before it can start.".to_owned(),
            ),
            SubscriptionStatus::Canceled => (
                "Your subscription has been canceled",
                format!("Your {} subscription has ended.", account.plan),
            ),
        };

        if let Err(e) = self.notifier.notify(&account.email, subject, &body).await {
            tracing::warn!(
                account_id = %account.id,
                error = %e,
                "Failed to send status notification"
            );
        }
    }

    async fn record_event(&self, builder: BillingEventBuilder) {
        if let Err(e) = self.event_sink.record(builder.build()).await {
            tracing::warn!(error = %e, "Failed to record billing event");
        }
    }
}
