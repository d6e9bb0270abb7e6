//! Customer onboarding and subscription management
//!
//! New accounts start on the configured trial plan with a time-boxed trial.
//! Subscription creation stores the provider reference immediately; the
//! final status settles when the provider's lifecycle events arrive.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::account::{Account, Catalog, Ledger, SubscriptionStatus};
use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventBuilder, BillingEventType, EventSink};
use crate::provider::{CreateSubscriptionOptions, PaymentProvider};
use crate::status::map_facts;

/// Onboards customers and manages their subscription at the account level
pub struct CustomerService {
    provider: Arc<dyn PaymentProvider>,
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn Ledger>,
    event_sink: Arc<dyn EventSink>,
    config: BillingConfig,
}

impl CustomerService {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn Ledger>,
        event_sink: Arc<dyn EventSink>,
        config: BillingConfig,
    ) -> Self {
        Self {
            provider,
            catalog,
            ledger,
            event_sink,
            config,
        }
    }

    /// Register an account for `email`, seeding it on the trial plan.
    ///
    /// Idempotent: an existing account is returned as-is, without creating
    /// a second provider customer.
    pub async fn register(&self, email: &str) -> BillingResult<Account> {
        if email.trim().is_empty() {
            return Err(BillingError::Validation("email must not be blank".into()));
        }
        if let Some(existing) = self.ledger.find_by_email(email).await? {
            tracing::debug!(account_id = %existing.id, "Account already registered");
            return Ok(existing);
        }

        // The trial plan must be seeded in the catalog before registration.
        let trial_plan = self
            .catalog
            .plan_by_name(&self.config.trial_plan)
            .await?
            .ok_or_else(|| {
                BillingError::Config(format!(
                    "trial plan '{}' is not in the catalog",
                    self.config.trial_plan
                ))
            })?;

        let customer_ref = self.provider.create_customer(email).await?;
        let account = Account {
            id: Uuid::new_v4(),
            email: email.to_owned(),
            customer_ref,
            subscription_ref: None,
            plan: trial_plan.name,
            subscription_status: SubscriptionStatus::Trial,
            has_premium_features: true,
            subscription_end: Some(
                OffsetDateTime::now_utc() + Duration::days(self.config.trial_days),
            ),
            usage_this_period: 0,
        };
        self.ledger.persist(&account).await?;

        tracing::info!(
            account_id = %account.id,
            customer_ref = %account.customer_ref,
            trial_days = self.config.trial_days,
            "Registered new account on trial"
        );

        self.record_event(
            BillingEventBuilder::new(account.id, BillingEventType::AccountRegistered).data(
                serde_json::json!({
                    "plan": account.plan,
                    "trial_days": self.config.trial_days,
                }),
            ),
        )
        .await;

        Ok(account)
    }

    /// Create a provider subscription for an existing account.
    ///
    /// Stores the subscription reference and plan name right away; status
    /// and entitlement settle when lifecycle events confirm payment.
    pub async fn create_subscription(
        &self,
        email: &str,
        price_ref: &str,
        payment_method_ref: &str,
    ) -> BillingResult<Account> {
        let mut account = self
            .ledger
            .find_by_email(email)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("no account for {email}")))?;

        let facts = self
            .provider
            .create_subscription(
                &account.customer_ref,
                price_ref,
                payment_method_ref,
                CreateSubscriptionOptions::default(),
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

        tracing::info!(
            account_id = %account.id,
            subscription_ref = %facts.subscription_ref,
            status = %account.subscription_status,
            "Created subscription"
        );

        self.record_event(
            BillingEventBuilder::new(account.id, BillingEventType::SubscriptionCreated)
                .data(serde_json::json!({ "price_ref": price_ref, "plan": account.plan }))
                .subscription_ref(&facts.subscription_ref),
        )
        .await;

        Ok(account)
    }

    /// Cancel a subscription, immediately or at period end, and reconcile
    /// the account from the provider's response.
    pub async fn cancel_subscription(
        &self,
        subscription_ref: &str,
        at_period_end: bool,
    ) -> BillingResult<Account> {
        let mut account = self
            .ledger
            .find_by_subscription_ref(subscription_ref)
            .await?
            .ok_or_else(|| {
                BillingError::NotFound(format!(
                    "no account for subscription {subscription_ref}"
                ))
            })?;

        let facts = self
            .provider
            .cancel_subscription(subscription_ref, at_period_end)
            .await?;

        let mapping = map_facts(&facts);
        account.subscription_status = mapping.status;
        account.has_premium_features = mapping.has_premium;
        account.subscription_end = mapping.subscription_end;
        self.ledger.persist(&account).await?;

        tracing::info!(
            account_id = %account.id,
            subscription_ref = %subscription_ref,
            at_period_end,
            status = %account.subscription_status,
            "Canceled subscription"
        );

        self.record_event(
            BillingEventBuilder::new(account.id, BillingEventType::SubscriptionCanceled)
                .data(serde_json::json!({ "at_period_end": at_period_end }))
                .subscription_ref(subscription_ref),
        )
        .await;

        Ok(account)
    }

    async fn record_event(&self, builder: BillingEventBuilder) {
        if let Err(e) = self.event_sink.record(builder.build()).await {
            tracing::warn!(error = %e, "Failed to record billing event");
        }
    }
}
