//! Status mapping
//!
//! Deterministic translation of a provider subscription snapshot into the
//! local `(status, has_premium, subscription_end)` tuple. Used both when
//! reconciling webhook-driven lifecycle events and when reporting state from
//! direct provider reads, so the two paths can never disagree.

use time::OffsetDateTime;

use crate::account::SubscriptionStatus;
use crate::provider::{ProviderSubscriptionStatus, SubscriptionFacts};

/// Result of one mapping pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMapping {
    pub status: SubscriptionStatus,
    pub has_premium: bool,
    pub subscription_end: Option<OffsetDateTime>,
}

/// Map raw provider subscription fields to local state.
///
/// Pure and total over the provider status enum. Priority order, first match
/// wins:
///
/// 1. a hard cancellation always wins over a scheduled one;
/// 2. a scheduled cancellation still grants premium until the end date;
/// 3. trial outranks generic active status because its entitlement is
///    time-boxed;
/// 4./5. past-due and incomplete withdraw premium;
/// 6. everything else is Active.
///
/// The end-date fallback chain differs per branch: each branch prefers the
/// timestamp that defines it (ended_at for hard cancels, cancel_at for
/// scheduled ones, trial_end for trials) before falling back to the others.
pub fn map_subscription_status(
    status: ProviderSubscriptionStatus,
    cancel_at_period_end: bool,
    trial_end: Option<OffsetDateTime>,
    cancel_at: Option<OffsetDateTime>,
    ended_at: Option<OffsetDateTime>,
) -> StatusMapping {
    use ProviderSubscriptionStatus as P;

    if status == P::Canceled {
        return StatusMapping {
            status: SubscriptionStatus::Canceled,
            has_premium: false,
            subscription_end: ended_at.or(cancel_at).or(trial_end),
        };
    }

    if cancel_at_period_end {
        return StatusMapping {
            status: SubscriptionStatus::PendingCancel,
            has_premium: true,
            subscription_end: cancel_at.or(ended_at).or(trial_end),
        };
    }

    match status {
        P::Trialing => StatusMapping {
            status: SubscriptionStatus::Trial,
            has_premium: true,
            subscription_end: trial_end.or(ended_at).or(cancel_at),
        },
        P::PastDue | P::Unpaid => StatusMapping {
            status: SubscriptionStatus::PastDue,
            has_premium: false,
            subscription_end: ended_at.or(cancel_at).or(trial_end),
        },
        P::Incomplete | P::IncompleteExpired => StatusMapping {
            status: SubscriptionStatus::Incomplete,
            has_premium: false,
            subscription_end: ended_at.or(cancel_at).or(trial_end),
        },
        P::Active | P::Canceled => StatusMapping {
            status: SubscriptionStatus::Active,
            has_premium: true,
            subscription_end: ended_at.or(cancel_at).or(trial_end),
        },
    }
}

/// Map a full provider snapshot
pub fn map_facts(facts: &SubscriptionFacts) -> StatusMapping {
    map_subscription_status(
        facts.status,
        facts.cancel_at_period_end,
        facts.trial_end,
        facts.cancel_at,
        facts.ended_at,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const ALL_STATUSES: [ProviderSubscriptionStatus; 7] = [
        ProviderSubscriptionStatus::Active,
        ProviderSubscriptionStatus::Trialing,
        ProviderSubscriptionStatus::PastDue,
        ProviderSubscriptionStatus::Unpaid,
        ProviderSubscriptionStatus::Canceled,
        ProviderSubscriptionStatus::Incomplete,
        ProviderSubscriptionStatus::IncompleteExpired,
    ];

    #[test]
    fn total_over_all_inputs() {
        // Every status x cancel flag x timestamp-presence combination maps
        // to one of the six local statuses without panicking.
        let t = Some(datetime!(2026-03-15 00:00 UTC));
        let stamps = [None, t];
        for status in ALL_STATUSES {
            for cancel_flag in [false, true] {
                for trial_end in stamps {
                    for cancel_at in stamps {
                        for ended_at in stamps {
                            let mapping = map_subscription_status(
                                status, cancel_flag, trial_end, cancel_at, ended_at,
                            );
                            assert_eq!(
                                mapping.has_premium,
                                mapping.status.grants_premium(),
                                "entitlement must be derivable from status for {status} / {cancel_flag}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn deterministic() {
        let t = Some(datetime!(2026-01-01 12:00 UTC));
        let a = map_subscription_status(ProviderSubscriptionStatus::Trialing, false, t, None, None);
        let b = map_subscription_status(ProviderSubscriptionStatus::Trialing, false, t, None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn hard_cancel_beats_scheduled_cancel() {
        let ended = datetime!(2026-02-01 00:00 UTC);
        let mapping = map_subscription_status(
            ProviderSubscriptionStatus::Canceled,
            true,
            None,
            None,
            Some(ended),
        );
        assert_eq!(mapping.status, SubscriptionStatus::Canceled);
        assert!(!mapping.has_premium);
        assert_eq!(mapping.subscription_end, Some(ended));
    }

    #[test]
    fn scheduled_cancel_keeps_premium_until_end() {
        let cancel_at = datetime!(2026-06-30 00:00 UTC);
        let mapping = map_subscription_status(
            ProviderSubscriptionStatus::Active,
            true,
            None,
            Some(cancel_at),
            None,
        );
        assert_eq!(mapping.status, SubscriptionStatus::PendingCancel);
        assert!(mapping.has_premium);
        assert_eq!(mapping.subscription_end, Some(cancel_at));
    }

    #[test]
    fn trialing_maps_to_trial_with_trial_end() {
        let trial_end = datetime!(2026-04-01 00:00 UTC);
        let mapping = map_subscription_status(
            ProviderSubscriptionStatus::Trialing,
            false,
            Some(trial_end),
            None,
            None,
        );
        assert_eq!(mapping.status, SubscriptionStatus::Trial);
        assert!(mapping.has_premium);
        assert_eq!(mapping.subscription_end, Some(trial_end));
    }

    #[test]
    fn past_due_and_unpaid_withdraw_premium() {
        for status in [
            ProviderSubscriptionStatus::PastDue,
            ProviderSubscriptionStatus::Unpaid,
        ] {
            let mapping = map_subscription_status(status, false, None, None, None);
            assert_eq!(mapping.status, SubscriptionStatus::PastDue);
            assert!(!mapping.has_premium);
        }
    }

    #[test]
    fn incomplete_variants_map_together() {
        for status in [
            ProviderSubscriptionStatus::Incomplete,
            ProviderSubscriptionStatus::IncompleteExpired,
        ] {
            let mapping = map_subscription_status(status, false, None, None, None);
            assert_eq!(mapping.status, SubscriptionStatus::Incomplete);
            assert!(!mapping.has_premium);
        }
    }

    #[test]
    fn active_falls_through_with_end_fallback_chain() {
        let cancel_at = datetime!(2026-09-01 00:00 UTC);
        let trial_end = datetime!(2026-08-01 00:00 UTC);
        let mapping = map_subscription_status(
            ProviderSubscriptionStatus::Active,
            false,
            Some(trial_end),
            Some(cancel_at),
            None,
        );
        assert_eq!(mapping.status, SubscriptionStatus::Active);
        assert!(mapping.has_premium);
        // ended_at absent: cancel_at wins over trial_end
        assert_eq!(mapping.subscription_end, Some(cancel_at));
    }

    #[test]
    fn trial_branch_prefers_trial_end() {
        let trial_end = datetime!(2026-08-01 00:00 UTC);
        let cancel_at = datetime!(2026-09-01 00:00 UTC);
        let mapping = map_subscription_status(
            ProviderSubscriptionStatus::Trialing,
            false,
            Some(trial_end),
            Some(cancel_at),
            None,
        );
        assert_eq!(mapping.subscription_end, Some(trial_end));
    }
}
