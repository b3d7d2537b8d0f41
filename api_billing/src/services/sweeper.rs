use chrono::{DateTime, Utc};
use common::error::Res;
use db::models::user::{SubscriptionPatch, User};
use serde::Serialize;

use crate::models::billing::SubscriptionStatus;
use crate::services::store::{BillingGateway, UserStore};

/// Outcome of one sweep, returned to the admin UI.
#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub processed_count: u32,
    pub downgraded_count: u32,
    pub errors: Vec<String>,
}

/// Re-validates every locally PREMIUM user whose stored period end has
/// lapsed against live Stripe state, downgrading the ones Stripe no longer
/// backs. One user's lookup failure never blocks the rest of the sweep.
pub async fn check_expired_subscriptions<S: UserStore, G: BillingGateway>(
    store: &S,
    gateway: &G,
) -> Res<SweepReport> {
    let users = store.premium_users().await?;
    sweep_users(store, gateway, users, Utc::now()).await
}

async fn sweep_users<S: UserStore, G: BillingGateway>(
    store: &S,
    gateway: &G,
    users: Vec<User>,
    now: DateTime<Utc>,
) -> Res<SweepReport> {
    let mut report = SweepReport {
        processed_count: 0,
        downgraded_count: 0,
        errors: Vec::new(),
    };

    for user in users {
        report.processed_count += 1;

        let Some(period_end) = user.stripe_current_period_end else {
            continue;
        };
        if period_end > now {
            continue;
        }

        // PREMIUM with no subscription id violates the data invariants;
        // nothing at Stripe can confirm it, so clear it outright.
        let Some(subscription_id) = user.stripe_subscription_id.as_deref() else {
            if let Err(e) = store.apply_patch(user.id, &SubscriptionPatch::Clear).await {
                report.errors.push(format!("user {}: {}", user.id, e));
                continue;
            }
            report.downgraded_count += 1;
            continue;
        };

        let state = match gateway.subscription(subscription_id).await {
            Ok(state) => state,
            Err(e) => {
                report.errors.push(format!("user {}: {}", user.id, e));
                continue;
            }
        };

        if state.status.entitlement() == db::models::user::Entitlement::Premium
            && state.current_period_end > now
        {
            // Stripe renewed but the webhook never landed; heal the stale
            // local period end.
            let patch = SubscriptionPatch::Renew {
                price_id: state.price_id.clone(),
                period_end: state.current_period_end,
            };
            if let Err(e) = store.apply_patch(user.id, &patch).await {
                report.errors.push(format!("user {}: {}", user.id, e));
            }
            continue;
        }

        let patch = if state.status == SubscriptionStatus::Canceled {
            SubscriptionPatch::Clear
        } else {
            SubscriptionPatch::Suspend
        };
        match store.apply_patch(user.id, &patch).await {
            Ok(()) => {
                report.downgraded_count += 1;
                log::info!(
                    "Sweeper downgraded user {} (status {:?})",
                    user.id,
                    state.status
                );
            }
            Err(e) => report.errors.push(format!("user {}: {}", user.id, e)),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::billing::SubscriptionState;
    use crate::testing::{user_with_subscription, MemStore, StubGateway};
    use chrono::Duration;

    fn expired_state(id: &str, status: SubscriptionStatus, now: DateTime<Utc>) -> SubscriptionState {
        SubscriptionState {
            id: id.to_string(),
            customer_id: format!("cus_{}", id),
            price_id: Some("price_monthly".to_string()),
            status,
            current_period_end: now - Duration::days(2),
            cancel_at_period_end: false,
        }
    }

    #[tokio::test]
    async fn one_failing_lookup_does_not_block_the_sweep() {
        let now = Utc::now();
        let expired = now - Duration::days(2);
        let users = vec![
            user_with_subscription("sub_1", "cus_1", Some("price_monthly"), Some(expired)),
            user_with_subscription("sub_2", "cus_2", Some("price_monthly"), Some(expired)),
            user_with_subscription("sub_3", "cus_3", Some("price_monthly"), Some(expired)),
        ];
        let ids: Vec<_> = users.iter().map(|u| u.id).collect();
        let store = MemStore::new(users);

        let mut gateway = StubGateway::new();
        gateway.insert_subscription(expired_state("sub_1", SubscriptionStatus::Canceled, now));
        gateway.fail_subscription("sub_2");
        gateway.insert_subscription(expired_state("sub_3", SubscriptionStatus::Unpaid, now));

        let report = check_expired_subscriptions(&store, &gateway).await.unwrap();

        assert_eq!(report.processed_count, 3);
        assert_eq!(report.downgraded_count, 2);
        assert_eq!(report.errors.len(), 1);

        // canceled -> cleared
        let first = store.get(ids[0]);
        assert_eq!(first.plan, "FREE");
        assert!(first.stripe_subscription_id.is_none());
        // lookup failed -> untouched
        let second = store.get(ids[1]);
        assert_eq!(second.plan, "PREMIUM");
        // unpaid -> suspended, fields retained
        let third = store.get(ids[2]);
        assert_eq!(third.plan, "FREE");
        assert_eq!(third.stripe_subscription_id.as_deref(), Some("sub_3"));
    }

    #[tokio::test]
    async fn unexpired_users_are_left_alone() {
        let users = vec![user_with_subscription(
            "sub_1",
            "cus_1",
            Some("price_monthly"),
            Some(Utc::now() + Duration::days(10)),
        )]; 
        let id = users[0].id;
        let store = MemStore::new(users);
        let gateway = StubGateway::new();

        let report = check_expired_subscriptions(&store, &gateway).await.unwrap();
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.downgraded_count, 0);
        assert!(report.errors.is_empty());
        assert_eq!(store.get(id).plan, "PREMIUM");
    }

    #[tokio::test]
    async fn premium_without_subscription_id_is_cleared() {
        let mut user = user_with_subscription(
            "sub_1",
            "cus_1",
            Some("price_monthly"),
            Some(Utc::now() - Duration::days(2)),
        );
        user.stripe_subscription_id = None;
        let id = user.id;
        let store = MemStore::new(vec![user]);
        let gateway = StubGateway::new();

        let report = check_expired_subscriptions(&store, &gateway).await.unwrap();
        assert_eq!(report.downgraded_count, 1);
        let row = store.get(id);
        assert_eq!(row.plan, "FREE");
        assert!(row.stripe_price_id.is_none());
    }

    #[tokio::test]
    async fn stale_period_end_with_live_renewal_is_healed() {
        let now = Utc::now();
        let user = user_with_subscription(
            "sub_1",
            "cus_1",
            Some("price_monthly"),
            Some(now - Duration::days(2)),
        );
        let id = user.id;
        let store = MemStore::new(vec![user]);
        let mut gateway = StubGateway::new();
        gateway.insert_subscription(SubscriptionState {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            price_id: Some("price_monthly".to_string()),
            status: SubscriptionStatus::Active,
            current_period_end: now + Duration::days(28),
            cancel_at_period_end: false,
        });

        let report = check_expired_subscriptions(&store, &gateway).await.unwrap();
        assert_eq!(report.downgraded_count, 0);
        let row = store.get(id);
        assert_eq!(row.plan, "PREMIUM");
        assert!(row.stripe_current_period_end.unwrap() > now);
    }
}
