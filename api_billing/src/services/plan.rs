use chrono::{DateTime, Duration, Utc};
use common::env_config::PlanPrices;
use common::error::{AppError, Res};
use uuid::Uuid;

use crate::dtos::billing::{PlanInterval, UserSubscriptionPlan};
use crate::services::store::{BillingGateway, UserStore};

/// Grace added to the stored period end before entitlement lapses. Absorbs
/// clock skew and the gap between period end and Stripe's renewal webhook.
pub const GRACE_HOURS: i64 = 24;

/// A user is paid while a price is on file and the stored period end plus
/// grace is still ahead of `now`.
pub fn is_paid_at(
    price_id: Option<&str>,
    period_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    match (price_id, period_end) {
        (Some(_), Some(period_end)) => period_end + Duration::hours(GRACE_HOURS) > now,
        _ => false,
    }
}

/// Maps a stored price id onto one of the two configured plans. Unknown or
/// missing prices have no interval.
pub fn interval_for_price(prices: &PlanPrices, price_id: Option<&str>) -> Option<PlanInterval> {
    match price_id {
        Some(id) if id == prices.monthly_price_id => Some(PlanInterval::Month),
        Some(id) if id == prices.yearly_price_id => Some(PlanInterval::Year),
        _ => None,
    }
}

/// Computes the effective plan for a user from the locally persisted Stripe
/// fields. Read-only: safe to call from any page render. When the user is
/// paid, `cancel_at_period_end` is read live from Stripe; a failed lookup is
/// swallowed and reported as not canceled.
pub async fn get_user_subscription_plan<S: UserStore, G: BillingGateway>(
    store: &S,
    gateway: &G,
    prices: &PlanPrices,
    user_id: Uuid,
) -> Res<UserSubscriptionPlan> {
    let user = store
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user with id {}", user_id)))?;

    let now = Utc::now();
    let is_paid = is_paid_at(
        user.stripe_price_id.as_deref(),
        user.stripe_current_period_end,
        now,
    );
    let interval = interval_for_price(prices, user.stripe_price_id.as_deref());

    let is_canceled = if is_paid {
        match &user.stripe_subscription_id {
            Some(subscription_id) => match gateway.subscription(subscription_id).await {
                Ok(state) => state.cancel_at_period_end,
                Err(e) => {
                    log::warn!(
                        "Could not read cancel_at_period_end for {}: {}",
                        subscription_id,
                        e
                    );
                    false
                }
            },
            None => false,
        }
    } else {
        false
    };

    Ok(UserSubscriptionPlan {
        is_paid,
        interval,
        is_canceled,
        stripe_customer_id: user.stripe_customer_id,
        stripe_subscription_id: user.stripe_subscription_id,
        stripe_price_id: user.stripe_price_id,
        stripe_current_period_end: user.stripe_current_period_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{user_with_subscription, MemStore, StubGateway};
    use crate::models::billing::{SubscriptionState, SubscriptionStatus};
    use chrono::Duration;

    fn prices() -> PlanPrices {
        PlanPrices {
            monthly_price_id: "price_monthly".to_string(),
            yearly_price_id: "price_yearly".to_string(),
        }
    }

    #[test]
    fn paid_one_second_past_period_end_is_inside_grace() {
        let now = Utc::now();
        assert!(is_paid_at(
            Some("price_monthly"),
            Some(now - Duration::seconds(1)),
            now
        ));
    }

    #[test]
    fn paid_twenty_five_hours_past_period_end_is_expired() {
        let now = Utc::now();
        assert!(!is_paid_at(
            Some("price_monthly"),
            Some(now - Duration::hours(25)),
            now
        ));
    }

    #[test]
    fn missing_price_or_period_end_is_never_paid() {
        let now = Utc::now();
        assert!(!is_paid_at(None, Some(now + Duration::days(30)), now));
        assert!(!is_paid_at(Some("price_monthly"), None, now));
    }

    #[test]
    fn interval_maps_known_prices_only() {
        let prices = prices();
        assert_eq!(
            interval_for_price(&prices, Some("price_monthly")),
            Some(PlanInterval::Month)
        );
        assert_eq!(
            interval_for_price(&prices, Some("price_yearly")),
            Some(PlanInterval::Year)
        );
        assert_eq!(interval_for_price(&prices, Some("price_other")), None);
        assert_eq!(interval_for_price(&prices, None), None);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = MemStore::new(vec![]);
        let gateway = StubGateway::new();
        let result =
            get_user_subscription_plan(&store, &gateway, &prices(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn cancel_flag_comes_from_live_subscription() {
        let user = user_with_subscription(
            "sub_1",
            "cus_1",
            Some("price_monthly"),
            Some(Utc::now() + Duration::days(10)),
        );
        let user_id = user.id;
        let store = MemStore::new(vec![user]);
        let mut gateway = StubGateway::new();
        gateway.insert_subscription(SubscriptionState {
            id: "sub_1".to_string(),
            customer_id: "cus_1".to_string(),
            price_id: Some("price_monthly".to_string()),
            status: SubscriptionStatus::Active,
            current_period_end: Utc::now() + Duration::days(10),
            cancel_at_period_end: true,
        });

        let plan = get_user_subscription_plan(&store, &gateway, &prices(), user_id)
            .await
            .unwrap();
        assert!(plan.is_paid);
        assert!(plan.is_canceled);
        assert_eq!(plan.interval, Some(PlanInterval::Month));
    }

    #[tokio::test]
    async fn failed_live_lookup_defaults_to_not_canceled() {
        let user = user_with_subscription(
            "sub_1",
            "cus_1",
            Some("price_monthly"),
            Some(Utc::now() + Duration::days(10)),
        );
        let user_id = user.id;
        let store = MemStore::new(vec![user]);
        let mut gateway = StubGateway::new();
        gateway.fail_subscription("sub_1");

        let plan = get_user_subscription_plan(&store, &gateway, &prices(), user_id)
            .await
            .unwrap();
        // local data stays authoritative for is_paid
        assert!(plan.is_paid);
        assert!(!plan.is_canceled);
    }
}
