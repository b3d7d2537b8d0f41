use common::error::{AppError, Res};
use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::models::user::{Entitlement, SubscriptionPatch, User};

pub async fn get_user_by_id<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_user_by_email<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    email: &str,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_user_by_customer<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    customer_id: &str,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE stripe_customer_id = $1")
        .bind(customer_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

pub async fn get_user_by_subscription<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    subscription_id: &str,
) -> Res<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE stripe_subscription_id = $1")
        .bind(subscription_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::from)
}

/// Users the sweeper has to look at: locally PREMIUM with a known period end.
pub async fn list_premium_users<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
) -> Res<Vec<User>> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE plan = 'PREMIUM' AND stripe_current_period_end IS NOT NULL",
    )
    .fetch_all(executor)
    .await
    .map_err(AppError::from)
}

/// Links a Stripe customer identity to an existing user. Set once, on first
/// checkout.
pub async fn set_stripe_customer<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    customer_id: &str,
) -> Res<()> {
    sqlx::query("UPDATE users SET stripe_customer_id = $2, updated_at = now() WHERE id = $1")
        .bind(user_id)
        .bind(customer_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Applies one `SubscriptionPatch` variant as a single UPDATE. Column
/// semantics mirror `SubscriptionPatch::apply_to`.
pub async fn apply_subscription_patch<'e, E: Executor<'e, Database = Postgres>>(
    executor: E,
    user_id: Uuid,
    patch: &SubscriptionPatch,
) -> Res<()> {
    match patch {
        SubscriptionPatch::Link {
            subscription_id,
            customer_id,
            price_id,
            period_end,
        } => {
            sqlx::query(
                r#"
                UPDATE users
                SET plan = $2,
                    stripe_subscription_id = $3,
                    stripe_customer_id = $4,
                    stripe_price_id = $5,
                    stripe_current_period_end = $6,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(Entitlement::Premium.as_str())
            .bind(subscription_id)
            .bind(customer_id)
            .bind(price_id)
            .bind(period_end)
            .execute(executor)
            .await?;
        }
        SubscriptionPatch::Refresh {
            plan,
            price_id,
            period_end,
        } => {
            sqlx::query(
                r#"
                UPDATE users
                SET plan = $2,
                    stripe_price_id = $3,
                    stripe_current_period_end = $4,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(plan.as_str())
            .bind(price_id)
            .bind(period_end)
            .execute(executor)
            .await?;
        }
        SubscriptionPatch::Renew {
            price_id,
            period_end,
        } => {
            sqlx::query(
                r#"
                UPDATE users
                SET plan = $2,
                    stripe_price_id = $3,
                    stripe_current_period_end = $4,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(Entitlement::Premium.as_str())
            .bind(price_id)
            .bind(period_end)
            .execute(executor)
            .await?;
        }
        SubscriptionPatch::Suspend => {
            sqlx::query("UPDATE users SET plan = $2, updated_at = now() WHERE id = $1")
                .bind(user_id)
                .bind(Entitlement::Free.as_str())
                .execute(executor)
                .await?;
        }
        SubscriptionPatch::Clear => {
            sqlx::query(
                r#"
                UPDATE users
                SET plan = $2,
                    stripe_subscription_id = NULL,
                    stripe_price_id = NULL,
                    stripe_current_period_end = NULL,
                    updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(Entitlement::Free.as_str())
            .execute(executor)
            .await?;
        }
    }
    Ok(())
}
