use std::sync::Arc;

use common::error::{AppError, Res};
use db::models::user::{SubscriptionPatch, User};
use sqlx::PgPool;
use stripe::{Client, SubscriptionId};
use uuid::Uuid;

use crate::models::billing::SubscriptionState;

/// Persistence seam for the user record. Webhook processing, the plan
/// reader and the sweeper are generic over this so they can run against an
/// in-memory store in tests.
pub trait UserStore {
    async fn find_by_id(&self, user_id: Uuid) -> Res<Option<User>>;
    async fn find_by_subscription(&self, subscription_id: &str) -> Res<Option<User>>;
    async fn find_by_customer(&self, customer_id: &str) -> Res<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Res<Option<User>>;
    async fn premium_users(&self) -> Res<Vec<User>>;
    async fn apply_patch(&self, user_id: Uuid, patch: &SubscriptionPatch) -> Res<()>;
    async fn link_customer(&self, user_id: Uuid, customer_id: &str) -> Res<()>;
}

/// Billing-provider seam: the two live lookups reconciliation needs.
pub trait BillingGateway {
    async fn subscription(&self, subscription_id: &str) -> Res<SubscriptionState>;
    async fn customer_email(&self, customer_id: &str) -> Res<Option<String>>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: Arc<PgPool>,
}

impl PgUserStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

impl UserStore for PgUserStore {
    async fn find_by_id(&self, user_id: Uuid) -> Res<Option<User>> {
        db::user::get_user_by_id(&*self.pool, user_id).await
    }

    async fn find_by_subscription(&self, subscription_id: &str) -> Res<Option<User>> {
        db::user::get_user_by_subscription(&*self.pool, subscription_id).await
    }

    async fn find_by_customer(&self, customer_id: &str) -> Res<Option<User>> {
        db::user::get_user_by_customer(&*self.pool, customer_id).await
    }

    async fn find_by_email(&self, email: &str) -> Res<Option<User>> {
        db::user::get_user_by_email(&*self.pool, email).await
    }

    async fn premium_users(&self) -> Res<Vec<User>> {
        db::user::list_premium_users(&*self.pool).await
    }

    async fn apply_patch(&self, user_id: Uuid, patch: &SubscriptionPatch) -> Res<()> {
        db::user::apply_subscription_patch(&*self.pool, user_id, patch).await
    }

    async fn link_customer(&self, user_id: Uuid, customer_id: &str) -> Res<()> {
        db::user::set_stripe_customer(&*self.pool, user_id, customer_id).await
    }
}

pub struct StripeGateway {
    client: Client,
}

impl StripeGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl BillingGateway for StripeGateway {
    async fn subscription(&self, subscription_id: &str) -> Res<SubscriptionState> {
        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| AppError::BadRequest(format!("Invalid subscription ID: {}", e)))?;
        let sub = stripe::Subscription::retrieve(&self.client, &sub_id, &[]).await?;
        SubscriptionState::from_stripe(&sub)
    }

    async fn customer_email(&self, customer_id: &str) -> Res<Option<String>> {
        let customer = common::stripe::get_customer(&self.client, customer_id).await?;
        Ok(customer.email)
    }
}
