//! In-memory stand-ins for the persistence and billing-provider seams.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use common::error::{AppError, Res};
use db::models::user::{SubscriptionFields, SubscriptionPatch, User};
use uuid::Uuid;

use crate::models::billing::SubscriptionState;
use crate::services::store::{BillingGateway, UserStore};

pub(crate) fn user_with_subscription(
    subscription_id: &str,
    customer_id: &str,
    price_id: Option<&str>,
    period_end: Option<DateTime<Utc>>,
) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        email: format!("{}@promptexify.test", id),
        name: "Test User".to_string(),
        plan: "PREMIUM".to_string(),
        stripe_customer_id: Some(customer_id.to_string()),
        stripe_subscription_id: Some(subscription_id.to_string()),
        stripe_price_id: price_id.map(str::to_string),
        stripe_current_period_end: period_end,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub(crate) fn free_user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: "Test User".to_string(),
        plan: "FREE".to_string(),
        stripe_customer_id: None,
        stripe_subscription_id: None,
        stripe_price_id: None,
        stripe_current_period_end: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub(crate) struct MemStore {
    users: Mutex<Vec<User>>,
}

impl MemStore {
    pub(crate) fn new(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users),
        }
    }

    pub(crate) fn get(&self, user_id: Uuid) -> User {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .expect("user not in store")
    }
}

impl UserStore for MemStore {
    async fn find_by_id(&self, user_id: Uuid) -> Res<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }

    async fn find_by_subscription(&self, subscription_id: &str) -> Res<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn find_by_customer(&self, customer_id: &str) -> Res<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Res<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn premium_users(&self) -> Res<Vec<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.plan == "PREMIUM" && u.stripe_current_period_end.is_some())
            .cloned()
            .collect())
    }

    async fn apply_patch(&self, user_id: Uuid, patch: &SubscriptionPatch) -> Res<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("No user with id {}", user_id)))?;

        let mut fields = SubscriptionFields::from(&*user);
        patch.apply_to(&mut fields);
        user.plan = fields.plan;
        user.stripe_customer_id = fields.stripe_customer_id;
        user.stripe_subscription_id = fields.stripe_subscription_id;
        user.stripe_price_id = fields.stripe_price_id;
        user.stripe_current_period_end = fields.stripe_current_period_end;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn link_customer(&self, user_id: Uuid, customer_id: &str) -> Res<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("No user with id {}", user_id)))?;
        user.stripe_customer_id = Some(customer_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct StubGateway {
    subscriptions: HashMap<String, SubscriptionState>,
    emails: HashMap<String, String>,
    failing: HashSet<String>,
}

impl StubGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_subscription(&mut self, state: SubscriptionState) {
        self.subscriptions.insert(state.id.clone(), state);
    }

    pub(crate) fn insert_email(&mut self, customer_id: &str, email: &str) {
        self.emails
            .insert(customer_id.to_string(), email.to_string());
    }

    pub(crate) fn fail_subscription(&mut self, subscription_id: &str) {
        self.failing.insert(subscription_id.to_string());
    }
}

impl BillingGateway for StubGateway {
    async fn subscription(&self, subscription_id: &str) -> Res<SubscriptionState> {
        if self.failing.contains(subscription_id) {
            return Err(AppError::Internal(format!(
                "stub failure for {}",
                subscription_id
            )));
        }
        self.subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("No subscription {}", subscription_id)))
    }

    async fn customer_email(&self, customer_id: &str) -> Res<Option<String>> {
        Ok(self.emails.get(customer_id).cloned())
    }
}
