use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Effective access level a user currently has to gated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entitlement {
    Free,
    Premium,
}

impl Entitlement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entitlement::Free => "FREE",
            Entitlement::Premium => "PREMIUM",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "PREMIUM" => Entitlement::Premium,
            _ => Entitlement::Free,
        }
    }
}

impl std::fmt::Display for Entitlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub plan: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn entitlement(&self) -> Entitlement {
        Entitlement::from_db(&self.plan)
    }
}

/// The five subscription fields this subsystem is allowed to mutate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionFields {
    pub plan: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
}

impl From<&User> for SubscriptionFields {
    fn from(user: &User) -> Self {
        SubscriptionFields {
            plan: user.plan.clone(),
            stripe_customer_id: user.stripe_customer_id.clone(),
            stripe_subscription_id: user.stripe_subscription_id.clone(),
            stripe_price_id: user.stripe_price_id.clone(),
            stripe_current_period_end: user.stripe_current_period_end,
        }
    }
}

/// The closed set of mutations billing reconciliation may perform on a user
/// record. Each variant is a full-state write of the fields it names, so
/// re-applying the same patch always converges on the same row.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionPatch {
    /// Attach Stripe identities and grant PREMIUM (checkout completion,
    /// subscription creation).
    Link {
        subscription_id: String,
        customer_id: String,
        price_id: Option<String>,
        period_end: DateTime<Utc>,
    },
    /// Recompute plan from subscription status; refresh price and period end.
    Refresh {
        plan: Entitlement,
        price_id: Option<String>,
        period_end: DateTime<Utc>,
    },
    /// Successful renewal: force PREMIUM and refresh price/period end.
    Renew {
        price_id: Option<String>,
        period_end: DateTime<Utc>,
    },
    /// Drop to FREE but retain Stripe fields (pause, recoverable payment
    /// failure).
    Suspend,
    /// Drop to FREE and null out subscription, price and period end
    /// (deletion, terminal cancellation).
    Clear,
}

impl SubscriptionPatch {
    /// Applies this patch to an in-memory copy of the subscription fields.
    /// This is the reference semantics; the SQL in `db::user::apply_subscription_patch`
    /// mirrors it column for column.
    pub fn apply_to(&self, fields: &mut SubscriptionFields) {
        match self {
            SubscriptionPatch::Link {
                subscription_id,
                customer_id,
                price_id,
                period_end,
            } => {
                fields.plan = Entitlement::Premium.to_string();
                fields.stripe_subscription_id = Some(subscription_id.clone());
                fields.stripe_customer_id = Some(customer_id.clone());
                fields.stripe_price_id = price_id.clone();
                fields.stripe_current_period_end = Some(*period_end);
            }
            SubscriptionPatch::Refresh {
                plan,
                price_id,
                period_end,
            } => {
                fields.plan = plan.to_string();
                fields.stripe_price_id = price_id.clone();
                fields.stripe_current_period_end = Some(*period_end);
            }
            SubscriptionPatch::Renew {
                price_id,
                period_end,
            } => {
                fields.plan = Entitlement::Premium.to_string();
                fields.stripe_price_id = price_id.clone();
                fields.stripe_current_period_end = Some(*period_end);
            }
            SubscriptionPatch::Suspend => {
                fields.plan = Entitlement::Free.to_string();
            }
            SubscriptionPatch::Clear => {
                fields.plan = Entitlement::Free.to_string();
                fields.stripe_subscription_id = None;
                fields.stripe_price_id = None;
                fields.stripe_current_period_end = None;
            }
        }
    }
}
