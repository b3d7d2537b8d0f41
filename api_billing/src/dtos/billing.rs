use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanInterval {
    Month,
    Year,
}

/// The effective plan a user currently has, as consumed by page renders.
#[derive(Debug, Serialize)]
pub struct UserSubscriptionPlan {
    pub is_paid: bool,
    pub interval: Option<PlanInterval>,
    pub is_canceled: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub stripe_current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub success: bool,
    pub processed_count: u32,
    pub downgraded_count: u32,
    pub errors: Vec<String>,
}
