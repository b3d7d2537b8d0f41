use std::collections::HashMap;

use common::error::{AppError, Res};
use stripe::{CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession, CustomerId};
use uuid::Uuid;

use crate::dtos::billing::CheckoutRequest;

/// Creates a hosted checkout session for a subscription price. The caller
/// supplies the customer id; entitlement itself only changes later, via the
/// webhook for the completed session. The local user id travels in the
/// session metadata so that webhook can resolve the user directly.
pub async fn create_subscription_session(
    client: &Client,
    customer_id: &str,
    user_id: Uuid,
    req: &CheckoutRequest,
) -> Res<CheckoutSession> {
    let customer_id = customer_id
        .parse::<CustomerId>()
        .map_err(|e| AppError::Internal(format!("Invalid customer ID: {}", e)))?;

    let metadata = HashMap::from([("userId".to_string(), user_id.to_string())]);

    let params = CreateCheckoutSession {
        metadata: Some(metadata),
        payment_method_types: Some(vec![stripe::CreateCheckoutSessionPaymentMethodTypes::Card]),
        line_items: Some(vec![stripe::CreateCheckoutSessionLineItems {
            price: Some(req.price_id.to_string()),
            quantity: Some(1),
            ..Default::default()
        }]),
        mode: Some(CheckoutSessionMode::Subscription),
        success_url: Some(req.success_url.as_str()),
        cancel_url: Some(req.cancel_url.as_str()),
        customer: Some(customer_id),
        ..Default::default()
    };
    CheckoutSession::create(client, params)
        .await
        .map_err(AppError::from)
}
