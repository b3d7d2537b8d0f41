use std::sync::Arc;

use actix_web::{HttpRequest, Responder, post, web};
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
};
use sqlx::PgPool;

use crate::models::billing::BillingEvent;
use crate::services::store::{PgUserStore, StripeGateway};
use crate::services::webhook;

/// Handles Stripe webhook events for subscription lifecycle changes.
///
/// # Input
/// - `payload`: Raw string containing the webhook event data
/// - `req`: HTTP request carrying the `stripe-signature` header
/// - `config`: Application configuration with the webhook signing secret
///
/// # Output
/// - 200 OK when the event was applied, skipped, or failed in a way a
///   retry cannot fix (Stripe would otherwise redeliver forever)
/// - 400 Bad Request when the signature is missing or invalid
/// - 500 Internal Server Error when the local write failed, so Stripe
///   retries the delivery
///
/// # Note
/// This endpoint is called by Stripe's servers, not by the frontend.
/// Configure it in the Stripe Dashboard under Webhooks and subscribe to
/// checkout.session.completed, the customer.subscription.* events and the
/// invoice payment events.
#[post("/webhook")]
async fn post_webhook(
    payload: String,
    req: HttpRequest,
    pool: web::Data<PgPool>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let signature = match req.headers().get("stripe-signature") {
        Some(signature) => signature.to_str().unwrap_or(""),
        None => return Err(AppError::BadRequest("Stripe signature missing".to_string())),
    };

    let event = webhook::construct_event(&payload, signature, &config.stripe_webhook_secret)?;
    let event_type = event.type_.to_string();

    let store = PgUserStore::new(pool.into_inner());
    let gateway = StripeGateway::new(common::stripe::create_client(&config.stripe_secret_key));

    let outcome = match BillingEvent::from_stripe(event) {
        Ok(billing_event) => webhook::process_event(&store, &gateway, billing_event).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => Success::ok("Webhook processed"),
        // A failed write must surface as 5xx so Stripe redelivers the event.
        Err(e @ AppError::Database(_)) => Err(e),
        Err(e) => {
            log::error!("Webhook {} not applied: {}", event_type, e);
            Success::ok("Webhook acknowledged")
        }
    }
}
