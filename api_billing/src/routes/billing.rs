use std::sync::Arc;

use actix_web::{Responder, get, post, web};
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
    jwt::JwtClaims,
};
use sqlx::PgPool;

use crate::dtos::billing::{CheckoutRequest, CheckoutResponse};
use crate::services;
use crate::services::store::{PgUserStore, StripeGateway, UserStore};

/// Returns the authenticated user's effective subscription plan.
///
/// # Input
/// - `claims`: JWT claims identifying the user
/// - `config`: Application configuration with the two plan price ids
///
/// # Output
/// - Success: JSON object with `is_paid`, `interval`, `is_canceled` and the
///   stored Stripe fields
/// - Error: 404 if the user record does not exist
#[get("/plan")]
async fn get_plan(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<PgPool>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let store = PgUserStore::new(pool.into_inner());
    let gateway = StripeGateway::new(common::stripe::create_client(&config.stripe_secret_key));

    let plan =
        services::plan::get_user_subscription_plan(&store, &gateway, &config.plan_prices, claims.user_id)
            .await?;

    Success::ok(plan)
}

/// Creates a Stripe Checkout session for a subscription price.
///
/// # Input
/// - `claims`: JWT claims identifying the user
/// - `req`: JSON payload with `price_id`, `success_url` and `cancel_url`
/// - `config`: Application configuration with Stripe API credentials
///
/// # Output
/// - Success: JSON object with the hosted checkout `url` to redirect to
/// - Error: 404 if the user record does not exist
#[post("/checkout")]
async fn post_checkout(
    claims: web::ReqData<JwtClaims>,
    req: web::Json<CheckoutRequest>,
    pool: web::Data<PgPool>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    let store = PgUserStore::new(pool.into_inner());
    let client = common::stripe::create_client(&config.stripe_secret_key);

    let user = store
        .find_by_id(claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No user with id {}", claims.user_id)))?;

    // First checkout for this user creates and links the Stripe customer.
    let customer_id = match user.stripe_customer_id {
        Some(id) => id,
        None => {
            let customer = common::stripe::create_customer(&client, &user.email, &user.name).await?;
            store.link_customer(user.id, customer.id.as_str()).await?;
            customer.id.to_string()
        }
    };

    let session =
        services::checkout::create_subscription_session(&client, &customer_id, user.id, &req)
            .await?;

    Success::ok(CheckoutResponse {
        url: session.url.unwrap_or_default(),
    })
}
