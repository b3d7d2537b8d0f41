use std::sync::Arc;

use actix_web::{Responder, post, web};
use common::{
    env_config::Config,
    error::{AppError, Res},
    http::Success,
    jwt::{JwtClaims, UserRole},
};
use sqlx::PgPool;

use crate::dtos::billing::SweepResponse;
use crate::services;
use crate::services::store::{PgUserStore, StripeGateway};

/// Sweeps PREMIUM users whose stored period end has lapsed and downgrades
/// the ones Stripe no longer backs. Admin only; intended to be hit by a
/// scheduler.
///
/// # Output
/// - Success: JSON report with `processed_count`, `downgraded_count` and
///   per-user `errors`; `success` is false when any user failed
/// - Error: 403 when the caller is not an admin
#[post("/check-expired")]
async fn post_check_expired(
    claims: web::ReqData<JwtClaims>,
    pool: web::Data<PgPool>,
    config: web::Data<Arc<Config>>,
) -> Res<impl Responder> {
    if claims.role != UserRole::Admin {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }

    let store = PgUserStore::new(pool.into_inner());
    let gateway = StripeGateway::new(common::stripe::create_client(&config.stripe_secret_key));

    let report = services::sweeper::check_expired_subscriptions(&store, &gateway).await?;
    log::info!(
        "Expiry sweep: {} processed, {} downgraded, {} errors",
        report.processed_count,
        report.downgraded_count,
        report.errors.len()
    );

    Success::ok(SweepResponse {
        success: report.errors.is_empty(),
        processed_count: report.processed_count,
        downgraded_count: report.downgraded_count,
        errors: report.errors,
    })
}
