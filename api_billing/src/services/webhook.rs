use common::error::{AppError, Res};
use db::models::user::{SubscriptionPatch, User};
use stripe::{Event, Webhook};

use crate::models::billing::{BillingEvent, SubscriptionState, SubscriptionStatus};
use crate::services::store::{BillingGateway, UserStore};

/// Creates an event for the webhook based on the request payload and signature.
/// Requires a webhook secret key.
pub fn construct_event(payload: &str, signature: &str, webhook_secret: &str) -> Res<Event> {
    match Webhook::construct_event(payload, signature, webhook_secret) {
        Ok(event) => Ok(event),
        Err(e) => {
            log::error!("Error constructing webhook event: {}", e);
            Err(AppError::BadRequest(format!("Webhook Error: {}", e)))
        }
    }
}

/// Applies one verified webhook event to the user record.
///
/// Stripe delivers at least once and out of order, so every arm re-derives
/// the full target state from the event payload or a fresh lookup; applying
/// the same event twice converges on the same row. A user that cannot be
/// resolved is logged and skipped rather than failing the delivery.
pub async fn process_event<S: UserStore, G: BillingGateway>(
    store: &S,
    gateway: &G,
    event: BillingEvent,
) -> Res<()> {
    match event {
        BillingEvent::CheckoutCompleted {
            subscription_id,
            customer_id,
            user_id,
        } => {
            // Period end comes from the subscription object, never from the
            // session.
            let state = gateway.subscription(&subscription_id).await?;

            let user = match user_id {
                Some(id) => store.find_by_id(id).await?,
                None => None,
            };
            let user = match user {
                Some(user) => Some(user),
                None => resolve_user(store, gateway, &state.id, customer_id.as_deref()).await?,
            };
            let Some(user) = user else {
                log::warn!(
                    "checkout.session.completed: no local user for subscription {}",
                    state.id
                );
                return Ok(());
            };

            store
                .apply_patch(user.id, &link_patch(&state))
                .await?;
            log::info!("User {} upgraded via checkout ({})", user.id, state.id);
            Ok(())
        }

        BillingEvent::SubscriptionCreated(state) => {
            let Some(user) =
                resolve_user(store, gateway, &state.id, Some(&state.customer_id)).await?
            else {
                log::warn!(
                    "customer.subscription.created: no local user for subscription {}",
                    state.id
                );
                return Ok(());
            };
            store.apply_patch(user.id, &link_patch(&state)).await?;
            log::info!("User {} linked to subscription {}", user.id, state.id);
            Ok(())
        }

        BillingEvent::SubscriptionUpdated(state) => {
            let Some(user) =
                resolve_user(store, gateway, &state.id, Some(&state.customer_id)).await?
            else {
                log::warn!(
                    "customer.subscription.updated: no local user for subscription {}",
                    state.id
                );
                return Ok(());
            };
            let patch = SubscriptionPatch::Refresh {
                plan: state.status.entitlement(),
                price_id: state.price_id.clone(),
                period_end: state.current_period_end,
            };
            store.apply_patch(user.id, &patch).await?;
            Ok(())
        }

        BillingEvent::SubscriptionDeleted(state) => {
            let Some(user) =
                resolve_user(store, gateway, &state.id, Some(&state.customer_id)).await?
            else {
                log::warn!(
                    "customer.subscription.deleted: no local user for subscription {}",
                    state.id
                );
                return Ok(());
            };
            store.apply_patch(user.id, &SubscriptionPatch::Clear).await?;
            log::info!("User {} downgraded: subscription {} deleted", user.id, state.id);
            Ok(())
        }

        BillingEvent::SubscriptionPaused(state) => {
            let Some(user) =
                resolve_user(store, gateway, &state.id, Some(&state.customer_id)).await?
            else {
                log::warn!(
                    "customer.subscription.paused: no local user for subscription {}",
                    state.id
                );
                return Ok(());
            };
            // Fields are retained so a resume can restore the plan.
            store
                .apply_patch(user.id, &SubscriptionPatch::Suspend)
                .await?;
            Ok(())
        }

        BillingEvent::SubscriptionResumed(state) => {
            if state.status != SubscriptionStatus::Active {
                log::info!(
                    "customer.subscription.resumed with status {:?}, leaving plan unchanged",
                    state.status
                );
                return Ok(());
            }
            let Some(user) =
                resolve_user(store, gateway, &state.id, Some(&state.customer_id)).await?
            else {
                log::warn!(
                    "customer.subscription.resumed: no local user for subscription {}",
                    state.id
                );
                return Ok(());
            };
            let patch = SubscriptionPatch::Renew {
                price_id: state.price_id.clone(),
                period_end: state.current_period_end,
            };
            store.apply_patch(user.id, &patch).await?;
            Ok(())
        }

        BillingEvent::InvoicePaid {
            subscription_id,
            is_subscription_create,
        } => {
            // The subscription-create invoice is already handled by checkout
            // completion; processing it again would double-write.
            if is_subscription_create {
                log::debug!(
                    "Skipping subscription_create invoice for {}",
                    subscription_id
                );
                return Ok(());
            }
            let state = gateway.subscription(&subscription_id).await?;
            let Some(user) =
                resolve_user(store, gateway, &state.id, Some(&state.customer_id)).await?
            else {
                log::warn!(
                    "invoice.payment_succeeded: no local user for subscription {}",
                    subscription_id
                );
                return Ok(());
            };
            let patch = SubscriptionPatch::Renew {
                price_id: state.price_id.clone(),
                period_end: state.current_period_end,
            };
            store.apply_patch(user.id, &patch).await?;
            log::info!("User {} renewed until {}", user.id, state.current_period_end);
            Ok(())
        }

        BillingEvent::InvoicePaymentFailed { subscription_id } => {
            // The invoice does not carry the subscription status; read it live.
            let state = gateway.subscription(&subscription_id).await?;
            let revoked = matches!(
                state.status,
                SubscriptionStatus::PastDue
                    | SubscriptionStatus::Incomplete
                    | SubscriptionStatus::Canceled
                    | SubscriptionStatus::Unpaid
            );
            if !revoked {
                log::info!(
                    "invoice.payment_failed for {} with status {:?}, keeping entitlement",
                    subscription_id,
                    state.status
                );
                return Ok(());
            }
            let Some(user) =
                resolve_user(store, gateway, &state.id, Some(&state.customer_id)).await?
            else {
                log::warn!(
                    "invoice.payment_failed: no local user for subscription {}",
                    subscription_id
                );
                return Ok(());
            };
            let patch = if state.status == SubscriptionStatus::Canceled {
                SubscriptionPatch::Clear
            } else {
                SubscriptionPatch::Suspend
            };
            store.apply_patch(user.id, &patch).await?;
            log::info!(
                "User {} downgraded after failed payment ({:?})",
                user.id,
                state.status
            );
            Ok(())
        }

        BillingEvent::Ignored(event_type) => {
            log::info!("Unhandled event type: {}", event_type);
            Ok(())
        }
    }
}

fn link_patch(state: &SubscriptionState) -> SubscriptionPatch {
    SubscriptionPatch::Link {
        subscription_id: state.id.clone(),
        customer_id: state.customer_id.clone(),
        price_id: state.price_id.clone(),
        period_end: state.current_period_end,
    }
}

/// Resolves the local user an event belongs to: by subscription id first,
/// then customer id, then the billing email on file with Stripe. The later
/// tiers exist because events can arrive before the local record has been
/// linked.
async fn resolve_user<S: UserStore, G: BillingGateway>(
    store: &S,
    gateway: &G,
    subscription_id: &str,
    customer_id: Option<&str>,
) -> Res<Option<User>> {
    if let Some(user) = store.find_by_subscription(subscription_id).await? {
        return Ok(Some(user));
    }

    let Some(customer_id) = customer_id else {
        return Ok(None);
    };

    if let Some(user) = store.find_by_customer(customer_id).await? {
        return Ok(Some(user));
    }

    let Some(email) = gateway.customer_email(customer_id).await? else {
        return Ok(None);
    };
    match store.find_by_email(&email).await? {
        Some(user) => {
            // Email linkage assumes the address is verified and unique;
            // leave a trace for auditing.
            log::warn!(
                "Linked customer {} to user {} by billing email",
                customer_id,
                user.id
            );
            Ok(Some(user))
        }
        None => Ok(None),
    }
}
