use chrono::{DateTime, TimeZone, Utc};
use db::models::user::Entitlement;
use serde::{Deserialize, Serialize};
use stripe::{Event, EventObject, EventType, Expandable};
use uuid::Uuid;

use common::error::{AppError, Res};

/// Local mirror of the Stripe subscription statuses this service reasons
/// about. Keeping our own enum means the entitlement mapping and its tests
/// never touch the wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Incomplete,
    IncompleteExpired,
    Canceled,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// active/trialing grant PREMIUM; every other status revokes it.
    pub fn entitlement(&self) -> Entitlement {
        match self {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing => Entitlement::Premium,
            _ => Entitlement::Free,
        }
    }
}

impl From<stripe::SubscriptionStatus> for SubscriptionStatus {
    fn from(status: stripe::SubscriptionStatus) -> Self {
        match status {
            stripe::SubscriptionStatus::Active => SubscriptionStatus::Active,
            stripe::SubscriptionStatus::Trialing => SubscriptionStatus::Trialing,
            stripe::SubscriptionStatus::PastDue => SubscriptionStatus::PastDue,
            stripe::SubscriptionStatus::Incomplete => SubscriptionStatus::Incomplete,
            stripe::SubscriptionStatus::IncompleteExpired => SubscriptionStatus::IncompleteExpired,
            stripe::SubscriptionStatus::Unpaid => SubscriptionStatus::Unpaid,
            stripe::SubscriptionStatus::Paused => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Canceled,
        }
    }
}

/// Snapshot of a Stripe subscription with every field this service needs,
/// validated at extraction time.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionState {
    pub id: String,
    pub customer_id: String,
    pub price_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}

impl SubscriptionState {
    pub fn from_stripe(sub: &stripe::Subscription) -> Res<Self> {
        let customer_id = match &sub.customer {
            Expandable::Id(id) => id.to_string(),
            Expandable::Object(customer) => customer.id.to_string(),
        };
        let price_id = sub
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string());

        Ok(SubscriptionState {
            id: sub.id.to_string(),
            customer_id,
            price_id,
            status: sub.status.into(),
            current_period_end: period_end_from_unix(sub.current_period_end)?,
            cancel_at_period_end: sub.cancel_at_period_end,
        })
    }
}

/// Converts Stripe's second-precision period end into a timestamp. Rejects
/// non-positive or out-of-range values so a malformed event can never write
/// corrupt state.
pub fn period_end_from_unix(secs: i64) -> Res<DateTime<Utc>> {
    if secs <= 0 {
        return Err(AppError::BadRequest(format!(
            "Invalid period end timestamp: {}",
            secs
        )));
    }
    match Utc.timestamp_opt(secs, 0) {
        chrono::LocalResult::Single(ts) => Ok(ts),
        _ => Err(AppError::BadRequest(format!(
            "Period end timestamp out of range: {}",
            secs
        ))),
    }
}

/// The webhook event types this service acts on, with their payload fields
/// already extracted and validated. Everything else lands in `Ignored`.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    CheckoutCompleted {
        subscription_id: String,
        customer_id: Option<String>,
        user_id: Option<Uuid>,
    },
    SubscriptionCreated(SubscriptionState),
    SubscriptionUpdated(SubscriptionState),
    SubscriptionDeleted(SubscriptionState),
    SubscriptionPaused(SubscriptionState),
    SubscriptionResumed(SubscriptionState),
    InvoicePaid {
        subscription_id: String,
        is_subscription_create: bool,
    },
    InvoicePaymentFailed {
        subscription_id: String,
    },
    Ignored(String),
}

impl BillingEvent {
    /// Extracts the typed event from a verified Stripe event. A payload
    /// missing the fields its type requires is an extraction error; the
    /// caller logs it and skips the mutation.
    pub fn from_stripe(event: Event) -> Res<Self> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                let EventObject::CheckoutSession(session) = event.data.object else {
                    return Err(unexpected_object(&event.type_));
                };
                let subscription_id = session
                    .subscription
                    .as_ref()
                    .map(|sub| sub.id().to_string())
                    .ok_or_else(|| {
                        AppError::BadRequest(
                            "Checkout session completed without a subscription".to_string(),
                        )
                    })?;
                let customer_id = session.customer.as_ref().map(|c| c.id().to_string());
                let user_id = session
                    .metadata
                    .as_ref()
                    .and_then(|meta| meta.get("userId"))
                    .and_then(|raw| Uuid::parse_str(raw).ok());

                Ok(BillingEvent::CheckoutCompleted {
                    subscription_id,
                    customer_id,
                    user_id,
                })
            }
            EventType::CustomerSubscriptionCreated => {
                Ok(BillingEvent::SubscriptionCreated(extract_subscription(event)?))
            }
            EventType::CustomerSubscriptionUpdated => {
                Ok(BillingEvent::SubscriptionUpdated(extract_subscription(event)?))
            }
            EventType::CustomerSubscriptionDeleted => {
                Ok(BillingEvent::SubscriptionDeleted(extract_subscription(event)?))
            }
            EventType::CustomerSubscriptionPaused => {
                Ok(BillingEvent::SubscriptionPaused(extract_subscription(event)?))
            }
            EventType::CustomerSubscriptionResumed => {
                Ok(BillingEvent::SubscriptionResumed(extract_subscription(event)?))
            }
            EventType::InvoicePaymentSucceeded => {
                let EventObject::Invoice(invoice) = event.data.object else {
                    return Err(unexpected_object(&event.type_));
                };
                let subscription_id = invoice
                    .subscription
                    .as_ref()
                    .map(|sub| sub.id().to_string())
                    .ok_or_else(|| {
                        AppError::BadRequest("Invoice without a subscription".to_string())
                    })?;
                let is_subscription_create = matches!(
                    invoice.billing_reason,
                    Some(stripe::InvoiceBillingReason::SubscriptionCreate)
                );
                Ok(BillingEvent::InvoicePaid {
                    subscription_id,
                    is_subscription_create,
                })
            }
            EventType::InvoicePaymentFailed => {
                let EventObject::Invoice(invoice) = event.data.object else {
                    return Err(unexpected_object(&event.type_));
                };
                let subscription_id = invoice
                    .subscription
                    .as_ref()
                    .map(|sub| sub.id().to_string())
                    .ok_or_else(|| {
                        AppError::BadRequest("Invoice without a subscription".to_string())
                    })?;
                Ok(BillingEvent::InvoicePaymentFailed { subscription_id })
            }
            other => Ok(BillingEvent::Ignored(other.to_string())),
        }
    }
}

fn extract_subscription(event: Event) -> Res<SubscriptionState> {
    let EventObject::Subscription(sub) = event.data.object else {
        return Err(unexpected_object(&event.type_));
    };
    SubscriptionState::from_stripe(&sub)
}

fn unexpected_object(event_type: &EventType) -> AppError {
    AppError::BadRequest(format!(
        "Unexpected payload object for event {}",
        event_type
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_end_rejects_non_positive_timestamps() {
        assert!(period_end_from_unix(0).is_err());
        assert!(period_end_from_unix(-1).is_err());
        assert!(period_end_from_unix(i64::MIN).is_err());
    }

    #[test]
    fn period_end_rejects_out_of_range_timestamps() {
        assert!(period_end_from_unix(i64::MAX).is_err());
    }

    #[test]
    fn period_end_converts_second_precision() {
        let ts = period_end_from_unix(1_750_000_000).unwrap();
        assert_eq!(ts.timestamp(), 1_750_000_000);
        assert_eq!(ts.timestamp_millis(), 1_750_000_000_000);
    }

    #[test]
    fn active_and_trialing_map_to_premium() {
        assert_eq!(
            SubscriptionStatus::Active.entitlement(),
            Entitlement::Premium
        );
        assert_eq!(
            SubscriptionStatus::Trialing.entitlement(),
            Entitlement::Premium
        );
    }

    #[test]
    fn terminal_statuses_map_to_free() {
        for status in [
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Incomplete,
            SubscriptionStatus::IncompleteExpired,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Paused,
        ] {
            assert_eq!(status.entitlement(), Entitlement::Free, "{:?}", status);
        }
    }
}
