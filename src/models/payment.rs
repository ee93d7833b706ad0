// Payment intent grammar and durable webhook record
// The external_reference string is the only context that survives the round
// trip through the gateway, so its grammar is the contract between checkout
// creation and webhook processing.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::payment_notifications;

/// What an approved payment buys, reconstructed from external_reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentIntent {
    Subscription {
        user_id: Uuid,
        coupon_id: Option<Uuid>,
    },
    Dependent {
        dependent_id: Uuid,
        coupon_id: Option<Uuid>,
    },
    AgendaAccess {
        professional_id: Uuid,
        duration_days: i64,
    },
    /// Payout to a professional; settled out of band, the webhook only
    /// records and acknowledges it.
    ProfessionalPayout {
        professional_id: Uuid,
        amount_cents: i64,
    },
}

impl PaymentIntent {
    /// Render the external_reference string sent to the gateway
    pub fn to_reference(&self) -> String {
        match self {
            PaymentIntent::Subscription { user_id, coupon_id } => match coupon_id {
                Some(coupon) => format!("subscription:{}:{}", user_id, coupon),
                None => format!("subscription:{}", user_id),
            },
            PaymentIntent::Dependent {
                dependent_id,
                coupon_id,
            } => match coupon_id {
                Some(coupon) => format!("dependent:{}:{}", dependent_id, coupon),
                None => format!("dependent:{}", dependent_id),
            },
            PaymentIntent::AgendaAccess {
                professional_id,
                duration_days,
            } => format!("agenda:{}:{}", professional_id, duration_days),
            PaymentIntent::ProfessionalPayout {
                professional_id,
                amount_cents,
            } => format!("payout:{}:{}", professional_id, amount_cents),
        }
    }

    /// Parse an external_reference back into an intent. Unknown shapes
    /// return None so the webhook can acknowledge without acting.
    pub fn parse(reference: &str) -> Option<Self> {
        let mut parts = reference.split(':');
        let kind = parts.next()?;
        match kind {
            "subscription" => {
                let user_id = Uuid::parse_str(parts.next()?).ok()?;
                let coupon_id = match parts.next() {
                    Some(raw) => Some(Uuid::parse_str(raw).ok()?),
                    None => None,
                };
                if parts.next().is_some() {
                    return None;
                }
                Some(PaymentIntent::Subscription { user_id, coupon_id })
            }
            "dependent" => {
                let dependent_id = Uuid::parse_str(parts.next()?).ok()?;
                let coupon_id = match parts.next() {
                    Some(raw) => Some(Uuid::parse_str(raw).ok()?),
                    None => None,
                };
                if parts.next().is_some() {
                    return None;
                }
                Some(PaymentIntent::Dependent {
                    dependent_id,
                    coupon_id,
                })
            }
            "agenda" => {
                let professional_id = Uuid::parse_str(parts.next()?).ok()?;
                let duration_days = parts.next()?.parse::<i64>().ok()?;
                if parts.next().is_some() || duration_days <= 0 {
                    return None;
                }
                Some(PaymentIntent::AgendaAccess {
                    professional_id,
                    duration_days,
                })
            }
            "payout" => {
                let professional_id = Uuid::parse_str(parts.next()?).ok()?;
                let amount_cents = parts.next()?.parse::<i64>().ok()?;
                if parts.next().is_some() || amount_cents <= 0 {
                    return None;
                }
                Some(PaymentIntent::ProfessionalPayout {
                    professional_id,
                    amount_cents,
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = payment_notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentNotification {
    pub id: Uuid,
    pub gateway_payment_id: String,
    pub external_reference: Option<String>,
    pub status: String,
    pub payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payment_notifications)]
pub struct NewPaymentNotification {
    pub gateway_payment_id: String,
    pub external_reference: Option<String>,
    pub status: String,
    pub payload: serde_json::Value,
}

#[derive(thiserror::Error, Debug)]
pub enum PaymentNotificationError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl PaymentNotification {
    /// A settled notification already ran its activation pass; acting on
    /// it again would double-apply the payment.
    pub fn is_settled(&self) -> bool {
        self.processed_at.is_some()
    }

    pub async fn find_by_gateway_id(
        conn: &mut AsyncPgConnection,
        gateway_payment_id_val: &str,
    ) -> Result<Option<Self>, PaymentNotificationError> {
        use crate::schema::payment_notifications::dsl::*;

        let row = payment_notifications
            .filter(gateway_payment_id.eq(gateway_payment_id_val))
            .first::<PaymentNotification>(conn)
            .await
            .optional()?;

        Ok(row)
    }

    /// Claim the notification for its activation pass. The conditional
    /// update makes concurrent deliveries of the same payment id race for
    /// one winner: the loser blocks on the row lock, re-evaluates the
    /// predicate after commit, and sees zero rows.
    pub async fn claim_for_processing(
        conn: &mut AsyncPgConnection,
        gateway_payment_id_val: &str,
    ) -> Result<bool, PaymentNotificationError> {
        use crate::schema::payment_notifications::dsl::*;

        let claimed = diesel::update(
            payment_notifications
                .filter(gateway_payment_id.eq(gateway_payment_id_val))
                .filter(processed_at.is_null()),
        )
        .set(status.eq("processing"))
        .execute(conn)
        .await?;

        Ok(claimed > 0)
    }

    /// Insert unless this gateway payment id was already recorded.
    /// Returns true when a new row was created.
    pub async fn record_once(
        conn: &mut AsyncPgConnection,
        notification: NewPaymentNotification,
    ) -> Result<bool, PaymentNotificationError> {
        use crate::schema::payment_notifications::dsl::*;

        let inserted = diesel::insert_into(payment_notifications)
            .values(&notification)
            .on_conflict(gateway_payment_id)
            .do_nothing()
            .execute(conn)
            .await?;

        Ok(inserted > 0)
    }

    pub async fn mark_processed(
        conn: &mut AsyncPgConnection,
        gateway_payment_id_val: &str,
        final_status: &str,
    ) -> Result<(), PaymentNotificationError> {
        use crate::schema::payment_notifications::dsl::*;

        diesel::update(
            payment_notifications.filter(gateway_payment_id.eq(gateway_payment_id_val)),
        )
        .set((
            status.eq(final_status),
            processed_at.eq(Some(Utc::now())),
        ))
        .execute(conn)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_reference_roundtrip() {
        let user = Uuid::new_v4();
        let plain = PaymentIntent::Subscription {
            user_id: user,
            coupon_id: None,
        };
        assert_eq!(plain.to_reference(), format!("subscription:{}", user));
        assert_eq!(PaymentIntent::parse(&plain.to_reference()), Some(plain));

        let coupon = Uuid::new_v4();
        let with_coupon = PaymentIntent::Subscription {
            user_id: user,
            coupon_id: Some(coupon),
        };
        assert_eq!(
            PaymentIntent::parse(&with_coupon.to_reference()),
            Some(with_coupon)
        );
    }

    #[test]
    fn test_dependent_reference_roundtrip() {
        let dependent = Uuid::new_v4();
        let coupon = Uuid::new_v4();
        let intent = PaymentIntent::Dependent {
            dependent_id: dependent,
            coupon_id: Some(coupon),
        };
        assert_eq!(
            intent.to_reference(),
            format!("dependent:{}:{}", dependent, coupon)
        );
        assert_eq!(PaymentIntent::parse(&intent.to_reference()), Some(intent));
    }

    #[test]
    fn test_agenda_reference_roundtrip() {
        let professional = Uuid::new_v4();
        let intent = PaymentIntent::AgendaAccess {
            professional_id: professional,
            duration_days: 90,
        };
        assert_eq!(
            intent.to_reference(),
            format!("agenda:{}:90", professional)
        );
        assert_eq!(PaymentIntent::parse(&intent.to_reference()), Some(intent));
    }

    #[test]
    fn test_payout_reference_roundtrip() {
        let professional = Uuid::new_v4();
        let intent = PaymentIntent::ProfessionalPayout {
            professional_id: professional,
            amount_cents: 12_500,
        };
        assert_eq!(
            intent.to_reference(),
            format!("payout:{}:12500", professional)
        );
        assert_eq!(PaymentIntent::parse(&intent.to_reference()), Some(intent));
    }

    #[test]
    fn test_parse_rejects_unknown_shapes() {
        assert_eq!(PaymentIntent::parse(""), None);
        assert_eq!(PaymentIntent::parse("subscription:not-a-uuid"), None);
        assert_eq!(PaymentIntent::parse("donation:123"), None);
        assert_eq!(
            PaymentIntent::parse(&format!("agenda:{}:zero", Uuid::new_v4())),
            None
        );
        assert_eq!(
            PaymentIntent::parse(&format!("agenda:{}:-30", Uuid::new_v4())),
            None
        );
        // payouts must carry a positive amount
        assert_eq!(
            PaymentIntent::parse(&format!("payout:{}", Uuid::new_v4())),
            None
        );
        assert_eq!(
            PaymentIntent::parse(&format!("payout:{}:0", Uuid::new_v4())),
            None
        );
        // trailing segments are not part of the grammar
        let user = Uuid::new_v4();
        assert_eq!(
            PaymentIntent::parse(&format!("subscription:{}:{}:{}", user, user, user)),
            None
        );
    }

    fn notification(processed_at: Option<DateTime<Utc>>) -> PaymentNotification {
        PaymentNotification {
            id: Uuid::new_v4(),
            gateway_payment_id: "mp-123".to_string(),
            external_reference: None,
            status: "received".to_string(),
            payload: serde_json::json!({}),
            received_at: Utc::now(),
            processed_at,
        }
    }

    #[test]
    fn test_settled_notification_is_not_replayed() {
        // A second delivery of an already-processed payment id must
        // short-circuit before any activation step re-runs.
        assert!(notification(Some(Utc::now())).is_settled());
    }

    #[test]
    fn test_unprocessed_duplicate_is_retried() {
        // A delivery that died between recording and activation leaves
        // processed_at null; the retry is allowed through.
        assert!(!notification(None).is_settled());
    }
}
