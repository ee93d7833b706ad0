// Subscription and payment orchestration
// Owns checkout creation for the three purchasable things (titular
// subscription, dependent activation, agenda access) and the webhook
// activation protocol. Activation runs in one transaction built from
// conditional updates, so gateway retries and concurrent deliveries are
// no-ops after the first effective pass.

use chrono::{Days, Utc};
use diesel_async::{AsyncConnection, AsyncPgConnection};
use serde::Serialize;
use uuid::Uuid;

use crate::models::coupon::{Coupon, CouponType, CouponUsage, NewCouponUsage};
use crate::models::affiliate_referral::AffiliateReferral;
use crate::models::dependent::{Dependent, DependentError};
use crate::models::payment::{NewPaymentNotification, PaymentIntent, PaymentNotification};
use crate::models::scheduling_access::SchedulingAccess;
use crate::models::user::{User, UserError};
use crate::services::coupon::{CouponService, CouponServiceError};
use crate::services::payment_gateway::{PaymentGatewayError, PaymentGatewayService};
use crate::services::settings::{SettingsError, SettingsService};

/// Days of coverage bought by a subscription or dependent payment
const SUBSCRIPTION_PERIOD_DAYS: u64 = 365;

/// Accepted agenda access durations, in days
const AGENDA_DURATIONS: [i64; 4] = [30, 90, 180, 365];

#[derive(thiserror::Error, Debug)]
pub enum SubscriptionError {
    #[error("Subscription is already active")]
    AlreadyActive,

    #[error("Dependent not found")]
    DependentNotFound,

    #[error("Dependent does not belong to this user")]
    NotOwner,

    #[error("Invalid agenda access duration")]
    InvalidDuration,

    #[error(transparent)]
    Coupon(#[from] CouponServiceError),

    #[error(transparent)]
    Gateway(#[from] PaymentGatewayError),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("User not found")]
    UserNotFound,
}

impl From<UserError> for SubscriptionError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::NotFound => SubscriptionError::UserNotFound,
            UserError::Database(db) => SubscriptionError::Database(db),
            _ => SubscriptionError::UserNotFound,
        }
    }
}

impl From<DependentError> for SubscriptionError {
    fn from(e: DependentError) -> Self {
        match e {
            DependentError::NotFound => SubscriptionError::DependentNotFound,
            DependentError::Database(db) => SubscriptionError::Database(db),
        }
    }
}

impl From<SettingsError> for SubscriptionError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Database(db) => SubscriptionError::Database(db),
        }
    }
}

impl From<crate::models::coupon::CouponError> for SubscriptionError {
    fn from(e: crate::models::coupon::CouponError) -> Self {
        SubscriptionError::Coupon(e.into())
    }
}

impl From<crate::models::affiliate_referral::AffiliateReferralError> for SubscriptionError {
    fn from(e: crate::models::affiliate_referral::AffiliateReferralError) -> Self {
        match e {
            crate::models::affiliate_referral::AffiliateReferralError::Database(db) => {
                SubscriptionError::Database(db)
            },
            _ => SubscriptionError::UserNotFound,
        }
    }
}

impl From<crate::models::scheduling_access::SchedulingAccessError> for SubscriptionError {
    fn from(e: crate::models::scheduling_access::SchedulingAccessError) -> Self {
        match e {
            crate::models::scheduling_access::SchedulingAccessError::Database(db) => {
                SubscriptionError::Database(db)
            },
        }
    }
}

impl From<crate::models::payment::PaymentNotificationError> for SubscriptionError {
    fn from(e: crate::models::payment::PaymentNotificationError) -> Self {
        match e {
            crate::models::payment::PaymentNotificationError::Database(db) => {
                SubscriptionError::Database(db)
            },
        }
    }
}

/// Outcome of a checkout request: either activated on the spot (total was
/// zero) or a redirect to the hosted checkout.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Activated {
        amount_cents: i64,
        discount_cents: i64,
    },
    PaymentRequired {
        preference_id: String,
        init_point: String,
        amount_cents: i64,
        discount_cents: i64,
    },
}

#[derive(Clone)]
pub struct SubscriptionService {
    settings: SettingsService,
    gateway: PaymentGatewayService,
}

impl SubscriptionService {
    pub fn new(settings: SettingsService, gateway: PaymentGatewayService) -> Self {
        Self { settings, gateway }
    }

    /// Start a titular subscription purchase
    pub async fn create_subscription_checkout(
        &self,
        conn: &mut AsyncPgConnection,
        user: &User,
        coupon_code: Option<&str>,
    ) -> Result<CheckoutOutcome, SubscriptionError> {
        let today = Utc::now().date_naive();
        if user.has_active_subscription(today) {
            return Err(SubscriptionError::AlreadyActive);
        }

        let base = self.settings.subscription_price_cents(conn).await?;
        let (coupon, discount, total) =
            self.price_with_coupon(conn, base, coupon_code, CouponType::Titular, user.id)
                .await?;

        if total == 0 {
            let user_id = user.id;
            let applied = coupon.as_ref().map(|c| (c.id, discount));
            conn.transaction::<_, SubscriptionError, _>(|tx| {
                Box::pin(async move {
                    Self::activate_user(tx, user_id, None).await?;
                    if let Some((coupon_id, discount_cents)) = applied {
                        CouponUsage::record_once(
                            tx,
                            NewCouponUsage {
                                coupon_id,
                                user_id,
                                payment_reference: format!("free:{}", Uuid::new_v4()),
                                discount_applied_cents: discount_cents,
                            },
                        )
                        .await?;
                    }
                    AffiliateReferral::mark_converted(tx, user_id).await?;
                    Ok(())
                })
            })
            .await?;

            tracing::info!("Subscription activated without payment for user {}", user.id);
            return Ok(CheckoutOutcome::Activated {
                amount_cents: 0,
                discount_cents: discount,
            });
        }

        let intent = PaymentIntent::Subscription {
            user_id: user.id,
            coupon_id: coupon.as_ref().map(|c| c.id),
        };
        let preference = self
            .gateway
            .create_preference("Assinatura Convênio", &user.name, total, &intent.to_reference())
            .await?;

        Ok(CheckoutOutcome::PaymentRequired {
            preference_id: preference.preference_id,
            init_point: preference.init_point,
            amount_cents: total,
            discount_cents: discount,
        })
    }

    /// Start a dependent activation purchase; the dependent must belong to
    /// the requesting titular.
    pub async fn create_dependent_checkout(
        &self,
        conn: &mut AsyncPgConnection,
        user: &User,
        dependent_id: Uuid,
        coupon_code: Option<&str>,
    ) -> Result<CheckoutOutcome, SubscriptionError> {
        let dependent = Dependent::find_by_id(conn, dependent_id).await?;
        if dependent.user_id != user.id {
            return Err(SubscriptionError::NotOwner);
        }

        let today = Utc::now().date_naive();
        let already_covered = dependent.subscription_status == "active"
            && dependent.subscription_expiry.map(|d| d >= today).unwrap_or(false);
        if already_covered {
            return Err(SubscriptionError::AlreadyActive);
        }

        let base = self.settings.dependent_price_cents(conn).await?;
        let (coupon, discount, total) = self
            .price_with_coupon(conn, base, coupon_code, CouponType::Dependente, user.id)
            .await?;

        if total == 0 {
            let titular_id = user.id;
            let applied = coupon.as_ref().map(|c| (c.id, discount));
            conn.transaction::<_, SubscriptionError, _>(|tx| {
                Box::pin(async move {
                    Self::activate_dependent(tx, dependent_id).await?;
                    if let Some((coupon_id, discount_cents)) = applied {
                        CouponUsage::record_once(
                            tx,
                            NewCouponUsage {
                                coupon_id,
                                user_id: titular_id,
                                payment_reference: format!("free:{}", Uuid::new_v4()),
                                discount_applied_cents: discount_cents,
                            },
                        )
                        .await?;
                    }
                    Ok(())
                })
            })
            .await?;

            tracing::info!("Dependent {} activated without payment", dependent_id);
            return Ok(CheckoutOutcome::Activated {
                amount_cents: 0,
                discount_cents: discount,
            });
        }

        let intent = PaymentIntent::Dependent {
            dependent_id,
            coupon_id: coupon.as_ref().map(|c| c.id),
        };
        let preference = self
            .gateway
            .create_preference(
                "Ativação de dependente",
                &user.name,
                total,
                &intent.to_reference(),
            )
            .await?;

        Ok(CheckoutOutcome::PaymentRequired {
            preference_id: preference.preference_id,
            init_point: preference.init_point,
            amount_cents: total,
            discount_cents: discount,
        })
    }

    /// Start an agenda access purchase for a professional
    pub async fn create_agenda_checkout(
        &self,
        conn: &mut AsyncPgConnection,
        user: &User,
        duration_days: i64,
    ) -> Result<CheckoutOutcome, SubscriptionError> {
        if !AGENDA_DURATIONS.contains(&duration_days) {
            return Err(SubscriptionError::InvalidDuration);
        }

        let price_per_period = self.settings.agenda_access_price_cents(conn).await?;
        let total = price_per_period * duration_days / 30;

        let intent = PaymentIntent::AgendaAccess {
            professional_id: user.id,
            duration_days,
        };
        let preference = self
            .gateway
            .create_preference(
                &format!("Acesso à agenda ({} dias)", duration_days),
                &user.name,
                total,
                &intent.to_reference(),
            )
            .await?;

        Ok(CheckoutOutcome::PaymentRequired {
            preference_id: preference.preference_id,
            init_point: preference.init_point,
            amount_cents: total,
            discount_cents: 0,
        })
    }

    async fn price_with_coupon(
        &self,
        conn: &mut AsyncPgConnection,
        base_cents: i64,
        coupon_code: Option<&str>,
        expected_type: CouponType,
        user_id: Uuid,
    ) -> Result<(Option<Coupon>, i64, i64), SubscriptionError> {
        match coupon_code {
            Some(code) if !code.trim().is_empty() => {
                let coupon = CouponService::validate(conn, code, expected_type, user_id).await?;
                let applied = CouponService::apply_discount(base_cents, &coupon);
                Ok((Some(applied.coupon), applied.discount_cents, applied.final_cents))
            },
            _ => Ok((None, 0, base_cents)),
        }
    }

    async fn activate_user(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        payment_id: Option<&str>,
    ) -> Result<bool, SubscriptionError> {
        let today = Utc::now().date_naive();
        let expiry = today
            .checked_add_days(Days::new(SUBSCRIPTION_PERIOD_DAYS))
            .unwrap_or(today);

        let activated = User::activate_subscription(conn, user_id, today, expiry).await?;
        if !activated {
            tracing::info!(
                "Subscription for user {} already active, skipping activation (payment {:?})",
                user_id,
                payment_id
            );
        }
        Ok(activated)
    }

    async fn activate_dependent(
        conn: &mut AsyncPgConnection,
        dependent_id: Uuid,
    ) -> Result<bool, SubscriptionError> {
        let today = Utc::now().date_naive();
        let expiry = today
            .checked_add_days(Days::new(SUBSCRIPTION_PERIOD_DAYS))
            .unwrap_or(today);

        Ok(Dependent::activate_subscription(conn, dependent_id, today, expiry).await?)
    }

    /// Process a webhook notification after it was durably recorded.
    /// Fetches the authoritative payment from the gateway and, when
    /// approved, runs the activation protocol in a single transaction.
    pub async fn process_payment_notification(
        &self,
        conn: &mut AsyncPgConnection,
        gateway_payment_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), SubscriptionError> {
        let newly_recorded = PaymentNotification::record_once(
            conn,
            NewPaymentNotification {
                gateway_payment_id: gateway_payment_id.to_string(),
                external_reference: None,
                status: "received".to_string(),
                payload,
            },
        )
        .await?;

        if !newly_recorded {
            let existing = PaymentNotification::find_by_gateway_id(conn, gateway_payment_id)
                .await?;
            if existing.map(|n| n.is_settled()).unwrap_or(false) {
                tracing::info!(
                    "Payment notification {} already processed, acknowledging replay",
                    gateway_payment_id
                );
                return Ok(());
            }
            // unprocessed duplicate: a prior delivery died between recording
            // and activation, so this one retries the activation pass
            tracing::info!(
                "Payment notification {} recorded but unprocessed, retrying",
                gateway_payment_id
            );
        }

        let payment = self.gateway.fetch_payment(gateway_payment_id).await?;

        if !payment.is_approved() {
            tracing::info!(
                "Payment {} has status '{}', nothing to activate",
                gateway_payment_id,
                payment.status
            );
            PaymentNotification::mark_processed(conn, gateway_payment_id, &payment.status).await?;
            return Ok(());
        }

        let Some(reference) = payment.external_reference.as_deref() else {
            tracing::warn!(
                "Approved payment {} carries no external_reference, acknowledging",
                gateway_payment_id
            );
            PaymentNotification::mark_processed(conn, gateway_payment_id, "unparseable").await?;
            return Ok(());
        };

        let Some(intent) = PaymentIntent::parse(reference) else {
            tracing::warn!(
                "Approved payment {} has unknown external_reference '{}', acknowledging",
                gateway_payment_id,
                reference
            );
            PaymentNotification::mark_processed(conn, gateway_payment_id, "unparseable").await?;
            return Ok(());
        };

        // prices are read outside the transaction; the recorded discount
        // reflects the price in effect when the webhook lands
        let base_cents = match intent {
            PaymentIntent::Subscription { .. } => {
                Some(self.settings.subscription_price_cents(conn).await?)
            },
            PaymentIntent::Dependent { .. } => {
                Some(self.settings.dependent_price_cents(conn).await?)
            },
            PaymentIntent::AgendaAccess { .. } | PaymentIntent::ProfessionalPayout { .. } => None,
        };

        let payment_id = gateway_payment_id.to_string();

        conn.transaction::<_, SubscriptionError, _>(|tx| {
            Box::pin(async move {
                if !PaymentNotification::claim_for_processing(tx, &payment_id).await? {
                    tracing::info!(
                        "Payment {} claimed by a concurrent delivery, skipping",
                        payment_id
                    );
                    return Ok(());
                }

                match intent {
                    PaymentIntent::Subscription { user_id, coupon_id } => {
                        Self::activate_user(tx, user_id, Some(&payment_id)).await?;
                        if let Some(coupon_id) = coupon_id {
                            Self::record_coupon_usage(
                                tx,
                                coupon_id,
                                user_id,
                                CouponType::Titular,
                                &payment_id,
                                base_cents.unwrap_or(0),
                            )
                            .await?;
                        }
                        if AffiliateReferral::mark_converted(tx, user_id).await? {
                            tracing::info!("Affiliate referral converted for user {}", user_id);
                        }
                        tracing::info!(
                            "Subscription activated for user {} by payment {}",
                            user_id,
                            payment_id
                        );
                    },
                    PaymentIntent::Dependent {
                        dependent_id,
                        coupon_id,
                    } => {
                        Self::activate_dependent(tx, dependent_id).await?;
                        if let Some(coupon_id) = coupon_id {
                            let dependent = Dependent::find_by_id(tx, dependent_id).await?;
                            Self::record_coupon_usage(
                                tx,
                                coupon_id,
                                dependent.user_id,
                                CouponType::Dependente,
                                &payment_id,
                                base_cents.unwrap_or(0),
                            )
                            .await?;
                        }
                        tracing::info!(
                            "Dependent {} activated by payment {}",
                            dependent_id,
                            payment_id
                        );
                    },
                    PaymentIntent::AgendaAccess {
                        professional_id,
                        duration_days,
                    } => {
                        let expires =
                            SchedulingAccess::extend(tx, professional_id, duration_days).await?;
                        tracing::info!(
                            "Agenda access for professional {} extended to {} by payment {}",
                            professional_id,
                            expires,
                            payment_id
                        );
                    },
                    PaymentIntent::ProfessionalPayout {
                        professional_id,
                        amount_cents,
                    } => {
                        // payouts are settled out of band; the notification
                        // row is the audit record
                        tracing::info!(
                            "Payout of {} cents to professional {} recorded by payment {}",
                            amount_cents,
                            professional_id,
                            payment_id
                        );
                    },
                }

                PaymentNotification::mark_processed(tx, &payment_id, "approved").await?;
                Ok(())
            })
        })
        .await?;

        Ok(())
    }

    /// Record the coupon usage backing an approved payment. The coupon is
    /// re-checked here: one hot-toggled inactive (or retargeted) between
    /// checkout and webhook is not honored, only logged.
    async fn record_coupon_usage(
        conn: &mut AsyncPgConnection,
        coupon_id: Uuid,
        user_id: Uuid,
        expected_type: CouponType,
        payment_id: &str,
        base_cents: i64,
    ) -> Result<(), SubscriptionError> {
        let coupon = Coupon::find_by_id(conn, coupon_id).await?;
        if let Err(e) = CouponService::check_usable(&coupon, expected_type) {
            tracing::warn!(
                "Coupon {} no longer valid at activation of payment {} ({}), skipping usage",
                coupon.code,
                payment_id,
                e
            );
            return Ok(());
        }
        let applied = CouponService::apply_discount(base_cents, &coupon);
        let recorded = CouponUsage::record_once(
            conn,
            NewCouponUsage {
                coupon_id,
                user_id,
                payment_reference: format!("payment:{}", payment_id),
                discount_applied_cents: applied.discount_cents,
            },
        )
        .await?;

        if !recorded {
            tracing::info!(
                "Coupon usage for payment {} already recorded, skipping",
                payment_id
            );
        }
        Ok(())
    }
}
