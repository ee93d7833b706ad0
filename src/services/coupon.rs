// Coupon validation and discount math
// All money is integer cents. The expected coupon type is derived from the
// action being paid for, never taken from the client.

use diesel_async::AsyncPgConnection;
use uuid::Uuid;

use crate::models::coupon::{Coupon, CouponError, CouponType, CouponUsage, DiscountType};

#[derive(thiserror::Error, Debug)]
pub enum CouponServiceError {
    #[error("Coupon not found")]
    NotFound,

    #[error("Coupon is not active")]
    Inactive,

    #[error("Coupon does not apply to this purchase")]
    WrongType,

    #[error("Coupon already used")]
    AlreadyUsed,

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<CouponError> for CouponServiceError {
    fn from(e: CouponError) -> Self {
        match e {
            CouponError::NotFound => CouponServiceError::NotFound,
            CouponError::Database(db) => CouponServiceError::Database(db),
        }
    }
}

/// Result of validating a coupon against a base price
#[derive(Debug, Clone)]
pub struct AppliedCoupon {
    pub coupon: Coupon,
    pub discount_cents: i64,
    pub final_cents: i64,
}

pub struct CouponService;

impl CouponService {
    /// Validate a coupon for a user and purchase type. Enforces activity,
    /// type match, and single use per user (unless unlimited_use).
    pub async fn validate(
        conn: &mut AsyncPgConnection,
        code: &str,
        expected_type: CouponType,
        user_id: Uuid,
    ) -> Result<Coupon, CouponServiceError> {
        let coupon = Coupon::find_by_code(conn, code).await?;

        Self::check_usable(&coupon, expected_type)?;
        if !coupon.unlimited_use {
            let uses = CouponUsage::count_for_user(conn, coupon.id, user_id).await?;
            if uses > 0 {
                return Err(CouponServiceError::AlreadyUsed);
            }
        }

        Ok(coupon)
    }

    /// Activity and type checks. These hold at validate time and are
    /// re-run at activation, so a coupon toggled off (or retargeted)
    /// between checkout and webhook is not honored.
    pub fn check_usable(
        coupon: &Coupon,
        expected_type: CouponType,
    ) -> Result<(), CouponServiceError> {
        if !coupon.is_active {
            return Err(CouponServiceError::Inactive);
        }
        if coupon.coupon_type_enum() != expected_type {
            return Err(CouponServiceError::WrongType);
        }
        Ok(())
    }

    /// Compute the discount for a base price. Fixed discounts subtract
    /// value_cents; percentage discounts take value_cents as a percent of
    /// the base. The final price never goes below zero.
    pub fn apply_discount(base_cents: i64, coupon: &Coupon) -> AppliedCoupon {
        let raw_discount = match coupon.discount_type_enum() {
            DiscountType::Fixed => coupon.discount_value_cents,
            DiscountType::Percentage => base_cents * coupon.discount_value_cents / 100,
        };
        let discount_cents = raw_discount.clamp(0, base_cents);

        AppliedCoupon {
            coupon: coupon.clone(),
            discount_cents,
            final_cents: base_cents - discount_cents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn coupon(discount_type: &str, value_cents: i64) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "TEST".to_string(),
            discount_type: discount_type.to_string(),
            discount_value_cents: value_cents,
            coupon_type: "titular".to_string(),
            unlimited_use: false,
            is_active: true,
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_fixed_discount() {
        // QUIRO70: R$530 off a R$600 subscription leaves R$70
        let applied = CouponService::apply_discount(60_000, &coupon("fixed", 53_000));
        assert_eq!(applied.discount_cents, 53_000);
        assert_eq!(applied.final_cents, 7_000);
    }

    #[test]
    fn test_percentage_discount() {
        let applied = CouponService::apply_discount(60_000, &coupon("percentage", 60));
        assert_eq!(applied.discount_cents, 36_000);
        assert_eq!(applied.final_cents, 24_000);
    }

    #[test]
    fn test_deactivated_coupon_fails_activation_recheck() {
        // Toggled off between checkout and webhook: the activation-time
        // re-check must refuse it even though validation once passed.
        let mut hot_toggled = coupon("fixed", 53_000);
        assert!(CouponService::check_usable(&hot_toggled, CouponType::Titular).is_ok());

        hot_toggled.is_active = false;
        assert!(matches!(
            CouponService::check_usable(&hot_toggled, CouponType::Titular),
            Err(CouponServiceError::Inactive)
        ));
    }

    #[test]
    fn test_retargeted_coupon_fails_activation_recheck() {
        let mut retargeted = coupon("fixed", 4_000);
        retargeted.coupon_type = "dependente".to_string();
        assert!(matches!(
            CouponService::check_usable(&retargeted, CouponType::Titular),
            Err(CouponServiceError::WrongType)
        ));
        assert!(CouponService::check_usable(&retargeted, CouponType::Dependente).is_ok());
    }

    #[test]
    fn test_discount_never_negative() {
        let applied = CouponService::apply_discount(25_000, &coupon("fixed", 99_999));
        assert_eq!(applied.discount_cents, 25_000);
        assert_eq!(applied.final_cents, 0);

        let full = CouponService::apply_discount(60_000, &coupon("percentage", 100));
        assert_eq!(full.final_cents, 0);
    }
}
