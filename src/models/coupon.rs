// Coupon and coupon-usage models
// Codes are stored upper-case; single-use coupons allow at most one usage
// row per (coupon, user), and the (coupon, payment_reference) pair is the
// idempotency key under webhook replay.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::{coupon_usages, coupons};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiscountType {
    Fixed,
    Percentage,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Fixed => "fixed",
            DiscountType::Percentage => "percentage",
        }
    }
}

impl FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(DiscountType::Fixed),
            "percentage" => Ok(DiscountType::Percentage),
            _ => Err(format!("Invalid discount type: {}", s)),
        }
    }
}

/// What the coupon pays for: titular subscription or dependent activation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CouponType {
    Titular,
    Dependente,
}

impl CouponType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponType::Titular => "titular",
            CouponType::Dependente => "dependente",
        }
    }
}

impl FromStr for CouponType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "titular" => Ok(CouponType::Titular),
            "dependente" => Ok(CouponType::Dependente),
            _ => Err(format!("Invalid coupon type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = coupons)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value_cents: i64,
    pub coupon_type: String,
    pub unlimited_use: bool,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = coupon_usages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CouponUsage {
    pub id: Uuid,
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub payment_reference: String,
    pub discount_applied_cents: i64,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = coupon_usages)]
pub struct NewCouponUsage {
    pub coupon_id: Uuid,
    pub user_id: Uuid,
    pub payment_reference: String,
    pub discount_applied_cents: i64,
}

#[derive(thiserror::Error, Debug)]
pub enum CouponError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Coupon not found")]
    NotFound,
}

impl Coupon {
    /// Look up by code, normalized to upper case
    pub async fn find_by_code(
        conn: &mut AsyncPgConnection,
        code_str: &str,
    ) -> Result<Self, CouponError> {
        use crate::schema::coupons::dsl::*;

        coupons
            .filter(code.eq(code_str.trim().to_uppercase()))
            .first::<Coupon>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => CouponError::NotFound,
                _ => CouponError::Database(e),
            })
    }

    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        coupon_id: Uuid,
    ) -> Result<Self, CouponError> {
        use crate::schema::coupons::dsl::*;

        coupons
            .filter(id.eq(coupon_id))
            .first::<Coupon>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => CouponError::NotFound,
                _ => CouponError::Database(e),
            })
    }

    pub fn discount_type_enum(&self) -> DiscountType {
        DiscountType::from_str(&self.discount_type).unwrap_or(DiscountType::Fixed)
    }

    pub fn coupon_type_enum(&self) -> CouponType {
        CouponType::from_str(&self.coupon_type).unwrap_or(CouponType::Titular)
    }
}

impl CouponUsage {
    /// Count usages of a coupon by one user (single-use enforcement)
    pub async fn count_for_user(
        conn: &mut AsyncPgConnection,
        coupon_id_val: Uuid,
        user_id_val: Uuid,
    ) -> Result<i64, CouponError> {
        use crate::schema::coupon_usages::dsl::*;

        let count = coupon_usages
            .filter(coupon_id.eq(coupon_id_val))
            .filter(user_id.eq(user_id_val))
            .count()
            .get_result::<i64>(conn)
            .await?;

        Ok(count)
    }

    /// Record a usage once per (coupon, payment_reference); replays hit the
    /// unique constraint and are swallowed. Returns true when inserted.
    pub async fn record_once(
        conn: &mut AsyncPgConnection,
        usage: NewCouponUsage,
    ) -> Result<bool, CouponError> {
        use crate::schema::coupon_usages::dsl::*;

        let inserted = diesel::insert_into(coupon_usages)
            .values(&usage)
            .on_conflict((coupon_id, payment_reference))
            .do_nothing()
            .execute(conn)
            .await?;

        Ok(inserted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_type_conversion() {
        assert_eq!(DiscountType::from_str("fixed"), Ok(DiscountType::Fixed));
        assert_eq!(
            DiscountType::from_str("percentage"),
            Ok(DiscountType::Percentage)
        );
        assert!(DiscountType::from_str("half-off").is_err());
    }

    #[test]
    fn test_coupon_type_conversion() {
        assert_eq!(CouponType::from_str("titular"), Ok(CouponType::Titular));
        assert_eq!(
            CouponType::from_str("dependente"),
            Ok(CouponType::Dependente)
        );
        assert!(CouponType::from_str("ambos").is_err());
    }
}
