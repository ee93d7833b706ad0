// Affiliate referral model
// First-touch attribution: the first click for a (affiliate, visitor) pair
// wins; registration binds the visitor to a user; conversion arrives later
// from the payment webhook.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::affiliate_referrals;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = affiliate_referrals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AffiliateReferral {
    pub id: Uuid,
    pub affiliate_id: Uuid,
    pub visitor_identifier: String,
    pub user_id: Option<Uuid>,
    pub referral_code: String,
    pub converted: bool,
    pub converted_at: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub referrer_url: Option<String>,
    pub landing_page: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = affiliate_referrals)]
pub struct NewAffiliateReferral {
    pub affiliate_id: Uuid,
    pub visitor_identifier: String,
    pub referral_code: String,
    pub user_agent: Option<String>,
    pub referrer_url: Option<String>,
    pub landing_page: Option<String>,
}

/// Derived per-row status for affiliate reporting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    ClickOnly,
    Registered,
    Converted,
}

#[derive(thiserror::Error, Debug)]
pub enum AffiliateReferralError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Referral not found")]
    NotFound,
}

impl AffiliateReferral {
    /// Insert a click unless the (affiliate, visitor) pair already exists.
    /// Returns true when a new row was created.
    pub async fn track_click(
        conn: &mut AsyncPgConnection,
        referral: NewAffiliateReferral,
    ) -> Result<bool, AffiliateReferralError> {
        use crate::schema::affiliate_referrals::dsl::*;

        let inserted = diesel::insert_into(affiliate_referrals)
            .values(&referral)
            .on_conflict((affiliate_id, visitor_identifier))
            .do_nothing()
            .execute(conn)
            .await?;

        Ok(inserted > 0)
    }

    /// Most recent unlinked referral for a visitor identifier
    pub async fn find_unlinked_for_visitor(
        conn: &mut AsyncPgConnection,
        visitor: &str,
    ) -> Result<Option<Self>, AffiliateReferralError> {
        use crate::schema::affiliate_referrals::dsl::*;

        let referral = affiliate_referrals
            .filter(visitor_identifier.eq(visitor))
            .filter(user_id.is_null())
            .order(created_at.desc())
            .first::<AffiliateReferral>(conn)
            .await
            .optional()?;

        Ok(referral)
    }

    /// Bind a user to this referral; conditional on the row still being
    /// unlinked so concurrent callers see exactly one winner.
    pub async fn link_user(
        conn: &mut AsyncPgConnection,
        referral_id: Uuid,
        user_id_val: Uuid,
    ) -> Result<bool, AffiliateReferralError> {
        use crate::schema::affiliate_referrals::dsl::*;

        let updated = diesel::update(
            affiliate_referrals
                .filter(id.eq(referral_id))
                .filter(user_id.is_null()),
        )
        .set((user_id.eq(Some(user_id_val)), updated_at.eq(Utc::now())))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    /// Mark the referral bound to a user as converted; only rows with a
    /// user and not yet converted change, so replays are no-ops.
    pub async fn mark_converted(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> Result<bool, AffiliateReferralError> {
        use crate::schema::affiliate_referrals::dsl::*;

        let now = Utc::now();

        let updated = diesel::update(
            affiliate_referrals
                .filter(user_id.eq(Some(user_id_val)))
                .filter(converted.eq(false)),
        )
        .set((
            converted.eq(true),
            converted_at.eq(Some(now)),
            updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    /// All referrals of one affiliate, newest first
    pub async fn list_for_affiliate(
        conn: &mut AsyncPgConnection,
        affiliate_id_val: Uuid,
    ) -> Result<Vec<Self>, AffiliateReferralError> {
        use crate::schema::affiliate_referrals::dsl::*;

        let rows = affiliate_referrals
            .filter(affiliate_id.eq(affiliate_id_val))
            .order(created_at.desc())
            .load::<AffiliateReferral>(conn)
            .await?;

        Ok(rows)
    }

    /// Whether any referral exists for a visitor identifier
    pub async fn exists_for_visitor(
        conn: &mut AsyncPgConnection,
        visitor: &str,
    ) -> Result<bool, AffiliateReferralError> {
        use crate::schema::affiliate_referrals::dsl::*;

        let count: i64 = affiliate_referrals
            .filter(visitor_identifier.eq(visitor))
            .count()
            .get_result(conn)
            .await?;

        Ok(count > 0)
    }

    pub fn status(&self) -> ReferralStatus {
        if self.converted {
            ReferralStatus::Converted
        } else if self.user_id.is_some() {
            ReferralStatus::Registered
        } else {
            ReferralStatus::ClickOnly
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn referral(user: Option<Uuid>, converted_flag: bool) -> AffiliateReferral {
        let now = Utc::now();
        AffiliateReferral {
            id: Uuid::new_v4(),
            affiliate_id: Uuid::new_v4(),
            visitor_identifier: "visitor-1".to_string(),
            user_id: user,
            referral_code: "42".to_string(),
            converted: converted_flag,
            converted_at: converted_flag.then(|| now),
            user_agent: None,
            referrer_url: None,
            landing_page: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_derived_status() {
        assert_eq!(referral(None, false).status(), ReferralStatus::ClickOnly);
        assert_eq!(
            referral(Some(Uuid::new_v4()), false).status(),
            ReferralStatus::Registered
        );
        assert_eq!(
            referral(Some(Uuid::new_v4()), true).status(),
            ReferralStatus::Converted
        );
    }
}
