// Affiliate attribution pipeline
// click -> registration -> conversion, first touch wins at every step.
// The referral code in ?ref= is the affiliate's user id rendered as a
// string; a conversion may land months after the click.

use diesel_async::{AsyncConnection, AsyncPgConnection};
use serde::Serialize;
use uuid::Uuid;

use crate::models::affiliate_referral::{
    AffiliateReferral, AffiliateReferralError, NewAffiliateReferral, ReferralStatus,
};
use crate::models::user::{Role, User, UserError};

#[derive(thiserror::Error, Debug)]
pub enum AffiliateError {
    #[error("Invalid referral code")]
    InvalidReferralCode,

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<AffiliateReferralError> for AffiliateError {
    fn from(e: AffiliateReferralError) -> Self {
        match e {
            AffiliateReferralError::Database(db) => AffiliateError::Database(db),
            AffiliateReferralError::NotFound => AffiliateError::InvalidReferralCode,
        }
    }
}

impl From<UserError> for AffiliateError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::Database(db) => AffiliateError::Database(db),
            _ => AffiliateError::InvalidReferralCode,
        }
    }
}

/// Click metadata captured from the landing request
#[derive(Debug, Clone, Default)]
pub struct ClickMetadata {
    pub user_agent: Option<String>,
    pub referrer_url: Option<String>,
    pub landing_page: Option<String>,
}

/// One referral row with its derived status, for affiliate reporting
#[derive(Debug, Clone, Serialize)]
pub struct ReferralReportRow {
    pub id: Uuid,
    pub visitor_identifier: String,
    pub status: ReferralStatus,
    pub converted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralReport {
    pub referrals: Vec<ReferralReportRow>,
    pub total_clicks: usize,
    pub total_registrations: usize,
    pub total_conversions: usize,
}

pub struct AffiliateService;

impl AffiliateService {
    /// Record a click for `?ref=<affiliate user id>`. First touch wins:
    /// an existing row for (affiliate, visitor) is left intact.
    pub async fn track_click(
        conn: &mut AsyncPgConnection,
        referral_code: &str,
        visitor_identifier: &str,
        metadata: ClickMetadata,
    ) -> Result<bool, AffiliateError> {
        let affiliate_id = Uuid::parse_str(referral_code.trim())
            .map_err(|_| AffiliateError::InvalidReferralCode)?;

        let affiliate = User::find_by_id(conn, affiliate_id).await?;
        if !affiliate.has_role(Role::Vendedor) {
            return Err(AffiliateError::InvalidReferralCode);
        }

        let inserted = AffiliateReferral::track_click(
            conn,
            NewAffiliateReferral {
                affiliate_id,
                visitor_identifier: visitor_identifier.to_string(),
                referral_code: referral_code.trim().to_string(),
                user_agent: metadata.user_agent,
                referrer_url: metadata.referrer_url,
                landing_page: metadata.landing_page,
            },
        )
        .await?;

        if inserted {
            tracing::info!(
                "Tracked referral click for affiliate {} (visitor {})",
                affiliate_id,
                visitor_identifier
            );
        }

        Ok(inserted)
    }

    /// Bind a freshly registered user to the visitor's pending referral.
    /// Both the referral row and the user row are updated conditionally so
    /// an already-attributed user is never overwritten.
    pub async fn link_user(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        visitor_identifier: &str,
    ) -> Result<bool, AffiliateError> {
        let Some(referral) =
            AffiliateReferral::find_unlinked_for_visitor(conn, visitor_identifier).await?
        else {
            return Ok(false);
        };

        let linked = conn
            .transaction::<_, AffiliateError, _>(|tx| {
                Box::pin(async move {
                    let linked = AffiliateReferral::link_user(tx, referral.id, user_id).await?;
                    if linked {
                        User::attribute_referral(tx, user_id, referral.affiliate_id, referral.id)
                            .await?;
                    }
                    Ok(linked)
                })
            })
            .await?;

        if linked {
            tracing::info!("Linked user {} to referral via visitor {}", user_id, visitor_identifier);
        }

        Ok(linked)
    }

    /// Mark the referral bound to this user as converted; replays no-op
    pub async fn mark_converted(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
    ) -> Result<bool, AffiliateError> {
        Ok(AffiliateReferral::mark_converted(conn, user_id).await?)
    }

    /// Referral report for one affiliate: rows with derived status plus
    /// aggregate counters.
    pub async fn referral_report(
        conn: &mut AsyncPgConnection,
        affiliate_id: Uuid,
    ) -> Result<ReferralReport, AffiliateError> {
        let rows = AffiliateReferral::list_for_affiliate(conn, affiliate_id).await?;

        let total_clicks = rows.len();
        let total_registrations = rows.iter().filter(|r| r.user_id.is_some()).count();
        let total_conversions = rows.iter().filter(|r| r.converted).count();

        let referrals = rows
            .into_iter()
            .map(|r| ReferralReportRow {
                id: r.id,
                visitor_identifier: r.visitor_identifier.clone(),
                status: r.status(),
                converted_at: r.converted_at,
                created_at: r.created_at,
            })
            .collect();

        Ok(ReferralReport {
            referrals,
            total_clicks,
            total_registrations,
            total_conversions,
        })
    }

    /// Whether the visitor identifier has already been tracked
    pub async fn visitor_tracked(
        conn: &mut AsyncPgConnection,
        visitor_identifier: &str,
    ) -> Result<bool, AffiliateError> {
        Ok(AffiliateReferral::exists_for_visitor(conn, visitor_identifier).await?)
    }
}
