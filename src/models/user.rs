// User database model
// Multi-role account: a user holds a set of roles; the role a session runs
// under lives in the access token, never in this row.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::users;

/// Roles a user may hold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Client,
    Professional,
    Admin,
    Vendedor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Professional => "professional",
            Role::Admin => "admin",
            Role::Vendedor => "vendedor",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "professional" => Ok(Role::Professional),
            "admin" => Ok(Role::Admin),
            "vendedor" => Ok(Role::Vendedor),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Subscription lifecycle of titulares and dependents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubscriptionStatus::Pending),
            "active" => Ok(SubscriptionStatus::Active),
            "expired" => Ok(SubscriptionStatus::Expired),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// User database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub cpf: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub roles: Vec<String>,
    pub subscription_status: String,
    pub subscription_expiry: Option<NaiveDate>,
    pub subscription_active: bool,
    pub referred_by_affiliate_id: Option<Uuid>,
    pub affiliate_referral_id: Option<Uuid>,
    pub professional_share_percent: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user for insertion (registration defaults to the client role)
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub cpf: String,
    pub password_hash: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub roles: Vec<String>,
    pub subscription_status: String,
}

/// Errors for user operations
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("Database error: {0}")]
    Database(diesel::result::Error),

    #[error("User not found")]
    NotFound,

    #[error("CPF already registered")]
    CpfTaken,

    #[error("Invalid user ID format")]
    InvalidId,
}

impl From<diesel::result::Error> for UserError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => UserError::NotFound,
            diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) => UserError::CpfTaken,
            _ => UserError::Database(e),
        }
    }
}

impl User {
    /// Find user by ID
    pub async fn find_by_id(conn: &mut AsyncPgConnection, user_id: Uuid) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(id.eq(user_id))
            .first::<User>(conn)
            .await
            .map_err(UserError::from)
    }

    /// Find user by CPF (digits only, exact match)
    pub async fn find_by_cpf(conn: &mut AsyncPgConnection, cpf_str: &str) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(cpf.eq(cpf_str))
            .first::<User>(conn)
            .await
            .map_err(UserError::from)
    }

    /// Create a new user; a duplicate CPF surfaces as `CpfTaken`
    pub async fn create(conn: &mut AsyncPgConnection, new_user: NewUser) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(&new_user)
            .get_result::<User>(conn)
            .await
            .map_err(UserError::from)
    }

    /// Activate the subscription unless it is already active and covering a
    /// future date. Locks the row so webhook replays and concurrent
    /// deliveries leave exactly one effective activation.
    /// Returns false when the row was already active.
    pub async fn activate_subscription(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        today: NaiveDate,
        new_expiry: NaiveDate,
    ) -> Result<bool, UserError> {
        use crate::schema::users::dsl::*;

        let user = users
            .filter(id.eq(user_id))
            .for_update()
            .first::<User>(conn)
            .await
            .map_err(UserError::from)?;

        if user.has_active_subscription(today) {
            return Ok(false);
        }

        diesel::update(users.filter(id.eq(user_id)))
            .set((
                subscription_status.eq(SubscriptionStatus::Active.as_str()),
                subscription_active.eq(true),
                subscription_expiry.eq(Some(new_expiry)),
                updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .await?;

        Ok(true)
    }

    /// Stamp affiliate attribution once; first touch wins.
    pub async fn attribute_referral(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        affiliate_id: Uuid,
        referral_id: Uuid,
    ) -> Result<bool, UserError> {
        use crate::schema::users::dsl::*;

        let updated = diesel::update(
            users
                .filter(id.eq(user_id))
                .filter(referred_by_affiliate_id.is_null()),
        )
        .set((
            referred_by_affiliate_id.eq(Some(affiliate_id)),
            affiliate_referral_id.eq(Some(referral_id)),
            updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    /// Expire every overdue active subscription; used by the daily sweep.
    pub async fn expire_overdue(
        conn: &mut AsyncPgConnection,
        today: NaiveDate,
    ) -> Result<usize, UserError> {
        use crate::schema::users::dsl::*;

        let updated = diesel::update(
            users
                .filter(subscription_status.eq(SubscriptionStatus::Active.as_str()))
                .filter(subscription_expiry.is_not_null())
                .filter(subscription_expiry.lt(today)),
        )
        .set((
            subscription_status.eq(SubscriptionStatus::Expired.as_str()),
            subscription_active.eq(false),
            updated_at.eq(Utc::now()),
        ))
        .execute(conn)
        .await?;

        Ok(updated)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }

    pub fn subscription_status_enum(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str(&self.subscription_status).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid subscription status '{}' for user {}, treating as pending: {}",
                self.subscription_status,
                self.id,
                e
            );
            SubscriptionStatus::Pending
        })
    }

    /// Active and covering today or later
    pub fn has_active_subscription(&self, today: NaiveDate) -> bool {
        self.subscription_status_enum() == SubscriptionStatus::Active
            && self.subscription_expiry.map(|d| d >= today).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(status: &str, expiry: Option<NaiveDate>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            cpf: "52998224725".to_string(),
            password_hash: "hash".to_string(),
            name: "Test".to_string(),
            email: None,
            phone: None,
            roles: vec!["client".to_string(), "vendedor".to_string()],
            subscription_status: status.to_string(),
            subscription_expiry: expiry,
            subscription_active: status == "active",
            referred_by_affiliate_id: None,
            affiliate_referral_id: None,
            professional_share_percent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_conversion() {
        assert_eq!(Role::Vendedor.as_str(), "vendedor");
        assert_eq!(Role::from_str("professional"), Ok(Role::Professional));
        assert!(Role::from_str("root").is_err());
    }

    #[test]
    fn test_has_role() {
        let user = sample_user("pending", None);
        assert!(user.has_role(Role::Client));
        assert!(user.has_role(Role::Vendedor));
        assert!(!user.has_role(Role::Admin));
    }

    #[test]
    fn test_has_active_subscription() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();

        let active = sample_user("active", Some(today + chrono::Days::new(10)));
        assert!(active.has_active_subscription(today));

        let overdue = sample_user("active", Some(today - chrono::Days::new(1)));
        assert!(!overdue.has_active_subscription(today));

        let pending = sample_user("pending", None);
        assert!(!pending.has_active_subscription(today));
    }
}
