// Refresh token database model
// Tokens are presented as JWTs but the row is authoritative: only a salted
// SHA-256 of the jti is stored, and rotation is decided by a conditional
// UPDATE so two concurrent refreshes leave exactly one winner.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::schema::refresh_tokens;

/// Request metadata recorded alongside a session
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Refresh token database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = refresh_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub jti_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// New refresh token for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub jti_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Errors for refresh token operations
#[derive(thiserror::Error, Debug)]
pub enum RefreshTokenError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Token not found")]
    NotFound,

    #[error("Token expired")]
    Expired,

    #[error("Token revoked")]
    Revoked,
}

impl RefreshToken {
    /// Salt for JTI hashing; configured via JTI_HASH_SALT.
    /// Changing the salt invalidates all outstanding refresh tokens.
    fn jti_hash_salt() -> Vec<u8> {
        match &crate::app_config::config().jti_hash_salt {
            Some(salt) => salt.as_bytes().to_vec(),
            None => {
                if crate::app_config::config().is_production() {
                    panic!("JTI_HASH_SALT must be configured in production");
                }
                b"dev-only-jti-salt".to_vec()
            },
        }
    }

    /// Salted SHA-256 of a JTI for at-rest storage
    pub fn hash_jti(jti: &str) -> String {
        Self::hash_jti_with_salt(jti, &Self::jti_hash_salt())
    }

    pub fn hash_jti_with_salt(jti: &str, salt: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(jti.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Constant-time comparison of two stored hashes
    pub fn hashes_match(a: &str, b: &str) -> bool {
        a.as_bytes().ct_eq(b.as_bytes()).into()
    }

    /// Store a new refresh token row
    pub async fn store(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        jti: &str,
        role_val: &str,
        expires_at_val: DateTime<Utc>,
        session: SessionInfo,
    ) -> Result<Self, RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        let now = Utc::now();
        let new_token = NewRefreshToken {
            user_id: user_id_val,
            jti_hash: Self::hash_jti(jti),
            role: role_val.to_string(),
            created_at: now,
            expires_at: expires_at_val,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
        };

        diesel::insert_into(refresh_tokens)
            .values(&new_token)
            .get_result::<RefreshToken>(conn)
            .await
            .map_err(RefreshTokenError::Database)
    }

    /// Look up the row for a presented token's jti, verifying the stored
    /// hash in constant time, and check revocation/expiry.
    pub async fn find_active(
        conn: &mut AsyncPgConnection,
        jti: &str,
    ) -> Result<Self, RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        let jti_hash_val = Self::hash_jti(jti);
        let now = Utc::now();

        let token = refresh_tokens
            .filter(jti_hash.eq(&jti_hash_val))
            .first::<RefreshToken>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => RefreshTokenError::NotFound,
                _ => RefreshTokenError::Database(e),
            })?;

        if !Self::hashes_match(&token.jti_hash, &jti_hash_val) {
            return Err(RefreshTokenError::NotFound);
        }
        if token.revoked_at.is_some() {
            return Err(RefreshTokenError::Revoked);
        }
        if token.expires_at <= now {
            return Err(RefreshTokenError::Expired);
        }

        Ok(token)
    }

    /// Revoke the row for a jti only if it is still unrevoked.
    /// The affected-row count decides the winner under concurrent rotation.
    pub async fn revoke_if_active(
        conn: &mut AsyncPgConnection,
        jti: &str,
        reason: &str,
    ) -> Result<bool, RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        let jti_hash_val = Self::hash_jti(jti);
        let now = Utc::now();

        let updated = diesel::update(
            refresh_tokens
                .filter(jti_hash.eq(jti_hash_val))
                .filter(revoked_at.is_null()),
        )
        .set((
            revoked_at.eq(Some(now)),
            revoked_reason.eq(Some(reason)),
            updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

        Ok(updated > 0)
    }

    /// Revoke all outstanding refresh tokens for a user (logout, role switch)
    pub async fn revoke_all_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        reason: &str,
    ) -> Result<usize, RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        let now = Utc::now();

        let updated = diesel::update(
            refresh_tokens
                .filter(user_id.eq(user_id_val))
                .filter(revoked_at.is_null())
                .filter(expires_at.gt(now)),
        )
        .set((
            revoked_at.eq(Some(now)),
            revoked_reason.eq(Some(reason)),
            updated_at.eq(now),
        ))
        .execute(conn)
        .await?;

        Ok(updated)
    }

    /// Delete expired or revoked rows; run by the daily sweep
    pub async fn cleanup_expired(conn: &mut AsyncPgConnection) -> Result<usize, RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        let now = Utc::now();

        let deleted = diesel::delete(
            refresh_tokens
                .filter(expires_at.le(now))
                .or_filter(revoked_at.is_not_null()),
        )
        .execute(conn)
        .await?;

        Ok(deleted)
    }

    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none() && self.expires_at > Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_jti_hashing_deterministic() {
        let salt = b"test-salt";
        let h1 = RefreshToken::hash_jti_with_salt("jti-1", salt);
        let h2 = RefreshToken::hash_jti_with_salt("jti-2", salt);
        assert_ne!(h1, h2);
        assert_eq!(h1, RefreshToken::hash_jti_with_salt("jti-1", salt));
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_salt_changes_hash() {
        let h1 = RefreshToken::hash_jti_with_salt("jti-1", b"salt-a");
        let h2 = RefreshToken::hash_jti_with_salt("jti-1", b"salt-b");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_constant_time_match() {
        let h = RefreshToken::hash_jti_with_salt("jti-1", b"salt");
        assert!(RefreshToken::hashes_match(&h, &h.clone()));
        let other = RefreshToken::hash_jti_with_salt("jti-2", b"salt");
        assert!(!RefreshToken::hashes_match(&h, &other));
    }

    #[test]
    fn test_token_state_checks() {
        let now = Utc::now();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            jti_hash: "hash".to_string(),
            role: "client".to_string(),
            created_at: now - Duration::hours(1),
            expires_at: now + Duration::hours(1),
            revoked_at: None,
            revoked_reason: None,
            ip_address: None,
            user_agent: None,
            updated_at: now,
        };
        assert!(token.is_active());

        let revoked = RefreshToken {
            revoked_at: Some(now),
            ..token.clone()
        };
        assert!(!revoked.is_active());

        let expired = RefreshToken {
            expires_at: now - Duration::minutes(1),
            ..token
        };
        assert!(!expired.is_active());
    }
}
