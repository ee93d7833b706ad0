// JWT service for the dual-token scheme
// Access and refresh tokens are signed with separate HS256 secrets. The
// refresh JWT is only a carrier for the jti; the database row decides
// validity, and rotation is settled by a conditional revoke so concurrent
// refreshes of the same token leave exactly one winner.

use chrono::{Duration, Utc};
use diesel_async::{AsyncPgConnection, AsyncConnection};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use uuid::Uuid;

use crate::app_config::JwtConfig;
use crate::models::auth::{AccessTokenClaims, RefreshTokenClaims};
use crate::models::refresh_token::{RefreshToken, RefreshTokenError, SessionInfo};
use crate::models::user::{User, UserError};

#[derive(thiserror::Error, Debug)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Refresh token is no longer valid")]
    InvalidRefreshToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<RefreshTokenError> for JwtError {
    fn from(e: RefreshTokenError) -> Self {
        match e {
            RefreshTokenError::Database(db) => JwtError::Database(db),
            RefreshTokenError::NotFound
            | RefreshTokenError::Expired
            | RefreshTokenError::Revoked => JwtError::InvalidRefreshToken,
        }
    }
}

impl From<UserError> for JwtError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::NotFound => JwtError::UserNotFound,
            UserError::Database(db) => JwtError::Database(db),
            _ => JwtError::InvalidToken,
        }
    }
}

/// Token pair returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// JWT service holding prepared keys for both token families
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_expiry: u64,
    refresh_expiry: u64,
    audience: String,
    issuer: String,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_expiry: config.access_expiry,
            refresh_expiry: config.refresh_expiry,
            audience: config.audience.clone(),
            issuer: config.issuer.clone(),
        }
    }

    fn now_epoch() -> u64 {
        Utc::now().timestamp().max(0) as u64
    }

    fn mint_access_token(&self, user: &User, role: &str) -> Result<String, JwtError> {
        let now = Self::now_epoch();
        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            jti: Uuid::new_v4().to_string(),
            cpf: user.cpf.clone(),
            name: user.name.clone(),
            role: role.to_string(),
            roles: user.roles.clone(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.access_expiry,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)?)
    }

    fn mint_refresh_token(&self, user_id: Uuid, role: &str, jti: &str) -> Result<String, JwtError> {
        let now = Self::now_epoch();
        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            jti: jti.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + self.refresh_expiry,
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)?)
    }

    /// Mint an access/refresh pair for a user and role, persisting the
    /// refresh token row.
    pub async fn generate_token_pair(
        &self,
        conn: &mut AsyncPgConnection,
        user: &User,
        role: &str,
        session: SessionInfo,
    ) -> Result<TokenPair, JwtError> {
        let jti = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::seconds(self.refresh_expiry as i64);

        RefreshToken::store(conn, user.id, &jti, role, expires_at, session).await?;

        Ok(TokenPair {
            access_token: self.mint_access_token(user, role)?,
            refresh_token: self.mint_refresh_token(user.id, role, &jti)?,
            expires_in: self.access_expiry,
        })
    }

    /// Validate an access token's signature, expiry, audience and issuer
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        decode::<AccessTokenClaims>(token, &self.access_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::InvalidToken,
            })
    }

    /// Validate a refresh token's signature and expiry; the row check is
    /// separate because rotation needs the jti either way.
    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, JwtError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<RefreshTokenClaims>(token, &self.refresh_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::InvalidToken,
            })
    }

    /// Rotate a refresh token: revoke the presented row (conditionally, so
    /// a replayed token loses) and mint a fresh pair in one transaction.
    pub async fn rotate_refresh_token(
        &self,
        conn: &mut AsyncPgConnection,
        refresh_token: &str,
        session: SessionInfo,
    ) -> Result<(TokenPair, User), JwtError> {
        let claims = self.decode_refresh_token(refresh_token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| JwtError::InvalidToken)?;

        // row-level sanity before entering the transaction
        RefreshToken::find_active(conn, &claims.jti).await?;

        let service = self.clone();
        let role = claims.role.clone();
        let jti = claims.jti.clone();

        let (pair, user) = conn
            .transaction::<_, JwtError, _>(|tx| {
                Box::pin(async move {
                    let won = RefreshToken::revoke_if_active(tx, &jti, "rotated").await?;
                    if !won {
                        return Err(JwtError::InvalidRefreshToken);
                    }

                    let user = User::find_by_id(tx, user_id).await?;
                    let pair = service
                        .generate_token_pair(tx, &user, &role, session)
                        .await?;

                    Ok((pair, user))
                })
            })
            .await?;

        Ok((pair, user))
    }

    /// Revoke the row behind a presented refresh token (logout)
    pub async fn revoke_refresh_token(
        &self,
        conn: &mut AsyncPgConnection,
        refresh_token: &str,
        reason: &str,
    ) -> Result<bool, JwtError> {
        let claims = self.decode_refresh_token(refresh_token)?;
        Ok(RefreshToken::revoke_if_active(conn, &claims.jti, reason).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_service() -> JwtService {
        JwtService::new(&JwtConfig {
            access_secret: "test-access-secret-at-least-32-chars".to_string(),
            refresh_secret: "test-refresh-secret-at-least-32-chars".to_string(),
            access_expiry: 900,
            refresh_expiry: 604_800,
            audience: "convenio.app".to_string(),
            issuer: "convenio.app".to_string(),
        })
    }

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            cpf: "52998224725".to_string(),
            password_hash: "hash".to_string(),
            name: "Maria Silva".to_string(),
            email: None,
            phone: None,
            roles: vec!["client".to_string(), "professional".to_string()],
            subscription_status: "pending".to_string(),
            subscription_expiry: None::<NaiveDate>,
            subscription_active: false,
            referred_by_affiliate_id: None,
            affiliate_referral_id: None,
            professional_share_percent: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_token_roundtrip() {
        let service = test_service();
        let user = test_user();

        let token = service.mint_access_token(&user, "professional").unwrap();
        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "professional");
        assert_eq!(claims.roles, user.roles);
        assert_eq!(claims.cpf, user.cpf);
    }

    #[test]
    fn test_refresh_token_roundtrip() {
        let service = test_service();
        let user_id = Uuid::new_v4();
        let jti = Uuid::new_v4().to_string();

        let token = service.mint_refresh_token(user_id, "client", &jti).unwrap();
        let claims = service.decode_refresh_token(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.jti, jti);
        assert_eq!(claims.role, "client");
    }

    #[test]
    fn test_token_families_are_not_interchangeable() {
        let service = test_service();
        let user = test_user();

        let access = service.mint_access_token(&user, "client").unwrap();
        assert!(service.decode_refresh_token(&access).is_err());

        let refresh = service
            .mint_refresh_token(user.id, "client", "jti-1")
            .unwrap();
        assert!(service.validate_access_token(&refresh).is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let service = test_service();
        let user = test_user();

        let mut token = service.mint_access_token(&user, "client").unwrap();
        token.push('x');
        assert!(matches!(
            service.validate_access_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }
}
