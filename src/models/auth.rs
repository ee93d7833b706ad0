// JWT claims structures for the dual-token scheme
// The access token carries the session's current role; authorization
// decisions read it from here, never from client-cached state.

use serde::{Deserialize, Serialize};

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,

    /// JWT ID (UUID format)
    pub jti: String,

    /// User CPF (11 digits)
    pub cpf: String,

    /// Display name
    pub name: String,

    /// Role this session was minted for
    pub role: String,

    /// All roles the user holds
    pub roles: Vec<String>,

    /// Audience
    pub aud: String,

    /// Issuer
    pub iss: String,

    /// Issued at (Unix epoch seconds)
    pub iat: u64,

    /// Expires at (Unix epoch seconds)
    pub exp: u64,
}

/// Refresh token claims - minimal, the database row is authoritative
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefreshTokenClaims {
    /// User ID (subject)
    pub sub: String,

    /// JWT ID (UUID format), hashed at rest
    pub jti: String,

    /// Role the session was minted for; re-embedded on rotation
    pub role: String,

    /// Issued at (Unix epoch seconds)
    pub iat: u64,

    /// Expires at (Unix epoch seconds)
    pub exp: u64,
}

impl AccessTokenClaims {
    pub fn is_expired(&self) -> bool {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.exp < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_access_claims_roundtrip() {
        let claims = AccessTokenClaims {
            sub: Uuid::new_v4().to_string(),
            jti: Uuid::new_v4().to_string(),
            cpf: "52998224725".to_string(),
            name: "Maria Silva".to_string(),
            role: "professional".to_string(),
            roles: vec!["client".to_string(), "professional".to_string()],
            aud: "convenio.app".to_string(),
            iss: "convenio.app".to_string(),
            iat: 1_700_000_000,
            exp: 1_700_000_900,
        };

        let json = serde_json::to_string(&claims).expect("serialize");
        let back: AccessTokenClaims = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(claims, back);
        assert!(back.roles.contains(&back.role));
    }

    #[test]
    fn test_expiry_check() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let mut claims = AccessTokenClaims {
            sub: "u".into(),
            jti: "j".into(),
            cpf: "52998224725".into(),
            name: "n".into(),
            role: "client".into(),
            roles: vec!["client".into()],
            aud: "a".into(),
            iss: "i".into(),
            iat: now - 3600,
            exp: now - 1,
        };
        assert!(claims.is_expired());

        claims.exp = now + 900;
        assert!(!claims.is_expired());
    }
}
