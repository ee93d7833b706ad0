// Authenticated session identity extracted from the access token

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The session identity handlers see. `role` is the role this session was
/// minted for; `roles` is everything the user holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub token_id: String,
    pub cpf: String,
    pub name: String,
    pub role: String,
    pub roles: Vec<String>,
}

impl AuthenticatedUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}
