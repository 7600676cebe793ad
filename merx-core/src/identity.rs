use serde::{Deserialize, Serialize};

/// Role assigned by the authentication collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Guest,
    Customer,
    Admin,
}

/// Authenticated (or anonymous) actor attached to a request.
///
/// The orchestration core does not issue sessions itself; it only consumes
/// the identity the auth collaborator verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
            email: None,
            role: Role::Guest,
        }
    }
}
