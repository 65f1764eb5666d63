use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Application role: `app_metadata.role` wins over the top-level claim,
    /// which Supabase fills with `authenticated`.
    pub fn application_role(&self) -> Option<String> {
        self.app_metadata
            .as_ref()
            .and_then(|meta| meta.get("role"))
            .and_then(|role| role.as_str())
            .map(str::to_string)
            .or_else(|| self.role.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
    Nurse,
    Triage,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Doctor => write!(f, "doctor"),
            Role::Patient => write!(f, "patient"),
            Role::Nurse => write!(f, "nurse"),
            Role::Triage => write!(f, "triage"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            "nurse" => Ok(Role::Nurse),
            "triage" => Ok(Role::Triage),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Per-request identity, built by the auth middleware and handed to handlers
/// through request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    pub role: Role,
    pub access_token: String,
}

impl RequestContext {
    pub fn new(user: User, access_token: impl Into<String>) -> Result<Self, AppError> {
        let role = user
            .role
            .as_deref()
            .ok_or_else(|| AppError::Auth("Token carries no application role".to_string()))?
            .parse::<Role>()
            .map_err(AppError::Auth)?;

        Ok(Self {
            user,
            role,
            access_token: access_token.into(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn token(&self) -> &str {
        &self.access_token
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }

    /// True when the caller is the given profile (profile ids equal auth user ids).
    pub fn is_self(&self, profile_id: &uuid::Uuid) -> bool {
        self.user.id == profile_id.to_string()
    }

    pub fn require_any(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role '{}' is not allowed to perform this action",
                self.role
            )))
        }
    }
}
