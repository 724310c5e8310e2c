//! Account and profile models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::request::{FormPart, Upload};
use crate::auth::tokens::CredentialPair;

/// Profile of a forum member as returned by `/auth/profile/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub posts_count: u32,
    #[serde(default)]
    pub comments_count: u32,
    #[serde(default)]
    pub karma_points: i64,
    #[serde(default)]
    pub karma_level: i64,
}

impl User {
    /// Full name when set, otherwise the username
    pub fn display_name(&self) -> String {
        if let Some(ref full) = self.full_name {
            if !full.trim().is_empty() {
                return full.trim().to_string();
            }
        }
        let name = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        )
        .trim()
        .to_string();
        if name.is_empty() {
            self.username.clone()
        } else {
            name
        }
    }
}

/// Response of login and registration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: CredentialPair,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Partial profile update; unset fields are left alone by the server.
/// An avatar forces a multipart body, otherwise the update goes as JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip)]
    pub avatar: Option<Upload>,
}

impl ProfileUpdate {
    /// Set fields as form parts, the avatar last
    pub fn form_parts(&self) -> Vec<FormPart> {
        let mut parts: Vec<FormPart> = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("bio", &self.bio),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| FormPart::text(name, v.clone())))
        .collect();
        if let Some(ref avatar) = self.avatar {
            parts.push(FormPart::file("avatar", avatar.clone()));
        }
        parts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}
