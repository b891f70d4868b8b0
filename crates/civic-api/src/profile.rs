//! User profile and login payloads

use serde::{Deserialize, Serialize};

/// The signed-in citizen as reported by `auth/profile/`.
///
/// Missing fields fall back to their defaults so that partially cached
/// records still restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub total_points: i64,
    pub is_verified: bool,
}

impl UserProfile {
    /// Overwrite the fields present in `update`.
    pub fn merge(&mut self, update: ProfileUpdate) {
        if let Some(id) = update.id {
            self.id = id;
        }
        if let Some(username) = update.username {
            self.username = username;
        }
        if let Some(email) = update.email {
            self.email = email;
        }
        if let Some(full_name) = update.full_name {
            self.full_name = full_name;
        }
        if let Some(total_points) = update.total_points {
            self.total_points = total_points;
        }
        if let Some(is_verified) = update.is_verified {
            self.is_verified = is_verified;
        }
    }
}

/// Partial profile, e.g. a new point total after a report is verified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_points: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
}

/// Carries the plaintext password; keep it out of `Debug` output.
#[derive(Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Email address or Aadhaar number
    pub identifier: &'a str,
    pub password: &'a str,
}

impl From<UserProfile> for ProfileUpdate {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: Some(profile.id),
            username: Some(profile.username),
            email: Some(profile.email),
            full_name: Some(profile.full_name),
            total_points: Some(profile.total_points),
            is_verified: Some(profile.is_verified),
        }
    }
}

/// Sign-up details, sent to `auth/register/` as multipart form fields.
///
/// Carries the plaintext password; keep it out of `Debug` output.
#[derive(Clone, Default)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    /// Twelve digits, optionally grouped with spaces
    pub aadhaar: String,
    pub phone: String,
    pub password: String,
    pub age: Option<u32>,
    /// `YYYY-MM-DD`
    pub date_of_birth: Option<String>,
    /// Scan of the Aadhaar card
    pub aadhaar_document: Option<Document>,
}

/// A file attached to a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Token and profile returned by login and registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}
