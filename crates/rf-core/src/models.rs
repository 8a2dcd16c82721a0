//! # Domain Models
//!
//! These structs mirror the feed backend's resources. Field names follow the
//! backend's camelCase wire format; the backend issues numeric ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier assigned by the backend.
pub type Id = i64;

/// Role attached to an identity.
///
/// Deserialization is tolerant: incoming strings are trimmed and lowercased,
/// and anything unrecognized degrades to `User`, so a mangled backend row can
/// never grant elevated access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn can_moderate(self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Moderator)
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => UserRole::Admin,
            "moderator" => UserRole::Moderator,
            _ => UserRole::User,
        })
    }
}

/// An account as the backend stores it. Owned exclusively by the session
/// store when it is the authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Set and cleared together with `avatar_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_name: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A feed entry. Author name and avatar are denormalized snapshots taken at
/// authoring time and patched opportunistically afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id,
    pub author_id: Id,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Authoritative once known; absent until comments are first fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Id,
    /// The one field the backend stores in snake_case.
    #[serde(rename = "post_id")]
    pub post_id: Id,
    pub author_id: Id,
    pub author_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Login form contents.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Registration form contents. New accounts always start as unblocked
/// plain users; the backend echoes the account back with its id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

/// What the login endpoint yielded after shape normalization. The identity
/// may be absent; callers fetch it separately in that case.
#[derive(Debug, Clone)]
pub struct LoginEnvelope {
    pub token: String,
    pub user: Option<User>,
}

/// Token + identity pair as returned by registration.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
}

/// User-facing input for a new post; author fields are stamped by the feed
/// store from the current identity.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub description: String,
    pub image_url: Option<String>,
    pub image_name: Option<String>,
}

/// Wire payload for `POST /posts`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    pub author_id: Id,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Wire payload for `POST /comments`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    #[serde(rename = "post_id")]
    pub post_id: Id,
    pub text: String,
    pub author_id: Id,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial update for a user row. `None` leaves a field untouched;
/// `Some(None)` on the nested options serializes as an explicit `null`,
/// which is how a field is cleared.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_name: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

/// Self-service profile update: the only user fields the session store is
/// allowed to patch.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub avatar_url: Option<Option<String>>,
    pub avatar_name: Option<Option<String>>,
}

impl From<ProfileUpdate> for UserPatch {
    fn from(update: ProfileUpdate) -> Self {
        UserPatch {
            name: update.name,
            avatar_url: update.avatar_url,
            avatar_name: update.avatar_name,
            ..UserPatch::default()
        }
    }
}

/// Partial update for a post; today only the denormalized avatar snapshot
/// is ever rewritten.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
}

/// A stored-file record from the uploads endpoint, shape-normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub url: String,
    /// File name derived from the url, query and fragment stripped.
    pub name: String,
    /// Present when the backend exposes the record id needed for deletion.
    pub id: Option<String>,
}
