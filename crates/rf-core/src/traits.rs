//! # Core Traits (Ports)
//!
//! Any backend or storage adapter must implement these traits to be used by
//! the stores. Response-shape tolerance (variant token keys, wrapped upload
//! bodies) is the adapter's job; the stores only see normalized types.

use crate::error::Result;
use crate::models::{
    AuthSession, Comment, CommentPatch, Credentials, Id, LoginEnvelope, NewComment, NewPost, Post,
    PostPatch, RegisterPayload, StoredFile, User, UserPatch,
};
use async_trait::async_trait;

/// Vault key holding the raw bearer token.
pub const TOKEN_KEY: &str = "token";
/// Vault key holding the JSON-serialized identity snapshot.
pub const USER_KEY: &str = "user";

/// Authentication endpoints.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginEnvelope>;
    async fn register(&self, payload: &RegisterPayload) -> Result<AuthSession>;

    /// Re-validates the held token. `Ok(None)` means the backend answered but
    /// returned no usable identity; `Err(Unauthorized)` means the token is
    /// dead and the session should be torn down.
    async fn fetch_me(&self) -> Result<Option<User>>;
}

/// Account directory endpoints.
#[async_trait]
pub trait UserApi: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn update_user(&self, id: Id, patch: &UserPatch) -> Result<User>;
    async fn delete_user(&self, id: Id) -> Result<()>;
    async fn get_user_avatar(&self, id: Id) -> Result<Option<String>>;
}

/// Post and comment endpoints.
#[async_trait]
pub trait PostApi: Send + Sync {
    async fn list_posts(&self) -> Result<Vec<Post>>;
    async fn create_post(&self, post: &NewPost) -> Result<Post>;
    async fn update_post(&self, id: Id, patch: &PostPatch) -> Result<()>;
    async fn delete_post(&self, id: Id) -> Result<()>;

    async fn list_comments(&self, post_id: Id) -> Result<Vec<Comment>>;
    async fn create_comment(&self, comment: &NewComment) -> Result<Comment>;
    async fn update_comment(&self, id: Id, patch: &CommentPatch) -> Result<()>;
    async fn delete_comment(&self, id: Id) -> Result<()>;
}

/// Stored-file endpoints (avatars, post images).
#[async_trait]
pub trait MediaApi: Send + Sync {
    /// Uploads raw bytes and returns the normalized stored-file record.
    async fn upload(&self, data: Vec<u8>, file_name: &str, content_type: &str)
        -> Result<StoredFile>;

    /// Locates a stored-file record by its public url, for id-based deletion.
    async fn find_by_url(&self, url: &str) -> Result<Option<StoredFile>>;

    async fn delete(&self, file_id: &str) -> Result<()>;
}

/// Durable key-value storage for the session (token + identity snapshot).
///
/// Reads and writes are synchronous: session restoration must produce a
/// first answer without touching the network or an executor.
pub trait SessionVault: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}
