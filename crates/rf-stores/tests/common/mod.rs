//! Shared fixtures: a stateful fake backend implementing all four API
//! ports, plus model builders. Failure injection flags let scenarios break
//! individual sub-steps.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rf_core::{
    AppError, AuthApi, AuthSession, Comment, CommentPatch, Credentials, Id, LoginEnvelope,
    MediaApi, NewComment, NewPost, Post, PostApi, PostPatch, RegisterPayload, Result,
    SessionVault, StoredFile, User, UserApi, UserPatch, UserRole, TOKEN_KEY, USER_KEY,
};
use rf_stores::SessionStore;
use rf_vault_file::MemoryVault;

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn user(id: Id, name: &str) -> User {
    User {
        id,
        email: format!("{}@example.com", name.to_lowercase()),
        name: name.to_string(),
        role: UserRole::User,
        is_blocked: false,
        created_at: Some(ts(0)),
        avatar_url: None,
        avatar_name: None,
        is_deleted: false,
        deleted_at: None,
    }
}

pub fn post(id: Id, author: &User, secs: i64) -> Post {
    Post {
        id,
        author_id: author.id,
        author_name: author.name.clone(),
        author_avatar_url: author.avatar_url.clone(),
        description: format!("post {id}"),
        image_url: None,
        image_name: None,
        created_at: ts(secs),
        comments_count: None,
    }
}

pub fn comment(id: Id, post_id: Id, author: &User, secs: i64) -> Comment {
    Comment {
        id,
        post_id,
        author_id: author.id,
        author_name: author.name.clone(),
        author_avatar_url: author.avatar_url.clone(),
        text: format!("comment {id}"),
        created_at: ts(secs),
    }
}

/// Vault pre-seeded with a persisted session, as a browser would hold one.
pub fn authed_vault(user: &User, token: &str) -> Arc<MemoryVault> {
    Arc::new(MemoryVault::preloaded(&[
        (TOKEN_KEY, token),
        (USER_KEY, &serde_json::to_string(user).unwrap()),
    ]))
}

pub fn session_with(
    backend: &Arc<FakeBackend>,
    vault: Arc<dyn SessionVault>,
) -> Arc<SessionStore> {
    SessionStore::new(
        Arc::clone(backend) as Arc<dyn AuthApi>,
        Arc::clone(backend) as Arc<dyn UserApi>,
        Arc::clone(backend) as Arc<dyn MediaApi>,
        vault,
    )
}

#[derive(Default)]
pub struct FakeState {
    pub users: Vec<User>,
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,
    pub uploads: Vec<StoredFile>,
    pub login_envelope: Option<LoginEnvelope>,
    pub me: Option<User>,
    pub me_unauthorized: bool,
    pub fail_list_users: bool,
    pub fail_list_posts: bool,
    pub fail_list_comments: bool,
    pub fail_comment_deletes: HashSet<Id>,
    pub fail_post_deletes: HashSet<Id>,
    pub fail_post_patches: HashSet<Id>,
    pub fail_comment_patches: HashSet<Id>,
    pub fail_user_deletes: bool,
    pub fail_file_deletes: bool,
    pub next_id: Id,
    /// Call log, one compact entry per backend hit.
    pub calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn alloc_id(state: &mut FakeState) -> Id {
        state.next_id += 1;
        state.next_id + 1000
    }
}

#[async_trait]
impl AuthApi for FakeBackend {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginEnvelope> {
        let mut state = self.state();
        state.calls.push("login".to_string());
        state
            .login_envelope
            .clone()
            .ok_or_else(|| AppError::Unauthorized("bad credentials".to_string()))
    }

    async fn register(&self, payload: &RegisterPayload) -> Result<AuthSession> {
        let mut state = self.state();
        state.calls.push("register".to_string());
        let id = Self::alloc_id(&mut state);
        let user = User {
            id,
            email: payload.email.clone(),
            name: payload.name.clone(),
            role: payload.role,
            is_blocked: payload.is_blocked,
            created_at: Some(payload.created_at),
            avatar_url: None,
            avatar_name: None,
            is_deleted: false,
            deleted_at: None,
        };
        state.users.push(user.clone());
        Ok(AuthSession {
            token: format!("token-{id}"),
            user,
        })
    }

    async fn fetch_me(&self) -> Result<Option<User>> {
        let mut state = self.state();
        state.calls.push("fetch_me".to_string());
        if state.me_unauthorized {
            return Err(AppError::Unauthorized("token expired".to_string()));
        }
        Ok(state.me.clone())
    }
}

#[async_trait]
impl UserApi for FakeBackend {
    async fn list_users(&self) -> Result<Vec<User>> {
        let mut state = self.state();
        state.calls.push("list_users".to_string());
        if state.fail_list_users {
            return Err(AppError::Internal("user list refused".to_string()));
        }
        Ok(state.users.clone())
    }

    async fn update_user(&self, id: Id, patch: &UserPatch) -> Result<User> {
        let mut state = self.state();
        state.calls.push(format!("update_user {id}"));
        let user = state
            .users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;
        if let Some(name) = &patch.name {
            user.name = name.clone();
        }
        if let Some(avatar_url) = &patch.avatar_url {
            user.avatar_url = avatar_url.clone();
        }
        if let Some(avatar_name) = &patch.avatar_name {
            user.avatar_name = avatar_name.clone();
        }
        if let Some(role) = patch.role {
            user.role = role;
        }
        if let Some(blocked) = patch.is_blocked {
            user.is_blocked = blocked;
        }
        if let Some(deleted) = patch.is_deleted {
            user.is_deleted = deleted;
        }
        if let Some(deleted_at) = patch.deleted_at {
            user.deleted_at = deleted_at;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Id) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_user {id}"));
        if state.fail_user_deletes {
            return Err(AppError::Internal("user delete refused".to_string()));
        }
        state.users.retain(|user| user.id != id);
        Ok(())
    }

    async fn get_user_avatar(&self, id: Id) -> Result<Option<String>> {
        let mut state = self.state();
        state.calls.push(format!("get_user_avatar {id}"));
        let user = state
            .users
            .iter()
            .find(|user| user.id == id)
            .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;
        Ok(user.avatar_url.clone())
    }
}

#[async_trait]
impl PostApi for FakeBackend {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        let mut state = self.state();
        state.calls.push("list_posts".to_string());
        if state.fail_list_posts {
            return Err(AppError::Internal("post list refused".to_string()));
        }
        Ok(state.posts.clone())
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let mut state = self.state();
        state.calls.push("create_post".to_string());
        let id = Self::alloc_id(&mut state);
        let created = Post {
            id,
            author_id: post.author_id,
            author_name: post.author_name.clone(),
            author_avatar_url: post.author_avatar_url.clone(),
            description: post.description.clone(),
            image_url: post.image_url.clone(),
            image_name: post.image_name.clone(),
            created_at: post.created_at,
            comments_count: None,
        };
        state.posts.push(created.clone());
        Ok(created)
    }

    async fn update_post(&self, id: Id, _patch: &PostPatch) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("update_post {id}"));
        if state.fail_post_patches.contains(&id) {
            return Err(AppError::Internal("post patch refused".to_string()));
        }
        Ok(())
    }

    async fn delete_post(&self, id: Id) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_post {id}"));
        if state.fail_post_deletes.contains(&id) {
            return Err(AppError::Internal("post delete refused".to_string()));
        }
        state.posts.retain(|post| post.id != id);
        Ok(())
    }

    async fn list_comments(&self, post_id: Id) -> Result<Vec<Comment>> {
        let mut state = self.state();
        state.calls.push(format!("list_comments {post_id}"));
        if state.fail_list_comments {
            return Err(AppError::Internal("comment list refused".to_string()));
        }
        Ok(state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn create_comment(&self, comment: &NewComment) -> Result<Comment> {
        let mut state = self.state();
        state.calls.push("create_comment".to_string());
        let id = Self::alloc_id(&mut state);
        let created = Comment {
            id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            author_name: comment.author_name.clone(),
            author_avatar_url: comment.author_avatar_url.clone(),
            text: comment.text.clone(),
            created_at: comment.created_at,
        };
        state.comments.push(created.clone());
        Ok(created)
    }

    async fn update_comment(&self, id: Id, _patch: &CommentPatch) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("update_comment {id}"));
        if state.fail_comment_patches.contains(&id) {
            return Err(AppError::Internal("comment patch refused".to_string()));
        }
        Ok(())
    }

    async fn delete_comment(&self, id: Id) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_comment {id}"));
        if state.fail_comment_deletes.contains(&id) {
            return Err(AppError::Internal("comment delete refused".to_string()));
        }
        state.comments.retain(|comment| comment.id != id);
        Ok(())
    }
}

#[async_trait]
impl MediaApi for FakeBackend {
    async fn upload(
        &self,
        _data: Vec<u8>,
        file_name: &str,
        _content_type: &str,
    ) -> Result<StoredFile> {
        let mut state = self.state();
        state.calls.push(format!("upload {file_name}"));
        let id = Self::alloc_id(&mut state);
        let stored = StoredFile {
            url: format!("http://files/{file_name}"),
            name: file_name.to_string(),
            id: Some(id.to_string()),
        };
        state.uploads.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<StoredFile>> {
        let mut state = self.state();
        state.calls.push(format!("find_by_url {url}"));
        Ok(state
            .uploads
            .iter()
            .find(|stored| stored.url == url)
            .cloned())
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_file {file_id}"));
        if state.fail_file_deletes {
            return Err(AppError::Internal("file delete refused".to_string()));
        }
        state
            .uploads
            .retain(|stored| stored.id.as_deref() != Some(file_id));
        Ok(())
    }
}
