//! # rf-api-http
//!
//! reqwest implementation of the backend ports. Every request carries the
//! vault's bearer token when one is held; any 401 clears the persisted
//! session before the error surfaces, so no caller can keep using a dead
//! token.

pub mod parse;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use rf_core::{
    AppError, AuthApi, AuthSession, Comment, CommentPatch, Credentials, Id, LoginEnvelope,
    MediaApi, NewComment, NewPost, Post, PostApi, PostPatch, RegisterPayload, Result, SessionVault,
    StoredFile, User, UserApi, UserPatch, TOKEN_KEY, USER_KEY,
};

/// Endpoint layout. Paths can be overridden per deployment through the
/// environment; the base url has no default and must be provided.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_path: String,
    pub auth_me_path: String,
    pub register_path: String,
    pub users_path: String,
    pub posts_path: String,
    pub comments_path: String,
    pub uploads_path: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_path: "/auth".to_string(),
            auth_me_path: "/auth_me".to_string(),
            register_path: "/register".to_string(),
            users_path: "/users".to_string(),
            posts_path: "/posts".to_string(),
            comments_path: "/comments".to_string(),
            uploads_path: "/uploads".to_string(),
        }
    }

    /// Reads the layout from the environment. `FEED_API_BASE_URL` is
    /// required; the `FEED_*_PATH` variables override individual paths.
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("FEED_API_BASE_URL")
            .map_err(|_| anyhow::anyhow!("FEED_API_BASE_URL is not set; put it into .env"))?;
        let mut config = Self::new(base_url);
        for (var, slot) in [
            ("FEED_AUTH_PATH", &mut config.auth_path),
            ("FEED_AUTH_ME_PATH", &mut config.auth_me_path),
            ("FEED_REGISTER_PATH", &mut config.register_path),
            ("FEED_USERS_PATH", &mut config.users_path),
            ("FEED_POSTS_PATH", &mut config.posts_path),
            ("FEED_COMMENTS_PATH", &mut config.comments_path),
            ("FEED_UPLOADS_PATH", &mut config.uploads_path),
        ] {
            if let Ok(value) = std::env::var(var) {
                *slot = value;
            }
        }
        Ok(config)
    }
}

/// One client implementing all four API ports against a REST backend.
pub struct HttpBackend {
    client: reqwest::Client,
    config: ApiConfig,
    vault: Arc<dyn SessionVault>,
}

impl HttpBackend {
    pub fn new(config: ApiConfig, vault: Arc<dyn SessionVault>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            vault,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.vault.get(TOKEN_KEY) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request and maps non-success statuses onto the error
    /// taxonomy. A 401 clears both vault keys first.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|err| AppError::Internal(format!("request failed: {err}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = Self::error_message(response).await;
        if status == StatusCode::UNAUTHORIZED {
            self.vault.remove(TOKEN_KEY);
            self.vault.remove(USER_KEY);
            return Err(AppError::Unauthorized(message));
        }
        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                AppError::Validation(message)
            }
            _ => AppError::Internal(message),
        })
    }

    /// Prefers the backend's JSON `message` field, falls back to the raw
    /// body, then to the status line.
    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    status.to_string()
                } else {
                    trimmed.chars().take(200).collect()
                }
            })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|err| AppError::Internal(format!("malformed response body: {err}")))
    }
}

#[async_trait]
impl AuthApi for HttpBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginEnvelope> {
        let response = self
            .send(self.client.post(self.url(&self.config.auth_path)).json(credentials))
            .await?;
        let body: Value = Self::decode(response).await?;
        let token = parse::extract_token(&body).ok_or_else(|| {
            AppError::Validation("login response carried no token".to_string())
        })?;
        Ok(LoginEnvelope {
            token,
            user: parse::extract_identity(&body),
        })
    }

    async fn register(&self, payload: &RegisterPayload) -> Result<AuthSession> {
        let response = self
            .send(
                self.client
                    .post(self.url(&self.config.register_path))
                    .json(payload),
            )
            .await?;
        let body: Value = Self::decode(response).await?;
        let token = parse::extract_token(&body).ok_or_else(|| {
            AppError::Validation("registration response carried no token".to_string())
        })?;
        let user = parse::extract_identity(&body).ok_or_else(|| {
            AppError::Validation("registration response carried no user".to_string())
        })?;
        Ok(AuthSession { token, user })
    }

    async fn fetch_me(&self) -> Result<Option<User>> {
        let response = self
            .send(self.authorized(self.client.get(self.url(&self.config.auth_me_path))))
            .await?;
        let body: Value = Self::decode(response).await?;
        Ok(parse::extract_identity(&body))
    }
}

#[async_trait]
impl UserApi for HttpBackend {
    async fn list_users(&self) -> Result<Vec<User>> {
        let response = self
            .send(self.authorized(self.client.get(self.url(&self.config.users_path))))
            .await?;
        Self::decode(response).await
    }

    async fn update_user(&self, id: Id, patch: &UserPatch) -> Result<User> {
        let url = format!("{}/{id}", self.url(&self.config.users_path));
        let response = self.send(self.authorized(self.client.patch(url).json(patch))).await?;
        Self::decode(response).await
    }

    async fn delete_user(&self, id: Id) -> Result<()> {
        let url = format!("{}/{id}", self.url(&self.config.users_path));
        self.send(self.authorized(self.client.delete(url))).await?;
        Ok(())
    }

    async fn get_user_avatar(&self, id: Id) -> Result<Option<String>> {
        let url = format!("{}/{id}/avatar", self.url(&self.config.users_path));
        let response = self.send(self.authorized(self.client.get(url))).await?;
        let body: Value = Self::decode(response).await?;
        Ok(body
            .get("avatarUrl")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string))
    }
}

#[async_trait]
impl PostApi for HttpBackend {
    async fn list_posts(&self) -> Result<Vec<Post>> {
        let response = self
            .send(self.authorized(self.client.get(self.url(&self.config.posts_path))))
            .await?;
        Self::decode(response).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let response = self
            .send(
                self.authorized(self.client.post(self.url(&self.config.posts_path)).json(post)),
            )
            .await?;
        Self::decode(response).await
    }

    async fn update_post(&self, id: Id, patch: &PostPatch) -> Result<()> {
        let url = format!("{}/{id}", self.url(&self.config.posts_path));
        self.send(self.authorized(self.client.patch(url).json(patch)))
            .await?;
        Ok(())
    }

    async fn delete_post(&self, id: Id) -> Result<()> {
        let url = format!("{}/{id}", self.url(&self.config.posts_path));
        self.send(self.authorized(self.client.delete(url))).await?;
        Ok(())
    }

    async fn list_comments(&self, post_id: Id) -> Result<Vec<Comment>> {
        let response = self
            .send(
                self.authorized(
                    self.client
                        .get(self.url(&self.config.comments_path))
                        .query(&[("post_id", post_id)]),
                ),
            )
            .await?;
        Self::decode(response).await
    }

    async fn create_comment(&self, comment: &NewComment) -> Result<Comment> {
        let response = self
            .send(
                self.authorized(
                    self.client
                        .post(self.url(&self.config.comments_path))
                        .json(comment),
                ),
            )
            .await?;
        Self::decode(response).await
    }

    async fn update_comment(&self, id: Id, patch: &CommentPatch) -> Result<()> {
        let url = format!("{}/{id}", self.url(&self.config.comments_path));
        self.send(self.authorized(self.client.patch(url).json(patch)))
            .await?;
        Ok(())
    }

    async fn delete_comment(&self, id: Id) -> Result<()> {
        let url = format!("{}/{id}", self.url(&self.config.comments_path));
        self.send(self.authorized(self.client.delete(url))).await?;
        Ok(())
    }
}

#[async_trait]
impl MediaApi for HttpBackend {
    async fn upload(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredFile> {
        let part = multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .map_err(|err| AppError::Validation(format!("invalid content type: {err}")))?;
        let form = multipart::Form::new().part("file", part);
        let response = self
            .send(
                self.authorized(
                    self.client
                        .post(self.url(&self.config.uploads_path))
                        .multipart(form),
                ),
            )
            .await?;
        let body: Value = Self::decode(response).await?;
        parse::extract_stored_file(&body).ok_or_else(|| {
            AppError::Validation("upload response carried no file url".to_string())
        })
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<StoredFile>> {
        let response = self
            .send(
                self.authorized(
                    self.client
                        .get(self.url(&self.config.uploads_path))
                        .query(&[("url", url)]),
                ),
            )
            .await?;
        let body: Value = Self::decode(response).await?;
        Ok(parse::extract_stored_file(&body))
    }

    async fn delete(&self, file_id: &str) -> Result<()> {
        let url = format!("{}/{file_id}", self.url(&self.config.uploads_path));
        self.send(self.authorized(self.client.delete(url))).await?;
        Ok(())
    }
}
