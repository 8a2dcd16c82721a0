//! # Session store
//!
//! Single source of truth for "who is signed in": the bearer token, the
//! identity snapshot, and the derived role flags. State lives behind a lock
//! and is only mutated inside `commit` closures, which notify subscribers as
//! one batch after the lock is released.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, Weak};

use rf_core::{
    AppError, AuthApi, Credentials, Id, MediaApi, ProfileUpdate, RegisterPayload, Result,
    SessionVault, StoredFile, User, UserApi, TOKEN_KEY, USER_KEY,
};

use crate::observer::{Subscribers, Subscription};
use crate::uploads::delete_stored_file_by_url;

/// Observable session fields, cloned out as one snapshot.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_loading: bool,
    /// True until `hydrate` has produced a first answer from the vault.
    pub initializing: bool,
    pub error: Option<String>,
}

pub struct SessionStore {
    auth: Arc<dyn AuthApi>,
    users: Arc<dyn UserApi>,
    media: Arc<dyn MediaApi>,
    vault: Arc<dyn SessionVault>,
    state: RwLock<SessionState>,
    subscribers: Subscribers,
    /// Handle to the owning `Arc`, for spawning the background refresh.
    self_ref: Weak<SessionStore>,
}

impl SessionStore {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        users: Arc<dyn UserApi>,
        media: Arc<dyn MediaApi>,
        vault: Arc<dyn SessionVault>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            auth,
            users,
            media,
            vault,
            state: RwLock::new(SessionState {
                initializing: true,
                ..SessionState::default()
            }),
            subscribers: Subscribers::new(),
            self_ref: self_ref.clone(),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies one mutation batch and notifies subscribers afterwards, with
    /// the lock already released.
    fn commit<R>(&self, mutate: impl FnOnce(&mut SessionState) -> R) -> R {
        let out = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            mutate(&mut state)
        };
        self.subscribers.notify();
        out
    }

    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.subscribers.unsubscribe(subscription);
    }

    pub fn snapshot(&self) -> SessionState {
        self.read().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn user_id(&self) -> Option<Id> {
        self.read().user.as_ref().map(|user| user.id)
    }

    /// The signed-in user's avatar url, empty strings treated as unset.
    pub fn avatar_url(&self) -> Option<String> {
        self.read()
            .user
            .as_ref()
            .and_then(|user| user.avatar_url.clone())
            .filter(|url| !url.is_empty())
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        let state = self.read();
        state.token.is_some() && state.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.read()
            .user
            .as_ref()
            .is_some_and(|user| user.role.is_admin())
    }

    pub fn can_moderate(&self) -> bool {
        self.read()
            .user
            .as_ref()
            .is_some_and(|user| user.role.can_moderate())
    }

    pub fn is_initializing(&self) -> bool {
        self.read().initializing
    }

    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().error.clone()
    }

    /// Restores the persisted session from the vault.
    ///
    /// The vault read and the `initializing` flip happen synchronously; a
    /// corrupt identity snapshot is discarded from the vault and treated as
    /// anonymous. When a token survived but the identity did not, a
    /// background re-fetch is spawned on the current runtime (or skipped
    /// when none is running) so the first answer never waits on the network.
    pub fn hydrate(&self) {
        let token = self.vault.get(TOKEN_KEY);
        let user = match self.vault.get(USER_KEY) {
            Some(raw) if raw != "undefined" && raw != "null" => {
                match serde_json::from_str::<User>(&raw) {
                    Ok(user) => Some(user),
                    Err(err) => {
                        log::warn!("discarding corrupt identity snapshot: {err}");
                        self.vault.remove(USER_KEY);
                        None
                    }
                }
            }
            Some(_) => {
                self.vault.remove(USER_KEY);
                None
            }
            None => None,
        };

        let needs_refresh = token.is_some() && user.is_none();
        self.commit(|state| {
            state.token = token;
            state.user = user;
            state.initializing = false;
        });

        if needs_refresh {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let Some(store) = self.self_ref.upgrade() else {
                        return;
                    };
                    handle.spawn(async move {
                        if let Some(user) = store.fetch_current_identity().await {
                            store.persist_identity(&user);
                            store.commit(|state| state.user = Some(user));
                        }
                    });
                }
                Err(_) => {
                    log::debug!("no async runtime available; skipping identity refresh");
                }
            }
        }
    }

    /// Re-validates the session against the backend. A dead token forces a
    /// logout and yields `None`; other failures are logged and also yield
    /// `None` without touching the session.
    pub async fn fetch_current_identity(&self) -> Option<User> {
        match self.auth.fetch_me().await {
            Ok(user) => user,
            Err(err) if err.is_unauthorized() => {
                self.logout();
                None
            }
            Err(err) => {
                log::warn!("identity check failed: {err}");
                None
            }
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<()> {
        self.commit(|state| {
            state.is_loading = true;
            state.error = None;
        });
        let outcome = self.login_inner(credentials).await;
        self.commit(|state| {
            if let Err(err) = &outcome {
                state.error = Some(err.to_string());
            }
            state.is_loading = false;
        });
        outcome
    }

    async fn login_inner(&self, credentials: &Credentials) -> Result<()> {
        let envelope = self.auth.login(credentials).await?;

        // The token is staged first: the identity fetch below authenticates
        // with it. A failed validation tears the whole session down again.
        self.commit(|state| state.token = Some(envelope.token.clone()));
        self.vault.set(TOKEN_KEY, &envelope.token);

        let user = match envelope.user {
            Some(user) => Some(user),
            None => self.fetch_current_identity().await,
        };

        if user.as_ref().is_some_and(|user| user.is_blocked) {
            self.logout();
            return Err(AppError::Validation("account is blocked".to_string()));
        }

        match &user {
            Some(user) => self.persist_identity(user),
            None => self.vault.remove(USER_KEY),
        }
        self.commit(|state| state.user = user);
        Ok(())
    }

    pub async fn register(&self, payload: &RegisterPayload) -> Result<()> {
        self.commit(|state| {
            state.is_loading = true;
            state.error = None;
        });
        let outcome = match self.auth.register(payload).await {
            Ok(session) => {
                self.vault.set(TOKEN_KEY, &session.token);
                self.persist_identity(&session.user);
                self.commit(|state| {
                    state.token = Some(session.token);
                    state.user = Some(session.user);
                });
                Ok(())
            }
            Err(err) => Err(err),
        };
        self.commit(|state| {
            if let Err(err) = &outcome {
                state.error = Some(err.to_string());
            }
            state.is_loading = false;
        });
        outcome
    }

    /// Patches the allowed profile fields and replaces the local identity
    /// with the server's authoritative answer.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<User> {
        let id = self.user_id().ok_or_else(|| {
            AppError::NoIdentity("a profile update requires a signed-in user".to_string())
        })?;
        let user = self.users.update_user(id, &update.into()).await?;
        self.persist_identity(&user);
        self.commit(|state| state.user = Some(user.clone()));
        Ok(user)
    }

    pub async fn upload_avatar(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredFile> {
        self.media.upload(data, file_name, content_type).await
    }

    /// Uploads a new avatar, then points the profile at it.
    ///
    /// Known limitation: when the upload succeeds but the profile patch
    /// fails, the uploaded file is orphaned; there is no compensating
    /// delete.
    pub async fn change_avatar(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredFile> {
        let stored = self.upload_avatar(data, file_name, content_type).await?;
        self.update_profile(ProfileUpdate {
            avatar_url: Some(Some(stored.url.clone())),
            avatar_name: Some(Some(stored.name.clone())),
            ..ProfileUpdate::default()
        })
        .await?;
        Ok(stored)
    }

    /// Best-effort deletes the stored avatar file, then clears both avatar
    /// fields on the profile regardless of whether the file delete worked.
    pub async fn remove_avatar(&self) -> Result<()> {
        if self.current_user().is_none() {
            return Ok(());
        }
        if let Some(avatar_url) = self.avatar_url() {
            delete_stored_file_by_url(&self.media, &avatar_url).await;
        }
        self.update_profile(ProfileUpdate {
            avatar_url: Some(None),
            avatar_name: Some(None),
            ..ProfileUpdate::default()
        })
        .await?;
        Ok(())
    }

    /// Clears the in-memory session and both vault keys. Idempotent.
    pub fn logout(&self) {
        self.vault.remove(TOKEN_KEY);
        self.vault.remove(USER_KEY);
        self.commit(|state| {
            state.token = None;
            state.user = None;
        });
    }

    fn persist_identity(&self, user: &User) {
        match serde_json::to_string(user) {
            Ok(raw) => self.vault.set(USER_KEY, &raw),
            Err(err) => log::warn!("could not serialize identity snapshot: {err}"),
        }
    }
}
