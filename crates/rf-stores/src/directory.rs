//! # Directory store
//!
//! The administrator's view of every account: one flat list plus per-row
//! in-flight markers. Each mutation replaces the affected row with the
//! server's returned representation; the marker is cleared on every exit
//! path so a failed call never wedges a row.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::Utc;
use rf_core::{AppError, Id, Result, User, UserApi, UserPatch, UserRole};

use crate::observer::{Subscribers, Subscription};
use crate::session::SessionStore;

#[derive(Debug, Clone, Default)]
pub struct DirectoryState {
    pub list: Vec<User>,
    pub is_loading: bool,
    pub error: Option<String>,
    processing: HashSet<Id>,
}

pub struct DirectoryStore {
    users: Arc<dyn UserApi>,
    session: Arc<SessionStore>,
    state: RwLock<DirectoryState>,
    subscribers: Subscribers,
}

impl DirectoryStore {
    pub fn new(users: Arc<dyn UserApi>, session: Arc<SessionStore>) -> Arc<Self> {
        Arc::new(Self {
            users,
            session,
            state: RwLock::new(DirectoryState::default()),
            subscribers: Subscribers::new(),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit<R>(&self, mutate: impl FnOnce(&mut DirectoryState) -> R) -> R {
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

    pub fn list(&self) -> Vec<User> {
        self.read().list.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn is_processing(&self, id: Id) -> bool {
        self.read().processing.contains(&id)
    }

    fn set_processing(&self, id: Id, on: bool) {
        self.commit(|state| {
            if on {
                state.processing.insert(id);
            } else {
                state.processing.remove(&id);
            }
        });
    }

    pub async fn fetch_all(&self) -> Result<()> {
        self.commit(|state| {
            state.is_loading = true;
            state.error = None;
        });
        let outcome = match self.users.list_users().await {
            Ok(list) => {
                self.commit(|state| state.list = list);
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

    pub async fn set_blocked(&self, id: Id, blocked: bool) -> Result<User> {
        self.apply_patch(
            id,
            UserPatch {
                is_blocked: Some(blocked),
                ..UserPatch::default()
            },
        )
        .await
    }

    pub async fn set_role(&self, id: Id, role: UserRole) -> Result<User> {
        self.apply_patch(
            id,
            UserPatch {
                role: Some(role),
                ..UserPatch::default()
            },
        )
        .await
    }

    /// Marks the account deleted with a timestamp; the row stays listed so
    /// it can be restored.
    pub async fn soft_delete(&self, id: Id) -> Result<User> {
        self.guard_self_target(id)?;
        self.apply_patch(
            id,
            UserPatch {
                is_deleted: Some(true),
                deleted_at: Some(Some(Utc::now())),
                ..UserPatch::default()
            },
        )
        .await
    }

    pub async fn restore(&self, id: Id) -> Result<User> {
        self.apply_patch(
            id,
            UserPatch {
                is_deleted: Some(false),
                deleted_at: Some(None),
                ..UserPatch::default()
            },
        )
        .await
    }

    /// Physically removes the account from the backend and the local list.
    pub async fn hard_delete(&self, id: Id) -> Result<()> {
        self.guard_self_target(id)?;
        self.set_processing(id, true);
        let outcome = self.users.delete_user(id).await;
        if outcome.is_ok() {
            self.commit(|state| state.list.retain(|user| user.id != id));
        }
        self.set_processing(id, false);
        outcome
    }

    /// Drops the cached list (logout eviction).
    pub fn clear(&self) {
        self.commit(|state| state.list.clear());
    }

    async fn apply_patch(&self, id: Id, patch: UserPatch) -> Result<User> {
        self.set_processing(id, true);
        let outcome = self.users.update_user(id, &patch).await;
        if let Ok(user) = &outcome {
            self.commit(|state| {
                if let Some(row) = state.list.iter_mut().find(|row| row.id == id) {
                    *row = user.clone();
                }
            });
        }
        self.set_processing(id, false);
        outcome
    }

    /// Deleting the signed-in account through the admin surface is rejected
    /// before any network call is made.
    fn guard_self_target(&self, id: Id) -> Result<()> {
        if self.session.user_id() == Some(id) {
            return Err(AppError::Validation(
                "the signed-in account cannot delete itself".to_string(),
            ));
        }
        Ok(())
    }
}
