//! # Root store
//!
//! Builds the three stores with explicit dependency injection and wires the
//! two standing reactions the application relies on:
//!
//! 1. the session's avatar url changes → fold the new url into the feed's
//!    cached posts and comments (cache-only propagation);
//! 2. the session drops to unauthenticated → evict the feed's post list and
//!    the directory's account list.
//!
//! Reactions run synchronously after the session commit that triggered
//! them. They hold weak references so the stores can still be dropped.

use std::sync::{Arc, Mutex, PoisonError};

use rf_core::{AuthApi, MediaApi, PostApi, SessionVault, UserApi};

use crate::directory::DirectoryStore;
use crate::feed::FeedStore;
use crate::observer::Subscription;
use crate::session::SessionStore;

pub struct RootStore {
    pub session: Arc<SessionStore>,
    pub directory: Arc<DirectoryStore>,
    pub feed: Arc<FeedStore>,
    _reactions: Vec<Subscription>,
}

impl RootStore {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        users: Arc<dyn UserApi>,
        posts: Arc<dyn PostApi>,
        media: Arc<dyn MediaApi>,
        vault: Arc<dyn SessionVault>,
    ) -> Arc<Self> {
        let session = SessionStore::new(auth, Arc::clone(&users), Arc::clone(&media), vault);
        let directory = DirectoryStore::new(Arc::clone(&users), Arc::clone(&session));
        let feed = FeedStore::new(Arc::clone(&session), posts, users, media);
        let reactions = wire_reactions(&session, &directory, &feed);
        Arc::new(Self {
            session,
            directory,
            feed,
            _reactions: reactions,
        })
    }

    /// Convenience constructor for the common case of one backend value
    /// implementing all four API ports.
    pub fn with_backend<B>(backend: Arc<B>, vault: Arc<dyn SessionVault>) -> Arc<Self>
    where
        B: AuthApi + UserApi + PostApi + MediaApi + 'static,
    {
        Self::new(
            Arc::clone(&backend) as Arc<dyn AuthApi>,
            Arc::clone(&backend) as Arc<dyn UserApi>,
            Arc::clone(&backend) as Arc<dyn PostApi>,
            backend as Arc<dyn MediaApi>,
            vault,
        )
    }
}

fn wire_reactions(
    session: &Arc<SessionStore>,
    directory: &Arc<DirectoryStore>,
    feed: &Arc<FeedStore>,
) -> Vec<Subscription> {
    let mut reactions = Vec::with_capacity(2);

    // Avatar edge. Fires only on an actual change to a present url; a
    // cleared avatar leaves the cached snapshots as they are.
    {
        let session_ref = Arc::downgrade(session);
        let feed_ref = Arc::downgrade(feed);
        let last_seen = Mutex::new(session.avatar_url());
        reactions.push(session.subscribe(move || {
            let (Some(session), Some(feed)) = (session_ref.upgrade(), feed_ref.upgrade()) else {
                return;
            };
            let current = session.avatar_url();
            let mut last = last_seen.lock().unwrap_or_else(PoisonError::into_inner);
            if *last != current {
                if let (Some(url), Some(user_id)) = (current.as_deref(), session.user_id()) {
                    feed.propagate_avatar_change(user_id, url);
                }
                *last = current;
            }
        }));
    }

    // Logout edge: caches that belong to the closed session are evicted.
    {
        let session_ref = Arc::downgrade(session);
        let directory_ref = Arc::downgrade(directory);
        let feed_ref = Arc::downgrade(feed);
        let last_seen = Mutex::new(session.is_authenticated());
        reactions.push(session.subscribe(move || {
            let Some(session) = session_ref.upgrade() else {
                return;
            };
            let current = session.is_authenticated();
            let mut last = last_seen.lock().unwrap_or_else(PoisonError::into_inner);
            if *last && !current {
                if let Some(feed) = feed_ref.upgrade() {
                    feed.clear_posts();
                }
                if let Some(directory) = directory_ref.upgrade() {
                    directory.clear();
                }
            }
            *last = current;
        }));
    }

    reactions
}
