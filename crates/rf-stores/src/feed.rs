//! # Feed store
//!
//! Posts plus three comment caches per post: the lazily loaded full list,
//! the eagerly loaded 3-item preview, and the authoritative count. Because
//! the backend keeps no referential cascade for the denormalized author
//! snapshots, this store also carries the avatar fan-out: a cache-only
//! rewrite and a network batch, kept as two separate operations.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::Utc;
use futures_util::future::join_all;
use rf_core::{
    AppError, Comment, CommentPatch, Id, MediaApi, NewComment, NewPost, Post, PostApi, PostDraft,
    PostPatch, Result, StoredFile, UserApi, UserPatch,
};

use crate::observer::{Subscribers, Subscription};
use crate::session::SessionStore;
use crate::uploads::delete_stored_file_by_url;

/// Placeholder shown when an account has no avatar of its own.
pub const DEFAULT_AVATAR: &str = "data:image/svg+xml;utf8,\
%3Csvg%20xmlns%3D%22http%3A%2F%2Fwww.w3.org%2F2000%2Fsvg%22%20width%3D%22128%22%20height%3D%22128%22%3E\
%3Crect%20width%3D%22100%25%22%20height%3D%22100%25%22%20fill%3D%22%23e5e7eb%22%2F%3E\
%3Ccircle%20cx%3D%2264%22%20cy%3D%2250%22%20r%3D%2224%22%20fill%3D%22%239ca3af%22%2F%3E\
%3Crect%20x%3D%2228%22%20y%3D%2282%22%20width%3D%2272%22%20height%3D%2230%22%20rx%3D%2215%22%20fill%3D%22%239ca3af%22%2F%3E\
%3C%2Fsvg%3E";

/// How the sub-steps of a post purge went. The purge itself only fails when
/// the post delete fails; everything here is best-effort bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub comments_deleted: usize,
    pub comments_failed: usize,
    pub image_removed: bool,
}

/// Which denormalized copies the server-side avatar fan-out reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub posts_updated: usize,
    pub posts_failed: usize,
    pub comments_updated: usize,
    pub comments_failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub posts: Vec<Post>,
    comments_by_post: HashMap<Id, Vec<Comment>>,
    preview_by_post: HashMap<Id, Vec<Comment>>,
    count_by_post: HashMap<Id, u32>,
    pub is_loading_posts: bool,
    pub error_posts: Option<String>,
    processing_posts: HashSet<Id>,
    processing_comments: HashSet<Id>,
}

pub struct FeedStore {
    session: Arc<SessionStore>,
    posts: Arc<dyn PostApi>,
    users: Arc<dyn UserApi>,
    media: Arc<dyn MediaApi>,
    state: RwLock<FeedState>,
    subscribers: Subscribers,
}

impl FeedStore {
    pub fn new(
        session: Arc<SessionStore>,
        posts: Arc<dyn PostApi>,
        users: Arc<dyn UserApi>,
        media: Arc<dyn MediaApi>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            posts,
            users,
            media,
            state: RwLock::new(FeedState::default()),
            subscribers: Subscribers::new(),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, FeedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit<R>(&self, mutate: impl FnOnce(&mut FeedState) -> R) -> R {
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

    pub fn posts(&self) -> Vec<Post> {
        self.read().posts.clone()
    }

    pub fn is_loading_posts(&self) -> bool {
        self.read().is_loading_posts
    }

    pub fn last_error(&self) -> Option<String> {
        self.read().error_posts.clone()
    }

    pub fn comments(&self, post_id: Id) -> Vec<Comment> {
        self.read()
            .comments_by_post
            .get(&post_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn comments_preview(&self, post_id: Id) -> Vec<Comment> {
        self.read()
            .preview_by_post
            .get(&post_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The comment count for a post's badge. The authoritative count wins;
    /// before it is known, whatever locally cached list exists stands in.
    pub fn comments_count(&self, post_id: Id) -> u32 {
        let state = self.read();
        state
            .count_by_post
            .get(&post_id)
            .copied()
            .or_else(|| {
                state
                    .comments_by_post
                    .get(&post_id)
                    .map(|list| list.len() as u32)
            })
            .or_else(|| {
                state
                    .preview_by_post
                    .get(&post_id)
                    .map(|list| list.len() as u32)
            })
            .unwrap_or(0)
    }

    pub fn is_post_processing(&self, id: Id) -> bool {
        self.read().processing_posts.contains(&id)
    }

    pub fn is_comment_processing(&self, id: Id) -> bool {
        self.read().processing_comments.contains(&id)
    }

    fn set_post_processing(&self, id: Id, on: bool) {
        self.commit(|state| {
            if on {
                state.processing_posts.insert(id);
            } else {
                state.processing_posts.remove(&id);
            }
        });
    }

    fn set_comment_processing(&self, id: Id, on: bool) {
        self.commit(|state| {
            if on {
                state.processing_comments.insert(id);
            } else {
                state.processing_comments.remove(&id);
            }
        });
    }

    /// Loads the whole feed, newest first, replacing the local list. Errors
    /// surface only through the `last_error` flag.
    pub async fn fetch_all_posts(&self) {
        self.commit(|state| {
            state.is_loading_posts = true;
            state.error_posts = None;
        });
        match self.posts.list_posts().await {
            Ok(mut posts) => {
                posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                self.commit(|state| state.posts = posts);
            }
            Err(err) => {
                self.commit(|state| state.error_posts = Some(err.to_string()));
            }
        }
        self.commit(|state| state.is_loading_posts = false);
    }

    /// Publishes a new post stamped with the current identity and prepends
    /// the server's echo to the local feed.
    pub async fn create_post(&self, draft: PostDraft) -> Result<Post> {
        let author = self.session.current_user().ok_or_else(|| {
            AppError::NoIdentity("publishing a post requires a signed-in user".to_string())
        })?;
        let payload = NewPost {
            description: draft.description,
            image_url: draft.image_url,
            image_name: draft.image_name,
            author_id: author.id,
            author_name: author.name.clone(),
            author_avatar_url: author.avatar_url.clone(),
            created_at: Utc::now(),
        };
        let post = self.posts.create_post(&payload).await?;
        self.commit(|state| {
            state.posts.insert(0, post.clone());
            state.preview_by_post.insert(post.id, Vec::new());
            state.count_by_post.insert(post.id, 0);
        });
        Ok(post)
    }

    pub async fn upload_image(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<StoredFile> {
        self.media.upload(data, file_name, content_type).await
    }

    /// Refetches the preview (oldest 3) and the authoritative count.
    pub async fn refresh_comments_preview(&self, post_id: Id) -> Result<()> {
        let mut comments = self.posts.list_comments(post_id).await?;
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let total = comments.len() as u32;
        comments.truncate(3);
        self.commit(|state| {
            state.preview_by_post.insert(post_id, comments);
            state.count_by_post.insert(post_id, total);
        });
        Ok(())
    }

    /// Prefetches the preview once per post; a failure is logged and left
    /// for the next attempt.
    pub async fn ensure_comments_preview(&self, post_id: Id) {
        if self.read().count_by_post.contains_key(&post_id) {
            return;
        }
        if let Err(err) = self.refresh_comments_preview(post_id).await {
            log::debug!("comment preview prefetch failed for post {post_id}: {err}");
        }
    }

    /// Loads the full comment list, oldest first, and re-derives the
    /// preview and the count from it.
    pub async fn fetch_all_comments(&self, post_id: Id) -> Result<Vec<Comment>> {
        let mut comments = self.posts.list_comments(post_id).await?;
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.commit(|state| {
            state.count_by_post.insert(post_id, comments.len() as u32);
            state
                .preview_by_post
                .insert(post_id, comments.iter().take(3).cloned().collect());
            state.comments_by_post.insert(post_id, comments.clone());
        });
        Ok(comments)
    }

    /// Posts a comment stamped with the current identity, then folds it into
    /// every cache that already knows about the post.
    pub async fn add_comment(&self, post_id: Id, text: &str) -> Result<Comment> {
        let author = self.session.current_user().ok_or_else(|| {
            AppError::NoIdentity("commenting requires a signed-in user".to_string())
        })?;
        let payload = NewComment {
            post_id,
            text: text.to_string(),
            author_id: author.id,
            author_name: author.name.clone(),
            author_avatar_url: author.avatar_url.clone(),
            created_at: Utc::now(),
        };
        let comment = self.posts.create_comment(&payload).await?;
        self.commit(|state| {
            if let Some(list) = state.comments_by_post.get_mut(&post_id) {
                list.push(comment.clone());
                list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            }

            let prev_count = state.count_by_post.get(&post_id).copied().unwrap_or(0);
            let new_count = prev_count + 1;
            state.count_by_post.insert(post_id, new_count);

            // A preview that was not yet full gains the new comment.
            if prev_count < 3 {
                let mut preview = state
                    .preview_by_post
                    .get(&post_id)
                    .cloned()
                    .unwrap_or_default();
                preview.push(comment.clone());
                preview.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                preview.truncate(3);
                state.preview_by_post.insert(post_id, preview);
            }

            if let Some(post) = state.posts.iter_mut().find(|post| post.id == post_id) {
                post.comments_count = Some(new_count);
            }
        });
        Ok(comment)
    }

    /// Deletes a post and everything hanging off it. The comment sweep and
    /// the image removal are best-effort; only the post delete itself can
    /// fail the operation. The in-flight marker is cleared on every path.
    pub async fn hard_delete_post(&self, post_id: Id) -> Result<PurgeReport> {
        self.set_post_processing(post_id, true);
        let outcome = self.purge_post(post_id).await;
        self.set_post_processing(post_id, false);
        outcome
    }

    async fn purge_post(&self, post_id: Id) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();

        match self.posts.list_comments(post_id).await {
            Ok(comments) => {
                let deletions = comments.iter().map(|c| self.posts.delete_comment(c.id));
                for (comment, result) in comments.iter().zip(join_all(deletions).await) {
                    match result {
                        Ok(()) => report.comments_deleted += 1,
                        Err(err) => {
                            report.comments_failed += 1;
                            log::warn!(
                                "failed to delete comment {} under post {post_id}: {err}",
                                comment.id
                            );
                        }
                    }
                }
            }
            Err(err) => {
                log::warn!("could not list comments of post {post_id} for deletion: {err}");
            }
        }

        let image_url = self
            .read()
            .posts
            .iter()
            .find(|post| post.id == post_id)
            .and_then(|post| post.image_url.clone());
        if let Some(url) = image_url {
            report.image_removed = delete_stored_file_by_url(&self.media, &url).await;
        }

        self.posts.delete_post(post_id).await?;
        self.commit(|state| {
            state.posts.retain(|post| post.id != post_id);
            state.comments_by_post.remove(&post_id);
            state.preview_by_post.remove(&post_id);
            state.count_by_post.remove(&post_id);
        });
        Ok(report)
    }

    /// Deletes one comment, then re-derives preview and count from the
    /// backend rather than recomputing locally.
    pub async fn hard_delete_comment(&self, post_id: Id, comment_id: Id) -> Result<()> {
        self.set_comment_processing(comment_id, true);
        let outcome = self.delete_comment_and_refresh(post_id, comment_id).await;
        self.set_comment_processing(comment_id, false);
        outcome
    }

    async fn delete_comment_and_refresh(&self, post_id: Id, comment_id: Id) -> Result<()> {
        self.posts.delete_comment(comment_id).await?;
        self.commit(|state| {
            if let Some(list) = state.comments_by_post.get_mut(&post_id) {
                list.retain(|comment| comment.id != comment_id);
            }
        });
        self.refresh_comments_preview(post_id).await?;
        let count = self.comments_count(post_id);
        self.commit(|state| {
            if let Some(post) = state.posts.iter_mut().find(|post| post.id == post_id) {
                post.comments_count = Some(count);
            }
        });
        Ok(())
    }

    /// Cache-only half of the avatar fan-out: rewrites the avatar snapshot
    /// on every cached post and comment authored by `user_id`, wherever it
    /// differs. No network traffic; safe to call repeatedly.
    pub fn propagate_avatar_change(&self, user_id: Id, new_avatar_url: &str) {
        self.commit(|state| {
            for post in &mut state.posts {
                if post.author_id == user_id
                    && post.author_avatar_url.as_deref() != Some(new_avatar_url)
                {
                    post.author_avatar_url = Some(new_avatar_url.to_string());
                }
            }
            let rewrite = |comment: &mut Comment| {
                if comment.author_id == user_id
                    && comment.author_avatar_url.as_deref() != Some(new_avatar_url)
                {
                    comment.author_avatar_url = Some(new_avatar_url.to_string());
                }
            };
            for comment in state.comments_by_post.values_mut().flatten() {
                rewrite(comment);
            }
            for comment in state.preview_by_post.values_mut().flatten() {
                rewrite(comment);
            }
        });
    }

    /// Network half of the avatar fan-out. Patches the authoritative user
    /// record (the only step that can fail the call), then fires a patch at
    /// every locally known post and comment by that author, tolerating and
    /// tallying partial failures, and finally folds the url into the caches.
    pub async fn persist_avatar_change_everywhere(
        &self,
        user_id: Id,
        new_avatar_url: &str,
    ) -> Result<FanoutReport> {
        let patch = UserPatch {
            avatar_url: Some(Some(new_avatar_url.to_string())),
            ..UserPatch::default()
        };
        self.users.update_user(user_id, &patch).await?;

        let mut report = FanoutReport::default();

        let post_ids: Vec<Id> = {
            let state = self.read();
            state
                .posts
                .iter()
                .filter(|post| post.author_id == user_id)
                .map(|post| post.id)
                .collect()
        };
        let post_patch = PostPatch {
            author_avatar_url: Some(new_avatar_url.to_string()),
        };
        let results = join_all(
            post_ids
                .iter()
                .map(|id| self.posts.update_post(*id, &post_patch)),
        )
        .await;
        for (id, result) in post_ids.iter().zip(results) {
            match result {
                Ok(()) => report.posts_updated += 1,
                Err(err) => {
                    report.posts_failed += 1;
                    log::warn!("avatar fan-out failed for post {id}: {err}");
                }
            }
        }

        // Only comments held in the full-list cache are patched; a preview
        // entry without its full list is unknown to the fan-out.
        let comment_ids: Vec<Id> = {
            let state = self.read();
            state
                .comments_by_post
                .values()
                .flatten()
                .filter(|comment| comment.author_id == user_id)
                .map(|comment| comment.id)
                .collect()
        };
        let comment_patch = CommentPatch {
            author_avatar_url: Some(new_avatar_url.to_string()),
        };
        let results = join_all(
            comment_ids
                .iter()
                .map(|id| self.posts.update_comment(*id, &comment_patch)),
        )
        .await;
        for (id, result) in comment_ids.iter().zip(results) {
            match result {
                Ok(()) => report.comments_updated += 1,
                Err(err) => {
                    report.comments_failed += 1;
                    log::warn!("avatar fan-out failed for comment {id}: {err}");
                }
            }
        }

        self.propagate_avatar_change(user_id, new_avatar_url);
        Ok(report)
    }

    /// Looks up an account's current avatar, falling back to the placeholder
    /// when the account has none or the lookup fails.
    pub async fn fetch_user_avatar(&self, user_id: Id) -> String {
        match self.users.get_user_avatar(user_id).await {
            Ok(Some(url)) if !url.is_empty() => url,
            Ok(_) => DEFAULT_AVATAR.to_string(),
            Err(err) => {
                log::debug!("avatar lookup failed for user {user_id}: {err}");
                DEFAULT_AVATAR.to_string()
            }
        }
    }

    /// Drops the post list (logout eviction). Comment caches are left in
    /// place; they are keyed by post id and unreachable without the list.
    pub fn clear_posts(&self) {
        self.commit(|state| state.posts.clear());
    }
}
