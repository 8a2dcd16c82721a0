//! Feed scenarios: post lifecycle, the three comment caches, multi-step
//! deletes, and both halves of the avatar fan-out.

mod common;

use std::sync::Arc;

use common::{authed_vault, comment, post, session_with, user, FakeBackend};
use rf_core::{AppError, MediaApi, PostApi, PostDraft, StoredFile, UserApi};
use rf_stores::{FeedStore, SessionStore, DEFAULT_AVATAR};

fn feed_with(backend: &Arc<FakeBackend>, session: &Arc<SessionStore>) -> Arc<FeedStore> {
    FeedStore::new(
        Arc::clone(session),
        Arc::clone(backend) as Arc<dyn PostApi>,
        Arc::clone(backend) as Arc<dyn UserApi>,
        Arc::clone(backend) as Arc<dyn MediaApi>,
    )
}

/// Signed-in session plus a feed store over the same fake backend.
fn signed_in(backend: &Arc<FakeBackend>) -> (Arc<SessionStore>, Arc<FeedStore>) {
    let ann = user(7, "Ann");
    backend.state().users.push(ann.clone());
    let session = session_with(backend, authed_vault(&ann, "T1"));
    session.hydrate();
    (session.clone(), feed_with(backend, &session))
}

#[tokio::test]
async fn fetch_all_posts_sorts_newest_first() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    backend.state().posts.push(post(1, &ann, 100));
    backend.state().posts.push(post(2, &ann, 300));
    backend.state().posts.push(post(3, &ann, 200));

    feed.fetch_all_posts().await;

    let ids: Vec<_> = feed.posts().iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);
    assert!(!feed.is_loading_posts());
    assert_eq!(feed.last_error(), None);
}

#[tokio::test]
async fn a_failed_feed_load_surfaces_only_through_the_error_flag() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    backend.state().posts.push(post(1, &ann, 100));
    feed.fetch_all_posts().await;
    assert_eq!(feed.posts().len(), 1);

    backend.state().fail_list_posts = true;
    feed.fetch_all_posts().await;

    assert!(feed.last_error().is_some());
    assert!(!feed.is_loading_posts());
    // The previous list is kept; a failed reload does not blank the feed.
    assert_eq!(feed.posts().len(), 1);
}

#[tokio::test]
async fn create_post_stamps_the_current_identity_and_seeds_counts() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);

    let created = feed
        .create_post(PostDraft {
            description: "hi".to_string(),
            ..PostDraft::default()
        })
        .await
        .unwrap();

    assert_eq!(created.author_id, 7);
    assert_eq!(created.author_name, "Ann");
    let posts = feed.posts();
    assert_eq!(posts[0].id, created.id);
    assert_eq!(feed.comments_count(created.id), 0);
    assert!(feed.comments_preview(created.id).is_empty());
}

#[tokio::test]
async fn create_post_requires_an_identity() {
    let backend = FakeBackend::new();
    let session = session_with(&backend, Arc::new(rf_vault_file::MemoryVault::new()));
    let feed = feed_with(&backend, &session);

    let err = feed
        .create_post(PostDraft {
            description: "hi".to_string(),
            ..PostDraft::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoIdentity(_)));
}

#[tokio::test]
async fn the_count_always_matches_a_full_fetch() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let created = feed
        .create_post(PostDraft {
            description: "hi".to_string(),
            ..PostDraft::default()
        })
        .await
        .unwrap();

    for text in ["one", "two", "three", "four"] {
        feed.add_comment(created.id, text).await.unwrap();
    }

    let listed = feed.fetch_all_comments(created.id).await.unwrap();
    assert_eq!(listed.len() as u32, feed.comments_count(created.id));
    assert_eq!(feed.comments_count(created.id), 4);
}

#[tokio::test]
async fn the_preview_always_holds_the_oldest_three() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    backend.state().posts.push(post(1, &ann, 100));
    // Seeded out of order; the store must sort ascending.
    backend.state().comments.push(comment(11, 1, &ann, 20));
    backend.state().comments.push(comment(12, 1, &ann, 10));
    feed.fetch_all_posts().await;

    feed.ensure_comments_preview(1).await;
    assert_eq!(feed.comments_count(1), 2);
    let ids: Vec<_> = feed.comments_preview(1).iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![12, 11]);

    // Newly added comments are younger than the seeded ones, so they extend
    // the preview only up to three entries.
    feed.add_comment(1, "later").await.unwrap();
    feed.add_comment(1, "latest").await.unwrap();

    assert_eq!(feed.comments_count(1), 4);
    let preview = feed.comments_preview(1);
    assert_eq!(preview.len(), 3);
    assert_eq!(preview[0].id, 12);
    assert_eq!(preview[1].id, 11);
    // The denormalized badge on the post row follows the count.
    assert_eq!(feed.posts()[0].comments_count, Some(4));
}

#[tokio::test]
async fn ensure_comments_preview_fetches_once_and_swallows_errors() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    backend.state().posts.push(post(1, &ann, 100));

    backend.state().fail_list_comments = true;
    feed.ensure_comments_preview(1).await;
    assert_eq!(feed.comments_count(1), 0);

    backend.state().fail_list_comments = false;
    feed.ensure_comments_preview(1).await;
    feed.ensure_comments_preview(1).await;

    // One failed attempt, one successful fetch, then the no-op.
    assert_eq!(backend.call_count("list_comments 1"), 2);
}

#[tokio::test]
async fn hard_delete_post_absorbs_sub_step_failures() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    let mut doomed = post(1, &ann, 100);
    doomed.image_url = Some("http://files/pic.png".to_string());
    backend.state().posts.push(doomed);
    backend.state().uploads.push(StoredFile {
        url: "http://files/pic.png".to_string(),
        name: "pic.png".to_string(),
        id: Some("55".to_string()),
    });
    for (id, secs) in [(11, 10), (12, 20), (13, 30)] {
        backend.state().comments.push(comment(id, 1, &ann, secs));
    }
    backend.state().fail_comment_deletes.insert(12);
    feed.fetch_all_posts().await;
    feed.fetch_all_comments(1).await.unwrap();

    let report = feed.hard_delete_post(1).await.unwrap();

    assert_eq!(report.comments_deleted, 2);
    assert_eq!(report.comments_failed, 1);
    assert!(report.image_removed);
    assert!(feed.posts().is_empty());
    assert!(feed.comments(1).is_empty());
    assert!(feed.comments_preview(1).is_empty());
    assert_eq!(feed.comments_count(1), 0);
    assert!(!feed.is_post_processing(1));
}

#[tokio::test]
async fn hard_delete_post_propagates_the_post_delete_failure() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    backend.state().posts.push(post(1, &ann, 100));
    backend.state().fail_post_deletes.insert(1);
    feed.fetch_all_posts().await;

    let err = feed.hard_delete_post(1).await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
    assert_eq!(feed.posts().len(), 1);
    assert!(!feed.is_post_processing(1));
}

#[tokio::test]
async fn hard_delete_comment_rederives_the_preview_from_the_backend() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    backend.state().posts.push(post(1, &ann, 100));
    for (id, secs) in [(11, 10), (12, 20), (13, 30), (14, 40)] {
        backend.state().comments.push(comment(id, 1, &ann, secs));
    }
    feed.fetch_all_posts().await;
    feed.fetch_all_comments(1).await.unwrap();
    assert_eq!(feed.comments_count(1), 4);

    feed.hard_delete_comment(1, 12).await.unwrap();

    assert_eq!(feed.comments_count(1), 3);
    let full_ids: Vec<_> = feed.comments(1).iter().map(|c| c.id).collect();
    assert_eq!(full_ids, vec![11, 13, 14]);
    let preview_ids: Vec<_> = feed.comments_preview(1).iter().map(|c| c.id).collect();
    assert_eq!(preview_ids, vec![11, 13, 14]);
    assert_eq!(feed.posts()[0].comments_count, Some(3));
    assert!(!feed.is_comment_processing(12));
}

#[tokio::test]
async fn cache_propagation_is_idempotent() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    let bob = user(8, "Bob");
    backend.state().posts.push(post(1, &ann, 100));
    backend.state().posts.push(post(2, &bob, 200));
    backend.state().comments.push(comment(11, 1, &ann, 10));
    backend.state().comments.push(comment(12, 1, &bob, 20));
    feed.fetch_all_posts().await;
    feed.fetch_all_comments(1).await.unwrap();

    feed.propagate_avatar_change(7, "http://files/new.png");
    let posts_once = feed.posts();
    let comments_once = feed.comments(1);
    let preview_once = feed.comments_preview(1);

    feed.propagate_avatar_change(7, "http://files/new.png");
    assert_eq!(feed.posts(), posts_once);
    assert_eq!(feed.comments(1), comments_once);
    assert_eq!(feed.comments_preview(1), preview_once);

    // Only Ann's copies were rewritten.
    assert_eq!(
        posts_once[1].author_avatar_url.as_deref(),
        Some("http://files/new.png")
    );
    assert_eq!(posts_once[0].author_avatar_url, None);
    assert_eq!(
        comments_once[0].author_avatar_url.as_deref(),
        Some("http://files/new.png")
    );
    assert_eq!(comments_once[1].author_avatar_url, None);
}

#[tokio::test]
async fn server_fanout_reports_partial_failures() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);
    let ann = user(7, "Ann");
    backend.state().posts.push(post(1, &ann, 100));
    backend.state().posts.push(post(2, &ann, 200));
    backend.state().comments.push(comment(11, 1, &ann, 10));
    backend.state().comments.push(comment(12, 1, &ann, 20));
    backend.state().fail_post_patches.insert(2);
    backend.state().fail_comment_patches.insert(12);
    feed.fetch_all_posts().await;
    feed.fetch_all_comments(1).await.unwrap();

    let report = feed
        .persist_avatar_change_everywhere(7, "http://files/new.png")
        .await
        .unwrap();

    assert_eq!(report.posts_updated, 1);
    assert_eq!(report.posts_failed, 1);
    assert_eq!(report.comments_updated, 1);
    assert_eq!(report.comments_failed, 1);

    // The cache half still ran for every copy, including the failed ones.
    for post in feed.posts() {
        assert_eq!(post.author_avatar_url.as_deref(), Some("http://files/new.png"));
    }
    // And the authoritative user record was patched first.
    assert_eq!(
        backend.state().users[0].avatar_url.as_deref(),
        Some("http://files/new.png")
    );
}

#[tokio::test]
async fn fetch_user_avatar_falls_back_to_the_placeholder() {
    let backend = FakeBackend::new();
    let (_session, feed) = signed_in(&backend);

    // Known user without an avatar.
    assert_eq!(feed.fetch_user_avatar(7).await, DEFAULT_AVATAR);
    // Unknown user: the lookup error is absorbed.
    assert_eq!(feed.fetch_user_avatar(404).await, DEFAULT_AVATAR);

    backend.state().users[0].avatar_url = Some("http://files/a.png".to_string());
    assert_eq!(feed.fetch_user_avatar(7).await, "http://files/a.png");
}
