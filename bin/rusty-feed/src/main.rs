//! # Rusty-Feed Binary
//!
//! The entry point that assembles the client: config from the environment,
//! the file vault, the HTTP backend, and the three stores. It restores
//! whatever session the vault holds, then dumps the feed once.

use std::sync::Arc;

use rf_api_http::{ApiConfig, HttpBackend};
use rf_core::SessionVault;
use rf_stores::RootStore;
use rf_vault_file::FileVault;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // 1. Endpoint layout from the environment (base url is required)
    let config = ApiConfig::from_env()?;
    let base_url = config.base_url.clone();

    // 2. Durable session vault
    let vault_path =
        std::env::var("FEED_VAULT_PATH").unwrap_or_else(|_| "feed-session.json".to_string());
    let vault: Arc<dyn SessionVault> = Arc::new(FileVault::open(vault_path));

    // 3. Backend adapter + stores
    let backend = Arc::new(HttpBackend::new(config, Arc::clone(&vault)));
    let root = RootStore::with_backend(backend, vault);

    log::info!("🚀 rusty-feed talking to {base_url}");

    // 4. Restore whatever session the vault holds
    root.session.hydrate();
    match root.session.current_user() {
        Some(user) => log::info!("signed in as {} <{}>", user.name, user.email),
        None => log::info!("anonymous session"),
    }

    // 5. Dump the feed, newest first, with comment badges
    root.feed.fetch_all_posts().await;
    if let Some(err) = root.feed.last_error() {
        anyhow::bail!("could not load the feed: {err}");
    }
    for post in root.feed.posts() {
        root.feed.ensure_comments_preview(post.id).await;
        println!(
            "#{} [{}] {} ({} comments)",
            post.id,
            post.author_name,
            post.description,
            root.feed.comments_count(post.id)
        );
    }

    Ok(())
}
