//! rusty-feed/crates/rf-stores/src/lib.rs
//!
//! The observable state containers mirroring the backend's resources:
//! session (who is signed in), directory (the admin account list), and feed
//! (posts plus comment caches), assembled by the root store.

pub mod directory;
pub mod feed;
pub mod observer;
pub mod root;
pub mod session;

mod uploads;

pub use directory::{DirectoryState, DirectoryStore};
pub use feed::{FanoutReport, FeedState, FeedStore, PurgeReport, DEFAULT_AVATAR};
pub use observer::{Subscribers, Subscription};
pub use root::RootStore;
pub use session::{SessionState, SessionStore};
