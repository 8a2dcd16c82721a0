//! rusty-feed/crates/rf-core/src/lib.rs
//!
//! The domain models and interface definitions shared by every rusty-feed
//! crate.

pub mod error;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use traits::*;
