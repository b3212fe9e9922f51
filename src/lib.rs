//! Social feed client over the services behind [`backend::Backend`].

// === Backend seams ===
pub mod backend;

// === Shared ===
pub mod config;
pub mod core;
pub mod models;

// === Client logic ===
pub mod auth;
pub mod editor;
pub mod feed;
pub mod follow;
pub mod format;
pub mod notify;
pub mod policy;
pub mod posts;
pub mod routes;
pub mod upload;
pub mod users;

pub use backend::memory::MemoryBackend;
pub use backend::Backend;
pub use core::errors::{Action, AppError, AuthError, BackendError, ValidationError};
pub use feed::{Feed, FeedChange};
pub use posts::{LikeOutcome, Posts};
