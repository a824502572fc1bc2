//! Agent Directory
//!
//! Role-gated moderation of AI agent listings, reviews and user accounts,
//! with an append-only audit log of every admin action.

pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::AppContext;
