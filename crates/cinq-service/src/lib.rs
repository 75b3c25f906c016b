//! Process-wide offline client for Cinq.
//!
//! Owns the whole offline queue stack behind one context object with
//! explicit `init`/`shutdown`: the durable store, queueing API, sync engine,
//! status reporter, connectivity watcher, and session token slot. Consumers
//! get handles from the context instead of ambient globals.

mod client;
mod config;
mod error;
mod logging;
mod paths;
mod tokens;

pub use client::OfflineClient;
pub use config::{Config, DEFAULT_ANON_KEY, DEFAULT_API_URL, DEFAULT_LOG_LEVEL};
pub use error::{ServiceError, ServiceResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
pub use tokens::SessionTokens;
