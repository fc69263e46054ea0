//! HTTP transport for dsync lock nodes.

pub mod client;
pub mod error;
pub mod server;
pub mod types;

pub use client::RestLocker;
pub use error::RestError;
pub use server::lock_router;
pub use types::{LOCK_REST_PREFIX, LockReply};
