use serde::{Deserialize, Serialize};

pub const LOCK_REST_PREFIX: &str = "/dsync/v1";

pub const PATH_HEALTH: &str = "health";
pub const PATH_LOCKS: &str = "locks";
pub const PATH_LOCK: &str = "lock";
pub const PATH_RLOCK: &str = "rlock";
pub const PATH_UNLOCK: &str = "unlock";
pub const PATH_RUNLOCK: &str = "runlock";
pub const PATH_REFRESH: &str = "refresh";
pub const PATH_FORCE_UNLOCK: &str = "force-unlock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReply {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: String,
    pub message: String,
}

pub fn route(path: &str) -> String {
    format!("{LOCK_REST_PREFIX}/{path}")
}
