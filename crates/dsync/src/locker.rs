use async_trait::async_trait;
use dsync_common::error::Result;

use super::lock_args::LockArgs;

/// Contract of one remote lock node.
///
/// `Ok(false)` means the node answered and refused (or does not know the
/// grant); `Err(_)` means the node could not be reached. Callers bound every
/// call with their own deadline, so implementations only need to be
/// cancel-safe when their future is dropped.
#[async_trait]
pub trait NetLocker: Send + Sync {
    /// Human readable address of the node, used in logs.
    fn endpoint(&self) -> String;

    /// Offline nodes are counted as unreachable without being called.
    fn is_online(&self) -> bool {
        true
    }

    /// Exclusive grant. Idempotent per `args.uid`.
    async fn lock(&self, args: &LockArgs) -> Result<bool>;
    /// Shared grant. Refused while an exclusive grant is active.
    async fn rlock(&self, args: &LockArgs) -> Result<bool>;
    async fn unlock(&self, args: &LockArgs) -> Result<bool>;
    async fn runlock(&self, args: &LockArgs) -> Result<bool>;
    /// Confirms the grant recorded under `args.uid` is still present.
    async fn refresh(&self, args: &LockArgs) -> Result<bool>;
    /// Drops every grant on `args.resources`, or only those of `args.uid`
    /// when it is set.
    async fn force_unlock(&self, args: &LockArgs) -> Result<bool>;
}
