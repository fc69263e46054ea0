//! Quorum-based distributed read-write locking.
//!
//! A [`DRWMutex`] coordinates exclusive or shared ownership of named
//! resources across a set of independent [`NetLocker`] nodes. There is no
//! central coordinator: a lock is held while a strict majority of the nodes
//! in the locker set agree that it is.

pub mod client;
pub mod config;
pub mod drwmutex;
pub mod local;
pub mod lock_args;
pub mod locker;
pub mod provider;
pub mod quorum;

pub use client::{AcquireOutcome, DsyncClient, RefreshOutcome};
pub use config::{DsyncConfig, RetryPolicy, Timeouts};
pub use drwmutex::{DRWMutex, LockLost, Options, new_request_id};
pub use local::{LocalLocker, LockRequesterInfo};
pub use lock_args::LockArgs;
pub use locker::NetLocker;
pub use provider::{Dsync, LockerProvider, LockerSet, StaticLockers};
pub use quorum::Outcome;
