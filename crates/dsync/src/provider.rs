use std::{fmt, sync::Arc};

use dsync_common::error::{DsyncError, Result};
use uuid::Uuid;

use crate::{config::DsyncConfig, locker::NetLocker};

/// Ordered snapshot of the lock nodes used for one acquisition.
///
/// Grant state recorded by a mutex is aligned by index with the set it was
/// acquired on, so a set is never mutated after it is handed out.
#[derive(Clone)]
pub struct LockerSet {
    id: String,
    lockers: Arc<[Arc<dyn NetLocker>]>,
}

impl LockerSet {
    pub fn new(id: impl Into<String>, lockers: Vec<Arc<dyn NetLocker>>) -> Self {
        Self {
            id: id.into(),
            lockers: lockers.into(),
        }
    }

    /// Builds a set with a freshly generated identifier.
    pub fn fresh(lockers: Vec<Arc<dyn NetLocker>>) -> Self {
        Self::new(Uuid::new_v4().to_string(), lockers)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.lockers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lockers.is_empty()
    }

    pub fn lockers(&self) -> &[Arc<dyn NetLocker>] {
        &self.lockers
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.lockers.iter().map(|locker| locker.endpoint()).collect()
    }
}

impl fmt::Debug for LockerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockerSet")
            .field("id", &self.id)
            .field("lockers", &self.endpoints())
            .finish()
    }
}

/// Source of the current locker set.
///
/// Called once per acquisition attempt and from every refresh tick, possibly
/// from many mutexes at once.
pub trait LockerProvider: Send + Sync {
    fn get_lockers(&self) -> LockerSet;

    /// Whether a set handed out earlier still describes the current
    /// membership. Providers that cannot tell report `true`.
    fn is_current(&self, set_id: &str) -> bool {
        let _ = set_id;
        true
    }
}

impl<F> LockerProvider for F
where
    F: Fn() -> LockerSet + Send + Sync,
{
    fn get_lockers(&self) -> LockerSet {
        self()
    }
}

/// Fixed membership, handed out under one stable identifier.
#[derive(Debug, Clone)]
pub struct StaticLockers {
    set: LockerSet,
}

impl StaticLockers {
    pub fn new(lockers: Vec<Arc<dyn NetLocker>>) -> Self {
        Self {
            set: LockerSet::fresh(lockers),
        }
    }
}

impl LockerProvider for StaticLockers {
    fn get_lockers(&self) -> LockerSet {
        self.set.clone()
    }

    fn is_current(&self, set_id: &str) -> bool {
        self.set.id() == set_id
    }
}

/// Process-wide locking context shared by every [`DRWMutex`](crate::DRWMutex).
#[derive(Clone)]
pub struct Dsync {
    provider: Arc<dyn LockerProvider>,
    owner: String,
    config: DsyncConfig,
}

impl Dsync {
    pub fn new(provider: Arc<dyn LockerProvider>, owner: impl Into<String>) -> Self {
        Self {
            provider,
            owner: owner.into(),
            config: DsyncConfig::default(),
        }
    }

    /// Convenience constructor over a fixed set of lockers.
    pub fn with_lockers(lockers: Vec<Arc<dyn NetLocker>>, owner: impl Into<String>) -> Self {
        Self::new(Arc::new(StaticLockers::new(lockers)), owner)
    }

    /// Replaces the tunables. Rejects a configuration that fails
    /// [`DsyncConfig::validate`].
    pub fn with_config(mut self, config: DsyncConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn get_lockers(&self) -> LockerSet {
        self.provider.get_lockers()
    }

    /// Current locker set, or [`DsyncError::NoLockers`] when the provider has
    /// no node to offer.
    pub fn lockers(&self) -> Result<LockerSet> {
        let set = self.get_lockers();
        if set.is_empty() {
            return Err(DsyncError::NoLockers);
        }
        Ok(set)
    }

    pub fn is_current(&self, set_id: &str) -> bool {
        self.provider.is_current(set_id)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn config(&self) -> &DsyncConfig {
        &self.config
    }
}

impl fmt::Debug for Dsync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dsync")
            .field("owner", &self.owner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
