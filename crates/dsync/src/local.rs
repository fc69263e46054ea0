use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dsync_common::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{lock_args::LockArgs, locker::NetLocker};

/// One grant recorded by a lock node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequesterInfo {
    pub name: String,
    pub writer: bool,
    pub uid: String,
    pub owner: String,
    pub source: String,
    pub quorum: usize,
    pub acquired_at: DateTime<Utc>,
    pub last_refreshed: DateTime<Utc>,
}

impl LockRequesterInfo {
    fn new(name: &str, writer: bool, args: &LockArgs) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            writer,
            uid: args.uid.clone(),
            owner: args.owner.clone(),
            source: args.source.clone(),
            quorum: args.quorum,
            acquired_at: now,
            last_refreshed: now,
        }
    }

    fn is_same_request(&self, args: &LockArgs) -> bool {
        self.uid == args.uid && self.owner == args.owner
    }
}

/// In-memory grant table of a single lock node.
#[derive(Debug, Default)]
pub struct LocalLocker {
    endpoint: String,
    lock_map: Mutex<HashMap<String, Vec<LockRequesterInfo>>>,
}

impl LocalLocker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            lock_map: Mutex::new(HashMap::new()),
        }
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<String, Vec<LockRequesterInfo>>> {
        match self.lock_map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Exclusive grant on every resource of `args`, or on none of them.
    pub fn grant_lock(&self, args: &LockArgs) -> bool {
        let mut map = self.lock_map();

        let available = args.resources.iter().all(|resource| match map.get(resource) {
            None => true,
            Some(entries) => entries
                .iter()
                .all(|entry| entry.writer && entry.is_same_request(args)),
        });
        if !available {
            return false;
        }

        for resource in &args.resources {
            let entries = map.entry(resource.clone()).or_default();
            if entries.is_empty() {
                entries.push(LockRequesterInfo::new(resource, true, args));
            }
        }
        true
    }

    /// Shared grant on every resource of `args`, or on none of them.
    pub fn grant_rlock(&self, args: &LockArgs) -> bool {
        let mut map = self.lock_map();

        let write_locked = args.resources.iter().any(|resource| {
            map.get(resource)
                .is_some_and(|entries| entries.iter().any(|entry| entry.writer))
        });
        if write_locked {
            return false;
        }

        for resource in &args.resources {
            let entries = map.entry(resource.clone()).or_default();
            if !entries.iter().any(|entry| entry.is_same_request(args)) {
                entries.push(LockRequesterInfo::new(resource, false, args));
            }
        }
        true
    }

    pub fn release_lock(&self, args: &LockArgs) -> bool {
        self.remove_entries(args, |entry| entry.writer && entry.is_same_request(args))
    }

    pub fn release_rlock(&self, args: &LockArgs) -> bool {
        self.remove_entries(args, |entry| !entry.writer && entry.is_same_request(args))
    }

    fn remove_entries<F>(&self, args: &LockArgs, matches: F) -> bool
    where
        F: Fn(&LockRequesterInfo) -> bool,
    {
        let mut map = self.lock_map();
        let mut removed = false;

        for resource in &args.resources {
            if let Some(entries) = map.get_mut(resource) {
                let before = entries.len();
                entries.retain(|entry| !matches(entry));
                removed |= entries.len() != before;
                if entries.is_empty() {
                    map.remove(resource);
                }
            }
        }
        removed
    }

    /// Marks the grants of `args.uid` as refreshed now; false when the node
    /// holds none of them.
    pub fn refresh_grant(&self, args: &LockArgs) -> bool {
        let mut map = self.lock_map();
        let now = Utc::now();
        let mut found = false;

        for resource in &args.resources {
            if let Some(entries) = map.get_mut(resource) {
                for entry in entries.iter_mut().filter(|entry| entry.uid == args.uid) {
                    entry.last_refreshed = now;
                    found = true;
                }
            }
        }
        found
    }

    /// Drops grants regardless of owner: every grant of `args.uid` when it
    /// is set, otherwise every grant on `args.resources`.
    pub fn force_release(&self, args: &LockArgs) -> usize {
        let mut map = self.lock_map();
        let mut removed = 0usize;

        if args.uid.is_empty() {
            for resource in &args.resources {
                if let Some(entries) = map.remove(resource) {
                    removed += entries.len();
                }
            }
            return removed;
        }

        map.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|entry| entry.uid != args.uid);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }

    /// Drops grants whose holder has not refreshed them within `validity`.
    pub fn expire_older_than(&self, validity: Duration) -> usize {
        let validity = chrono::Duration::from_std(validity).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(validity)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut map = self.lock_map();
        let mut expired = 0usize;

        map.retain(|resource, entries| {
            entries.retain(|entry| {
                let stale = entry.last_refreshed <= cutoff;
                if stale {
                    debug!(resource = %resource, uid = %entry.uid, owner = %entry.owner, "expiring unrefreshed grant");
                    expired += 1;
                }
                !stale
            });
            !entries.is_empty()
        });
        expired
    }

    pub fn dup_lock_map(&self) -> HashMap<String, Vec<LockRequesterInfo>> {
        self.lock_map().clone()
    }

    /// Number of grants currently recorded.
    pub fn held_count(&self) -> usize {
        self.lock_map().values().map(Vec::len).sum()
    }

    pub fn holds_uid(&self, uid: &str) -> bool {
        self.lock_map()
            .values()
            .any(|entries| entries.iter().any(|entry| entry.uid == uid))
    }
}

#[async_trait]
impl NetLocker for LocalLocker {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn lock(&self, args: &LockArgs) -> Result<bool> {
        args.validate()?;
        Ok(self.grant_lock(args))
    }

    async fn rlock(&self, args: &LockArgs) -> Result<bool> {
        args.validate()?;
        Ok(self.grant_rlock(args))
    }

    async fn unlock(&self, args: &LockArgs) -> Result<bool> {
        args.validate()?;
        Ok(self.release_lock(args))
    }

    async fn runlock(&self, args: &LockArgs) -> Result<bool> {
        args.validate()?;
        Ok(self.release_rlock(args))
    }

    async fn refresh(&self, args: &LockArgs) -> Result<bool> {
        args.validate()?;
        Ok(self.refresh_grant(args))
    }

    async fn force_unlock(&self, args: &LockArgs) -> Result<bool> {
        if args.uid.is_empty() {
            args.validate()?;
        }
        self.force_release(args);
        Ok(true)
    }
}
