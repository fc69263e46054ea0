//! In-process lock nodes whose replies can be tampered with at runtime.

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dsync::{
    Dsync, DsyncConfig, LocalLocker, LockArgs, LockerProvider, LockerSet, NetLocker, RetryPolicy,
    Timeouts,
};
use dsync_common::Result;

pub const CALL_TIMEOUT: Duration = Duration::from_millis(250);
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(300);

pub fn test_config() -> DsyncConfig {
    DsyncConfig::default()
        .with_timeouts(Timeouts {
            acquire: CALL_TIMEOUT,
            refresh_call: CALL_TIMEOUT,
            unlock_call: CALL_TIMEOUT,
            force_unlock_call: CALL_TIMEOUT,
        })
        .with_refresh_interval(REFRESH_INTERVAL)
        .with_retry(RetryPolicy {
            min_interval: Duration::from_millis(5),
            max_jitter: Duration::from_millis(30),
        })
}

#[derive(Debug)]
pub struct TestLocker {
    inner: LocalLocker,
    refresh_reply: AtomicBool,
    response_delay_ms: AtomicU64,
    online: AtomicBool,
    lock_calls: AtomicUsize,
}

impl TestLocker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: LocalLocker::new(name),
            refresh_reply: AtomicBool::new(true),
            response_delay_ms: AtomicU64::new(0),
            online: AtomicBool::new(true),
            lock_calls: AtomicUsize::new(0),
        }
    }

    /// When false, refresh answers "grant not found" even though the grant
    /// is still recorded.
    pub fn set_refresh_reply(&self, reply: bool) {
        self.refresh_reply.store(reply, Ordering::SeqCst);
    }

    pub fn set_response_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.response_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Exclusive and shared acquisition calls that reached this node.
    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    pub fn table(&self) -> &LocalLocker {
        &self.inner
    }

    pub fn held_count(&self) -> usize {
        self.inner.held_count()
    }

    pub fn holds_uid(&self, uid: &str) -> bool {
        self.inner.holds_uid(uid)
    }

    async fn respond_later(&self) {
        let millis = self.response_delay_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[async_trait]
impl NetLocker for TestLocker {
    fn endpoint(&self) -> String {
        self.inner.endpoint()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn lock(&self, args: &LockArgs) -> Result<bool> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.respond_later().await;
        self.inner.lock(args).await
    }

    async fn rlock(&self, args: &LockArgs) -> Result<bool> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        self.respond_later().await;
        self.inner.rlock(args).await
    }

    async fn unlock(&self, args: &LockArgs) -> Result<bool> {
        self.respond_later().await;
        self.inner.unlock(args).await
    }

    async fn runlock(&self, args: &LockArgs) -> Result<bool> {
        self.respond_later().await;
        self.inner.runlock(args).await
    }

    async fn refresh(&self, args: &LockArgs) -> Result<bool> {
        self.respond_later().await;
        if !self.refresh_reply.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.refresh(args).await
    }

    async fn force_unlock(&self, args: &LockArgs) -> Result<bool> {
        self.respond_later().await;
        self.inner.force_unlock(args).await
    }
}

/// Membership that can be replaced while locks are held.
pub struct SwitchableProvider {
    current: Mutex<LockerSet>,
}

impl SwitchableProvider {
    pub fn new(set: LockerSet) -> Self {
        Self {
            current: Mutex::new(set),
        }
    }

    pub fn replace(&self, set: LockerSet) {
        *self.current.lock().unwrap() = set;
    }
}

impl LockerProvider for SwitchableProvider {
    fn get_lockers(&self) -> LockerSet {
        self.current.lock().unwrap().clone()
    }

    fn is_current(&self, set_id: &str) -> bool {
        self.current.lock().unwrap().id() == set_id
    }
}

pub struct Cluster {
    pub nodes: Vec<Arc<TestLocker>>,
    pub dsync: Arc<Dsync>,
}

impl Cluster {
    pub fn new(size: usize) -> Self {
        let nodes: Vec<Arc<TestLocker>> = (0..size)
            .map(|index| Arc::new(TestLocker::new(format!("node-{index}"))))
            .collect();
        let dsync = Dsync::with_lockers(Self::lockers_of(&nodes), "test-owner")
            .with_config(test_config())
            .unwrap();
        Self {
            nodes,
            dsync: Arc::new(dsync),
        }
    }

    pub fn lockers_of(nodes: &[Arc<TestLocker>]) -> Vec<Arc<dyn NetLocker>> {
        nodes
            .iter()
            .map(|node| Arc::clone(node) as Arc<dyn NetLocker>)
            .collect()
    }

    pub fn lockers(&self) -> Vec<Arc<dyn NetLocker>> {
        Self::lockers_of(&self.nodes)
    }

    pub fn total_grants(&self) -> usize {
        self.nodes.iter().map(|node| node.held_count()).sum()
    }

    pub fn set_response_delay(&self, delay: Duration) {
        for node in &self.nodes {
            node.set_response_delay(delay);
        }
    }
}
