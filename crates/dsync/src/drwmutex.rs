use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, sleep, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    client::DsyncClient,
    lock_args::LockArgs,
    provider::Dsync,
    quorum,
};

/// Callback fired at most once when a held lock is presumed lost.
pub type LockLost = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Longest time to keep retrying before giving up.
    pub timeout: Duration,
}

impl Options {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::MAX,
        }
    }
}

/// Fresh request id for one acquisition.
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

struct RefreshTask {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    async fn shutdown(self) {
        self.stop.cancel();
        if let Err(err) = self.handle.await
            && err.is_panic()
        {
            warn!(error = %err, "dsync refresh task panicked");
        }
    }
}

/// Grants obtained by one successful acquisition.
struct Hold {
    args: LockArgs,
    client: DsyncClient,
    granted: Vec<bool>,
    refresh: RefreshTask,
}

impl Hold {
    async fn release(self, read_lock: bool) {
        self.refresh.shutdown().await;
        let released = self
            .client
            .release(&self.args, &self.granted, read_lock)
            .await;
        debug!(
            uid = %self.args.uid,
            resources = ?self.args.resources,
            read_lock,
            released,
            "dsync lock released"
        );
    }
}

#[derive(Default)]
struct HoldState {
    write: Option<Hold>,
    reads: VecDeque<Hold>,
}

/// Distributed read-write mutex over the lockers of a [`Dsync`].
///
/// Acquisition succeeds once a strict majority of the locker set grants it.
/// While held, a background task refreshes the grants; if a majority of
/// nodes stop knowing them the caller's loss callback fires. Release never
/// waits on a node longer than the configured unlock call timeout.
pub struct DRWMutex {
    dsync: Arc<Dsync>,
    resources: Vec<String>,
    state: Mutex<HoldState>,
}

impl DRWMutex {
    pub fn new(dsync: Arc<Dsync>, resources: Vec<String>) -> Self {
        Self {
            dsync,
            resources,
            state: Mutex::new(HoldState::default()),
        }
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn is_write_locked(&self) -> bool {
        self.state().write.is_some()
    }

    /// Number of shared grants this instance currently holds.
    pub fn readers(&self) -> usize {
        self.state().reads.len()
    }

    /// Blocks until the exclusive lock is acquired. Returns false only when
    /// the mutex names no resources.
    pub async fn lock(&self, id: &str, source: &str) -> bool {
        self.lock_blocking(&CancellationToken::new(), None, id, source, false, Options::default())
            .await
    }

    /// Blocks until a shared lock is acquired.
    pub async fn rlock(&self, id: &str, source: &str) -> bool {
        self.lock_blocking(&CancellationToken::new(), None, id, source, true, Options::default())
            .await
    }

    /// Tries to acquire the exclusive lock until `opts.timeout` elapses or
    /// `ctx` is cancelled. `lost` fires if the lock is later presumed lost.
    pub async fn get_lock(
        &self,
        ctx: &CancellationToken,
        lost: Option<LockLost>,
        id: &str,
        source: &str,
        opts: Options,
    ) -> bool {
        self.lock_blocking(ctx, lost, id, source, false, opts).await
    }

    pub async fn get_rlock(
        &self,
        ctx: &CancellationToken,
        lost: Option<LockLost>,
        id: &str,
        source: &str,
        opts: Options,
    ) -> bool {
        self.lock_blocking(ctx, lost, id, source, true, opts).await
    }

    pub async fn unlock(&self) {
        let hold = self.state().write.take();
        match hold {
            Some(hold) => hold.release(false).await,
            None => warn!(resources = ?self.resources, "dsync unlock without a held write lock"),
        }
    }

    /// Releases the oldest shared grant held by this instance.
    pub async fn runlock(&self) {
        let hold = self.state().reads.pop_front();
        match hold {
            Some(hold) => hold.release(true).await,
            None => warn!(resources = ?self.resources, "dsync runlock without a held read lock"),
        }
    }

    async fn lock_blocking(
        &self,
        ctx: &CancellationToken,
        lost: Option<LockLost>,
        id: &str,
        source: &str,
        read_lock: bool,
        opts: Options,
    ) -> bool {
        if self.resources.is_empty() {
            warn!(source, "dsync lock requested without resources");
            return false;
        }

        let config = *self.dsync.config();
        let deadline = Instant::now().checked_add(opts.timeout);
        let mut attempt = 0u32;

        loop {
            if ctx.is_cancelled() {
                return false;
            }
            attempt = attempt.saturating_add(1);

            match self.dsync.lockers() {
                Err(err) => {
                    debug!(resources = ?self.resources, attempt, error = %err, "dsync attempt skipped");
                }
                Ok(set) => {
                    let args = LockArgs::new(
                        id.to_string(),
                        self.resources.clone(),
                        self.dsync.owner().to_string(),
                        source.to_string(),
                        quorum::quorum(set.len()),
                    );
                    let client = DsyncClient::new(set, config.timeouts);
                    let outcome = client.acquire(&args, read_lock).await;

                    if outcome.succeeded {
                        if ctx.is_cancelled() {
                            client.release(&args, &outcome.granted, read_lock).await;
                            return false;
                        }
                        debug!(
                            uid = %args.uid,
                            resources = ?args.resources,
                            read_lock,
                            attempt,
                            locks_acquired = outcome.locks_acquired,
                            "dsync lock acquired"
                        );
                        self.install(ctx, lost, args, client, outcome.granted, read_lock);
                        return true;
                    }

                    debug!(
                        uid = %args.uid,
                        read_lock,
                        attempt,
                        locks_acquired = outcome.locks_acquired,
                        quorum = outcome.quorum,
                        "dsync acquire attempt failed"
                    );
                }
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return false;
            }

            let delay = quorum::retry_delay(&config.retry, &mut rand::rng());
            tokio::select! {
                _ = ctx.cancelled() => return false,
                _ = wait_deadline(deadline) => return false,
                _ = sleep(delay) => {}
            }
        }
    }

    fn install(
        &self,
        ctx: &CancellationToken,
        lost: Option<LockLost>,
        args: LockArgs,
        client: DsyncClient,
        granted: Vec<bool>,
        read_lock: bool,
    ) {
        let stop = ctx.child_token();
        let handle = tokio::spawn(refresh_loop(
            Arc::clone(&self.dsync),
            client.clone(),
            args.clone(),
            granted.clone(),
            read_lock,
            stop.clone(),
            lost,
        ));

        let hold = Hold {
            args,
            client,
            granted,
            refresh: RefreshTask { stop, handle },
        };

        let mut state = self.state();
        if read_lock {
            state.reads.push_back(hold);
        } else if let Some(previous) = state.write.replace(hold) {
            warn!(uid = %previous.args.uid, "dsync write lock acquired twice on one mutex");
            previous.refresh.stop.cancel();
        }
    }

    fn state(&self) -> MutexGuard<'_, HoldState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for DRWMutex {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        for hold in state.write.iter().chain(state.reads.iter()) {
            hold.refresh.stop.cancel();
        }
    }
}

impl fmt::Debug for DRWMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DRWMutex")
            .field("resources", &self.resources)
            .field("write_locked", &self.is_write_locked())
            .field("readers", &self.readers())
            .finish()
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn refresh_loop(
    dsync: Arc<Dsync>,
    client: DsyncClient,
    args: LockArgs,
    granted: Vec<bool>,
    read_lock: bool,
    stop: CancellationToken,
    lost: Option<LockLost>,
) {
    let interval = dsync.config().refresh_interval;
    let Some(start) = Instant::now().checked_add(interval).filter(|_| !interval.is_zero()) else {
        warn!(uid = %args.uid, ?interval, "dsync refresh interval unusable, lock presumed lost");
        if let Some(lost) = lost {
            lost();
        }
        return;
    };
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let reason = if !dsync.is_current(client.set().id()) {
            Some("locker set changed")
        } else {
            let outcome = tokio::select! {
                _ = stop.cancelled() => return,
                outcome = client.refresh(&args, &granted) => outcome,
            };
            debug!(
                uid = %args.uid,
                refreshed = outcome.refreshed,
                lock_not_found = outcome.lock_not_found,
                unreachable = outcome.unreachable,
                "dsync refresh"
            );
            outcome.quorum_lost.then_some("refresh quorum lost")
        };

        if let Some(reason) = reason {
            warn!(
                uid = %args.uid,
                resources = ?args.resources,
                read_lock,
                reason,
                "dsync lock presumed lost"
            );
            if let Some(lost) = lost {
                lost();
            }
            return;
        }
    }
}
