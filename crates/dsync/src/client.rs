use std::time::Duration;

use futures::{StreamExt, stream::FuturesUnordered};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    config::Timeouts,
    lock_args::LockArgs,
    locker::NetLocker,
    provider::LockerSet,
    quorum::{self, Outcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Lock,
    RLock,
    Unlock,
    RUnlock,
    Refresh,
    ForceUnlock,
}

impl Call {
    fn grant(read_lock: bool) -> Self {
        if read_lock { Self::RLock } else { Self::Lock }
    }

    fn revoke(read_lock: bool) -> Self {
        if read_lock { Self::RUnlock } else { Self::Unlock }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::RLock => "rlock",
            Self::Unlock => "unlock",
            Self::RUnlock => "runlock",
            Self::Refresh => "refresh",
            Self::ForceUnlock => "force-unlock",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcquireOutcome {
    pub outcomes: Vec<Outcome>,
    pub granted: Vec<bool>,
    pub locks_acquired: usize,
    pub quorum: usize,
    pub succeeded: bool,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub refreshed: usize,
    pub lock_not_found: usize,
    pub unreachable: usize,
    pub quorum_lost: bool,
}

/// Fans locker calls out over one [`LockerSet`] and folds the replies.
///
/// Every call is issued concurrently and bounded by its own deadline from
/// [`Timeouts`], so no method here can wait on a node longer than that.
#[derive(Debug, Clone)]
pub struct DsyncClient {
    set: LockerSet,
    timeouts: Timeouts,
}

impl DsyncClient {
    pub fn new(set: LockerSet, timeouts: Timeouts) -> Self {
        Self { set, timeouts }
    }

    pub fn set(&self) -> &LockerSet {
        &self.set
    }

    pub async fn lock(&self, args: &LockArgs) -> AcquireOutcome {
        self.acquire(args, false).await
    }

    pub async fn rlock(&self, args: &LockArgs) -> AcquireOutcome {
        self.acquire(args, true).await
    }

    /// One acquisition attempt. Waits for every node (or its deadline) and
    /// then decides; on failure the partial grants are revoked before
    /// returning.
    pub async fn acquire(&self, args: &LockArgs, read_lock: bool) -> AcquireOutcome {
        let total = self.set.len();
        let targets = vec![true; total];
        let outcomes = self
            .fan_out(
                Call::grant(read_lock),
                args,
                &targets,
                self.timeouts.acquire,
                Outcome::Unreachable,
            )
            .await;

        let granted: Vec<bool> = outcomes
            .iter()
            .map(|outcome| *outcome == Outcome::Granted)
            .collect();
        let locks_acquired = quorum::count(&outcomes, Outcome::Granted);
        let succeeded = quorum::is_acquired(&outcomes, args.quorum);

        // A call that timed out may still land on its node later.
        let stragglers: Vec<bool> = outcomes
            .iter()
            .map(|outcome| *outcome == Outcome::Unreachable)
            .collect();

        if succeeded {
            if stragglers.contains(&true) {
                self.spawn_release(args.clone(), stragglers, read_lock);
            }
        } else {
            let cleanup: Vec<bool> = granted
                .iter()
                .zip(&stragglers)
                .map(|(granted, straggler)| *granted || *straggler)
                .collect();
            if cleanup.contains(&true) {
                debug!(
                    uid = %args.uid,
                    read_lock,
                    locks_acquired,
                    quorum = args.quorum,
                    "dsync acquire missed quorum; releasing partial grants"
                );
                self.release(args, &cleanup, read_lock).await;
            }
        }

        AcquireOutcome {
            outcomes,
            granted,
            locks_acquired,
            quorum: args.quorum,
            succeeded,
        }
    }

    /// Checks the grants recorded in `granted`. Nodes that never granted
    /// count as not holding the lock.
    pub async fn refresh(&self, args: &LockArgs, granted: &[bool]) -> RefreshOutcome {
        let outcomes = self
            .fan_out(
                Call::Refresh,
                args,
                granted,
                self.timeouts.refresh_call,
                Outcome::Denied,
            )
            .await;

        RefreshOutcome {
            refreshed: quorum::count(&outcomes, Outcome::Granted),
            lock_not_found: quorum::count(&outcomes, Outcome::Denied),
            unreachable: quorum::count(&outcomes, Outcome::Unreachable),
            quorum_lost: quorum::is_refresh_lost(&outcomes, args.quorum),
        }
    }

    /// Best-effort revoke of the grants in `granted`. Returns how many nodes
    /// confirmed the release; failures are logged and dropped.
    pub async fn release(&self, args: &LockArgs, granted: &[bool], read_lock: bool) -> usize {
        let call = Call::revoke(read_lock);
        let outcomes = self
            .fan_out(
                call,
                args,
                granted,
                self.timeouts.unlock_call,
                Outcome::Granted,
            )
            .await;

        let mut released = 0usize;
        for (index, outcome) in outcomes.iter().enumerate() {
            if !granted.get(index).copied().unwrap_or(false) {
                continue;
            }
            match outcome {
                Outcome::Granted => released += 1,
                Outcome::Denied => {
                    debug!(uid = %args.uid, node = index, call = call.as_str(), "dsync release found no grant");
                }
                Outcome::Unreachable => {
                    warn!(uid = %args.uid, node = index, call = call.as_str(), "dsync release did not reach node");
                }
            }
        }
        released
    }

    /// Releases in the background; used for grants that may have landed
    /// after their call was abandoned.
    pub fn spawn_release(&self, args: LockArgs, granted: Vec<bool>, read_lock: bool) {
        let client = self.clone();
        tokio::spawn(async move {
            client.release(&args, &granted, read_lock).await;
        });
    }

    /// Drops the named grants on every node regardless of owner.
    pub async fn force_unlock(&self, args: &LockArgs) -> usize {
        let targets = vec![true; self.set.len()];
        let outcomes = self
            .fan_out(
                Call::ForceUnlock,
                args,
                &targets,
                self.timeouts.force_unlock_call,
                Outcome::Unreachable,
            )
            .await;
        quorum::count(&outcomes, Outcome::Granted)
    }

    async fn fan_out(
        &self,
        call: Call,
        args: &LockArgs,
        targets: &[bool],
        deadline: Duration,
        skipped: Outcome,
    ) -> Vec<Outcome> {
        let mut outcomes = vec![skipped; self.set.len()];
        let mut pending = FuturesUnordered::new();

        for (index, locker) in self.set.lockers().iter().enumerate() {
            if !targets.get(index).copied().unwrap_or(false) {
                continue;
            }

            pending.push(async move {
                let outcome = invoke(locker.as_ref(), call, args, deadline).await;
                (index, outcome)
            });
        }

        while let Some((index, outcome)) = pending.next().await {
            outcomes[index] = outcome;
        }

        outcomes
    }
}

async fn invoke(locker: &dyn NetLocker, call: Call, args: &LockArgs, deadline: Duration) -> Outcome {
    if !locker.is_online() {
        return Outcome::Unreachable;
    }

    let request = match call {
        Call::Lock => locker.lock(args),
        Call::RLock => locker.rlock(args),
        Call::Unlock => locker.unlock(args),
        Call::RUnlock => locker.runlock(args),
        Call::Refresh => locker.refresh(args),
        Call::ForceUnlock => locker.force_unlock(args),
    };

    match timeout(deadline, request).await {
        Ok(Ok(true)) => Outcome::Granted,
        Ok(Ok(false)) => Outcome::Denied,
        Ok(Err(err)) => {
            debug!(endpoint = %locker.endpoint(), call = call.as_str(), error = %err, "locker call failed");
            Outcome::Unreachable
        }
        Err(_) => {
            debug!(endpoint = %locker.endpoint(), call = call.as_str(), ?deadline, "locker call timed out");
            Outcome::Unreachable
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crate::{
        LocalLocker, LockArgs, NetLocker, Outcome,
        config::Timeouts,
        provider::LockerSet,
    };

    use super::DsyncClient;

    fn setup(count: usize) -> (Vec<Arc<LocalLocker>>, DsyncClient) {
        let nodes: Vec<Arc<LocalLocker>> = (0..count)
            .map(|index| Arc::new(LocalLocker::new(format!("node-{index}"))))
            .collect();
        let lockers = nodes
            .iter()
            .map(|node| Arc::clone(node) as Arc<dyn NetLocker>)
            .collect();
        let timeouts = Timeouts {
            acquire: Duration::from_millis(200),
            refresh_call: Duration::from_millis(200),
            unlock_call: Duration::from_millis(200),
            force_unlock_call: Duration::from_millis(200),
        };
        (nodes, DsyncClient::new(LockerSet::fresh(lockers), timeouts))
    }

    fn args(uid: &str) -> LockArgs {
        LockArgs::new(
            uid.to_string(),
            vec!["bucket/object".to_string()],
            "owner".to_string(),
            "client.rs".to_string(),
            3,
        )
    }

    #[tokio::test]
    async fn acquire_grants_on_every_free_node() {
        let (nodes, client) = setup(5);
        let outcome = client.lock(&args("a")).await;

        assert!(outcome.succeeded);
        assert_eq!(outcome.locks_acquired, 5);
        assert!(nodes.iter().all(|node| node.held_count() == 1));
    }

    #[tokio::test]
    async fn failed_acquire_revokes_partial_grants() {
        let (nodes, client) = setup(5);
        for node in &nodes[..3] {
            assert!(node.grant_lock(&args("other")));
        }

        let outcome = client.lock(&args("mine")).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.locks_acquired, 2);
        assert_eq!(&outcome.outcomes[..3], &[Outcome::Denied; 3]);

        for node in &nodes[3..] {
            assert_eq!(node.held_count(), 0);
        }
        for node in &nodes[..3] {
            assert!(node.holds_uid("other"));
        }
    }

    #[tokio::test]
    async fn refresh_counts_nodes_that_never_granted_as_absent() {
        let (nodes, client) = setup(5);
        let lock_args = args("a");
        for node in &nodes[..3] {
            assert!(node.grant_lock(&lock_args));
        }
        let granted = vec![true, true, true, false, false];

        let outcome = client.refresh(&lock_args, &granted).await;
        assert_eq!(outcome.refreshed, 3);
        assert_eq!(outcome.lock_not_found, 2);
        assert!(!outcome.quorum_lost);

        nodes[0].force_release(&lock_args);
        let outcome = client.refresh(&lock_args, &granted).await;
        assert_eq!(outcome.refreshed, 2);
        assert!(outcome.quorum_lost);
    }

    #[tokio::test]
    async fn release_reports_confirmed_revokes() {
        let (nodes, client) = setup(3);
        let lock_args = args("a");
        let outcome = client.lock(&lock_args).await;
        assert!(outcome.succeeded);

        let released = client.release(&lock_args, &outcome.granted, false).await;
        assert_eq!(released, 3);
        assert!(nodes.iter().all(|node| node.held_count() == 0));
    }

    #[tokio::test]
    async fn force_unlock_drops_foreign_grants() {
        let (nodes, client) = setup(3);
        for node in &nodes {
            assert!(node.grant_lock(&args("someone-else")));
        }

        let mut force_args = args("");
        force_args.owner = "operator".to_string();
        assert_eq!(client.force_unlock(&force_args).await, 3);
        assert!(nodes.iter().all(|node| node.held_count() == 0));
    }
}
