use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dsync::{LockArgs, NetLocker};
use dsync_common::error::{DsyncError, Result};
use tracing::{info, warn};
use url::Url;

use crate::types::{
    LockReply, PATH_FORCE_UNLOCK, PATH_HEALTH, PATH_LOCK, PATH_REFRESH, PATH_RLOCK, PATH_RUNLOCK,
    PATH_UNLOCK, route,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// [`NetLocker`] backed by a remote `dsync-lockd` node.
#[derive(Debug)]
pub struct RestLocker {
    endpoint: String,
    base: Url,
    client: reqwest::Client,
    online: AtomicBool,
    probing: AtomicBool,
}

impl RestLocker {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|err| DsyncError::InternalError(format!("failed to build http client: {err}")))?;
        Self::with_client(endpoint, client)
    }

    pub fn with_client(endpoint: &str, client: reqwest::Client) -> Result<Self> {
        let endpoint = normalize_endpoint(endpoint);
        let base = Url::parse(&format!("{}/", ensure_http_scheme(&endpoint))).map_err(|err| {
            DsyncError::InvalidArgument(format!("invalid lock endpoint {endpoint}: {err}"))
        })?;

        Ok(Self {
            endpoint,
            base,
            client,
            online: AtomicBool::new(true),
            probing: AtomicBool::new(false),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(route(path).trim_start_matches('/'))
            .map_err(|err| DsyncError::InternalError(format!("invalid lock route {path}: {err}")))
    }

    async fn call(&self, path: &str, args: &LockArgs) -> Result<bool> {
        let url = self.url(path)?;
        let response = match self.client.post(url).json(args).send().await {
            Ok(response) => response,
            Err(err) => {
                self.mark_offline();
                if err.is_timeout() {
                    return Err(DsyncError::Timeout {
                        endpoint: self.endpoint.clone(),
                    });
                }
                return Err(DsyncError::Unreachable {
                    endpoint: self.endpoint.clone(),
                    reason: err.to_string(),
                });
            }
        };

        if !response.status().is_success() {
            return Err(DsyncError::InternalError(format!(
                "lock node {} returned status {} for {path}",
                self.endpoint,
                response.status()
            )));
        }

        let reply: LockReply = response.json().await.map_err(|err| DsyncError::Unreachable {
            endpoint: self.endpoint.clone(),
            reason: format!("malformed reply: {err}"),
        })?;
        Ok(reply.success)
    }

    /// Only demote the node when a prober is running to bring it back.
    fn mark_offline(&self) {
        if self.probing.load(Ordering::Relaxed) && self.online.swap(false, Ordering::Relaxed) {
            warn!(node = %self.endpoint, "lock node marked offline");
        }
    }

    pub async fn health_check(&self) -> bool {
        let healthy = match self.url(PATH_HEALTH) {
            Ok(url) => matches!(
                self.client.get(url).send().await,
                Ok(response) if response.status().is_success()
            ),
            Err(_) => false,
        };

        let was_online = self.online.swap(healthy, Ordering::Relaxed);
        if healthy && !was_online {
            info!(node = %self.endpoint, "lock node back online");
        } else if !healthy && was_online {
            warn!(node = %self.endpoint, "lock node marked offline");
        }
        healthy
    }

    /// Probes the node every `interval` while it is considered offline.
    pub fn start_health_checks(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.probing.store(true, Ordering::Relaxed);
        let locker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !locker.online.load(Ordering::Relaxed) {
                    locker.health_check().await;
                }
            }
        })
    }
}

#[async_trait]
impl NetLocker for RestLocker {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    async fn lock(&self, args: &LockArgs) -> Result<bool> {
        self.call(PATH_LOCK, args).await
    }

    async fn rlock(&self, args: &LockArgs) -> Result<bool> {
        self.call(PATH_RLOCK, args).await
    }

    async fn unlock(&self, args: &LockArgs) -> Result<bool> {
        self.call(PATH_UNLOCK, args).await
    }

    async fn runlock(&self, args: &LockArgs) -> Result<bool> {
        self.call(PATH_RUNLOCK, args).await
    }

    async fn refresh(&self, args: &LockArgs) -> Result<bool> {
        self.call(PATH_REFRESH, args).await
    }

    async fn force_unlock(&self, args: &LockArgs) -> Result<bool> {
        self.call(PATH_FORCE_UNLOCK, args).await
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

fn ensure_http_scheme(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
