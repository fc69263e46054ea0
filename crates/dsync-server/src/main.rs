use std::{sync::Arc, time::Duration};

use clap::Parser;
use dsync::{DsyncConfig, LocalLocker};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dsync-lockd", about = "Lock node serving dsync grant requests over HTTP")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value = "9100")]
    port: u16,

    /// Name reported in logs; defaults to host:port.
    #[arg(long)]
    name: Option<String>,

    /// Grants not refreshed for this many seconds are dropped.
    #[arg(long, default_value = "60")]
    lock_validity_secs: u64,

    #[arg(long, default_value = "30")]
    expiry_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("dsync=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let addr = format!("{}:{}", cli.host, cli.port);
    let name = cli.name.clone().unwrap_or_else(|| addr.clone());

    let lock_validity = Duration::from_secs(cli.lock_validity_secs);
    let expiry_interval = Duration::from_secs(cli.expiry_interval_secs.max(1));
    let client_config = DsyncConfig::from_env()?;
    if lock_validity <= client_config.refresh_interval {
        warn!(
            ?lock_validity,
            refresh_interval = ?client_config.refresh_interval,
            "lock validity does not exceed the client refresh interval; held locks will expire"
        );
    }

    let locker = Arc::new(LocalLocker::new(name.clone()));

    let expiry_locker = Arc::clone(&locker);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(expiry_interval);
        loop {
            interval.tick().await;
            let expired = expiry_locker.expire_older_than(lock_validity);
            if expired > 0 {
                info!(expired, "dropped unrefreshed grants");
            } else {
                debug!("no stale grants");
            }
        }
    });
    info!(?lock_validity, ?expiry_interval, "stale grant expiry enabled");

    let app = dsync_rest::lock_router(locker);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(node = %name, "dsync lock node listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
