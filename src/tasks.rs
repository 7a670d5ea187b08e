//! Background sweeps spawned from `main`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::repo::{Repo, RepoResult};
use crate::statistics::refresh_snapshot;
use crate::storage::ObjectStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub expired_codes: u64,
    pub unverified_users: u64,
}

/// Drop expired verification codes and accounts that never verified, along
/// with the stored objects of those accounts. Object deletes are best effort.
pub async fn cleanup_once(
    repo: &dyn Repo,
    store: &dyn ObjectStore,
    now: DateTime<Utc>,
    unverified_ttl: chrono::Duration,
) -> RepoResult<CleanupReport> {
    let expired_codes = repo.delete_expired_codes(now).await?;
    let swept = repo.delete_unverified_before(now - unverified_ttl).await?;
    for file in &swept.files {
        if let Err(e) = store.delete(&file.filename).await {
            warn!(file_id = file.id, key = %file.filename, error = %e, "object delete failed");
        }
    }
    Ok(CleanupReport { expired_codes, unverified_users: swept.users })
}

/// Refresh today's snapshot of every channel. Returns how many succeeded;
/// a failing channel is logged and skipped.
pub async fn refresh_all_statistics(repo: &dyn Repo, now: DateTime<Utc>) -> RepoResult<usize> {
    let today = now.date_naive();
    let mut refreshed = 0;
    for channel_id in repo.list_channel_ids().await? {
        match refresh_snapshot(repo, channel_id, today).await {
            Ok(_) => refreshed += 1,
            Err(e) => warn!(channel_id, error = %e, "statistics refresh failed"),
        }
    }
    Ok(refreshed)
}

pub fn spawn_cleanup(
    repo: Arc<dyn Repo>,
    store: Arc<dyn ObjectStore>,
    every: Duration,
    unverified_ttl: chrono::Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            match cleanup_once(repo.as_ref(), store.as_ref(), Utc::now(), unverified_ttl).await {
                Ok(r) => info!(
                    expired_codes = r.expired_codes,
                    unverified_users = r.unverified_users,
                    "cleanup sweep finished"
                ),
                Err(e) => error!(error = %e, "cleanup sweep failed"),
            }
        }
    });
}

pub fn spawn_statistics(repo: Arc<dyn Repo>, every: Duration) {
    tokio::spawn(async move {
        loop {
            match refresh_all_statistics(repo.as_ref(), Utc::now()).await {
                Ok(n) => info!(channels = n, "statistics sweep finished"),
                Err(e) => error!(error = %e, "statistics sweep failed"),
            }
            tokio::time::sleep(every).await;
        }
    });
}
