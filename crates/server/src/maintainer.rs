//! Periodic Maintainer: a detached background task that prunes
//! exhausted rows, deep-cleans idle single-device users in production, and
//! keeps the cached release version fresh for `banner`/`download`.

use std::time::Duration;

use hishtory_data::{StorageAdapter, UnixMillis, PRUNE_DELETION_LIMIT, PRUNE_ENTRY_LIMIT};
use tokio::time::MissedTickBehavior;

use crate::error::AppError;
use crate::{config, engine, state};

const DEEP_CLEAN_MAX_AGE_DAYS: i64 = 90;
const RELEASES_URL: &str = "https://api.github.com/repos/hishtory-coordinator/hishtory-coordinator/releases/latest";

/// Runs one pass: prune, conditional deep clean, release-version refresh.
/// Usage-stats flushing is a no-op for the current adapters, which persist
/// usage synchronously, but stays a named step so a future buffering
/// adapter has somewhere to hook in.
pub async fn run_once(adapter: &dyn StorageAdapter) -> Result<(), AppError> {
    let (entries_removed, deletions_removed) = engine::retention::prune(adapter, PRUNE_ENTRY_LIMIT, PRUNE_DELETION_LIMIT).await?;
    tracing::info!(entries_removed, deletions_removed, "prune pass complete");

    if config::get().is_prod() {
        let older_than = UnixMillis::now().get() - DEEP_CLEAN_MAX_AGE_DAYS * 24 * 60 * 60 * 1000;
        match engine::retention::deep_clean(adapter, UnixMillis::from(older_than)).await {
            Ok(removed) => tracing::info!(removed, "deep clean pass complete"),
            Err(e) => tracing::warn!(error = ?e, "deep clean pass failed"),
        }
    }

    refresh_release_version().await;
    Ok(())
}

async fn refresh_release_version() {
    let client = reqwest::Client::new();
    let response = client.get(RELEASES_URL).header("User-Agent", "hishtory-coordinator").send().await;
    match response {
        Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
            Ok(body) => {
                if let Some(tag) = body.get("tag_name").and_then(|v| v.as_str()) {
                    state::set_cached_release_version(tag.to_owned());
                }
            }
            Err(e) => tracing::warn!(error = ?e, "failed to parse release info"),
        },
        Ok(resp) => tracing::warn!(status = %resp.status(), "release check returned non-success status"),
        Err(e) => tracing::warn!(error = ?e, "failed to reach release endpoint"),
    }
}

/// Spawns the detached maintainer loop, ticking at `prune_interval_secs`.
/// Missed ticks are skipped rather than queued: a slow pass should
/// not cause a burst of catch-up passes.
pub fn spawn(adapter: std::sync::Arc<dyn StorageAdapter>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = run_once(adapter.as_ref()).await {
                tracing::warn!(error = ?e, "maintainer pass failed");
            }
        }
    });
}
