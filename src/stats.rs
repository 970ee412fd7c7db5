//! Durable usage statistics
//!
//! The [`StatsStore`] owns the persisted counters exclusively: all mutation
//! goes through its serialized operations, and the backing file is never
//! touched by any other component. Every mutating operation persists the full
//! snapshot before returning, so counters survive process restarts.
//!
//! Persistence is deliberately non-fatal in both directions:
//! - on load, a missing or corrupt file initializes zeroed counters and
//!   persists a fresh snapshot immediately
//! - on save, a write failure is logged and swallowed — a full disk must
//!   never fail an otherwise-successful job

use crate::types::{Platform, StatsSnapshot, UserId};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Durable, internally-synchronized usage counters
///
/// All operations are mutually exclusive with respect to each other:
/// concurrent jobs completing simultaneously cannot interleave counter
/// updates or persisted-file writes.
pub struct StatsStore {
    /// Backing file for the persisted snapshot
    path: PathBuf,
    /// Counters, serialized behind one async mutex
    inner: Mutex<StatsSnapshot>,
}

impl StatsStore {
    /// Load persisted counters, tolerating a missing or corrupt file
    ///
    /// A parse failure is never propagated: the store falls back to zeroed
    /// counters and persists a fresh snapshot immediately, so the next load
    /// sees a valid file again.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StatsSnapshot>(&bytes) {
                Ok(snapshot) => {
                    tracing::debug!(
                        path = %path.display(),
                        total = snapshot.total_downloads,
                        failed = snapshot.failed_downloads,
                        "Loaded persisted stats"
                    );
                    snapshot
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Stats file is corrupt, reinitializing counters to zero"
                    );
                    let fresh = StatsSnapshot::default();
                    persist(&path, &fresh).await;
                    fresh
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %path.display(),
                    "No stats file found, starting with zeroed counters"
                );
                let fresh = StatsSnapshot::default();
                persist(&path, &fresh).await;
                fresh
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Stats file is unreadable, starting with zeroed counters"
                );
                let fresh = StatsSnapshot::default();
                persist(&path, &fresh).await;
                fresh
            }
        };

        Self {
            path,
            inner: Mutex::new(snapshot),
        }
    }

    /// Record one successful job: increments the total, the platform bucket,
    /// and the user bucket, then persists
    pub async fn record_success(&self, user: UserId, platform: Platform) {
        let mut guard = self.inner.lock().await;
        guard.total_downloads += 1;
        *guard.platforms.entry(platform).or_insert(0) += 1;
        *guard.users.entry(user.to_string()).or_insert(0) += 1;
        guard.updated_at = Utc::now();
        persist(&self.path, &guard).await;
    }

    /// Record one failed or timed-out job, then persist
    pub async fn record_failure(&self) {
        let mut guard = self.inner.lock().await;
        guard.failed_downloads += 1;
        guard.updated_at = Utc::now();
        persist(&self.path, &guard).await;
    }

    /// Zero all counters and persist
    ///
    /// Idempotent: resetting an already-zeroed store persists the same
    /// zero state again.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        *guard = StatsSnapshot::default();
        persist(&self.path, &guard).await;
        tracing::info!("Usage counters reset");
    }

    /// Immutable copy of the current counters
    ///
    /// Holds the lock only for the duration of the clone, so a concurrent
    /// writer is never blocked for longer than the copy.
    pub async fn snapshot(&self) -> StatsSnapshot {
        self.inner.lock().await.clone()
    }
}

/// Persist a snapshot crash-tolerantly: write a sibling temp file, then
/// atomically rename it over the target so a partial write can never be
/// mistaken for a valid snapshot on the next load.
///
/// Failures are logged and swallowed; the next successful mutation persists
/// the complete current state.
async fn persist(path: &Path, snapshot: &StatsSnapshot) {
    let bytes = match serde_json::to_vec_pretty(snapshot) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize stats snapshot");
            return;
        }
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(
                    path = %parent.display(),
                    error = %e,
                    "Failed to create stats directory, skipping persist"
                );
                return;
            }
        }
    }

    let tmp = path.with_extension("json.tmp");
    if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
        tracing::warn!(
            path = %tmp.display(),
            error = %e,
            "Failed to write stats temp file, skipping persist"
        );
        return;
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to replace stats file, skipping persist"
        );
        // Leave no stray temp file behind
        let _ = tokio::fs::remove_file(&tmp).await;
    }
}
