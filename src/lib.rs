//! # media-dl
//!
//! Managed download-job executor library for chat media-fetcher bots.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Deadline-strict** - every fetch job reaches a terminal state by its deadline
//! - **Leak-free** - temporary artifacts are owned and cleaned up on every exit path
//! - **Durable** - usage counters survive process restarts
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{CliFetcher, Config, Fetcher, JobExecutor, JobOutcome, StatsStore, UserId};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let fetcher: Arc<dyn Fetcher> = Arc::new(CliFetcher::new(&config.fetcher));
//!     let stats = Arc::new(StatsStore::load(config.stats_path().clone()).await);
//!     let executor = JobExecutor::new(config, stats, fetcher).await?;
//!
//!     match executor.submit("https://youtu.be/abc", UserId::new(1)).await {
//!         JobOutcome::Success(success) => {
//!             println!("fetched to {}", success.artifact.path().display());
//!             success.artifact.delete().await;
//!         }
//!         JobOutcome::Failure(reason) => println!("failed: {reason}"),
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Managed job execution (worker pool, deadline race, artifact ownership)
pub mod executor;
/// External fetch collaborator boundary
pub mod fetcher;
/// Request handling at the chat-transport boundary
pub mod handler;
/// Platform classification from URL hosts
pub mod platform;
/// Durable usage statistics
pub mod stats;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, FetcherConfig, PersistenceConfig};
pub use error::{Error, FetchError, Result};
pub use executor::{JobExecutor, JobOutcome, JobSuccess, TempArtifact};
pub use fetcher::{CliFetcher, Fetcher};
pub use handler::{Delivery, FailureCategory, RequestHandler};
pub use stats::StatsStore;
pub use types::{Event, FailureReason, JobId, JobStatus, Platform, StatsSnapshot, UserId};

/// Helper function to run the executor with graceful signal handling.
///
/// Waits for a termination signal and then calls the executor's `shutdown()`
/// method, after which new submissions are rejected while in-flight jobs run
/// to their own deadlines.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(executor: JobExecutor) {
    wait_for_signal().await;
    executor.shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
