//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Download behavior configuration (deadline, pool bound, size limit)
///
/// Groups settings related to how fetch jobs are executed.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Temporary directory for in-flight artifacts (default: "./tmp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum concurrent fetch jobs (default: 4)
    ///
    /// Jobs beyond this bound queue on the worker-pool semaphore in FIFO
    /// order; queue wait does not count against the fetch deadline.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Fetch deadline in milliseconds, measured from dispatch (default: 180000 = 3 min)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum artifact size in bytes (default: 49 MiB)
    ///
    /// Artifacts larger than this are discarded and the job fails with
    /// a size-limit violation rather than succeeding.
    #[serde(default = "default_max_artifact_size")]
    pub max_artifact_size_bytes: u64,
}

impl DownloadConfig {
    /// Fetch deadline as a [`Duration`]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_concurrent_fetches: default_max_concurrent(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_artifact_size_bytes: default_max_artifact_size(),
        }
    }
}

/// External fetcher binary configuration
///
/// The media-retrieval algorithm itself is an external tool (yt-dlp or
/// compatible); this names the binary and any extra arguments to pass.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Path to the downloader executable (default: "yt-dlp", resolved via PATH)
    #[serde(default = "default_fetcher_binary")]
    pub binary_path: PathBuf,

    /// Extra arguments appended before the URL (default: empty)
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Poll interval in milliseconds for cancellation checks while the
    /// child process runs (default: 200)
    #[serde(default = "default_cancel_poll_ms")]
    pub cancel_poll_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            binary_path: default_fetcher_binary(),
            extra_args: Vec::new(),
            cancel_poll_ms: default_cancel_poll_ms(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path of the persisted stats snapshot (default: "./media-dl-stats.json")
    #[serde(default = "default_stats_path")]
    pub stats_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            stats_path: default_stats_path(),
        }
    }
}

/// Main configuration for the job executor
///
/// Fields are organized into logical sub-configs for maintainability:
/// - [`download`](DownloadConfig) — deadline, pool bound, size limit, temp dir
/// - [`fetcher`](FetcherConfig) — external downloader binary
/// - [`persistence`](PersistenceConfig) — stats snapshot location
///
/// All sub-config fields are flattened for backward-compatible serialization,
/// meaning the JSON/TOML format remains flat (no nesting). Every field has a
/// sensible default, so `Config::default()` works out of the box.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fetch-execution settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External downloader binary settings
    #[serde(flatten)]
    pub fetcher: FetcherConfig,

    /// Data storage settings
    #[serde(flatten)]
    pub persistence: PersistenceConfig,
}

// Convenience accessors — allow call sites to use `config.temp_dir()` etc.
// without reaching through the sub-config structs.
impl Config {
    /// Temporary directory for in-flight artifacts
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Path of the persisted stats snapshot
    pub fn stats_path(&self) -> &PathBuf {
        &self.persistence.stats_path
    }

    /// Fetch deadline as a [`Duration`]
    pub fn fetch_timeout(&self) -> Duration {
        self.download.fetch_timeout()
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

fn default_max_concurrent() -> usize {
    4
}

fn default_fetch_timeout_ms() -> u64 {
    180_000
}

fn default_max_artifact_size() -> u64 {
    49 * 1024 * 1024
}

fn default_fetcher_binary() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_cancel_poll_ms() -> u64 {
    200
}

fn default_stats_path() -> PathBuf {
    PathBuf::from("./media-dl-stats.json")
}
