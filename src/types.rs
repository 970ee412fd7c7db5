//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a fetch job
///
/// A v4 UUID: job ids seed temporary artifact paths, so they must be unique
/// under concurrent submissions and across process restarts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh random JobId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner Uuid value
    pub fn get(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Simple (dashless) form keeps artifact filenames compact
        write!(f, "{}", self.0.simple())
    }
}

/// Identifier of the requesting user on the messaging platform
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a new UserId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source platform of a requested URL
///
/// Derived from the URL host by [`Platform::classify`](crate::platform);
/// hosts matching no known pattern are tagged [`Platform::Generic`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// youtube.com / youtu.be
    Youtube,
    /// instagram.com
    Instagram,
    /// tiktok.com
    Tiktok,
    /// twitter.com / x.com
    Twitter,
    /// facebook.com / fb.watch
    Facebook,
    /// pinterest.com / pin.it
    Pinterest,
    /// Any host not matching a known pattern
    Generic,
}

impl Platform {
    /// Stable lowercase name, used in stats buckets and artifact filenames
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
            Platform::Pinterest => "pinterest",
            Platform::Generic => "generic",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job status
///
/// Every job reaches exactly one of the three terminal states
/// (Succeeded, Failed, TimedOut), set by whichever of normal completion,
/// fetch error, or deadline expiry happens first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, waiting for a worker slot
    Pending,
    /// Dispatched to a worker
    Running,
    /// Fetch completed and artifact passed validation
    Succeeded,
    /// Fetch raised an error or the artifact failed validation
    Failed,
    /// Deadline expired before the fetch finished
    TimedOut,
}

impl JobStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

/// Why a job failed
///
/// This is the tagged outcome the executor returns instead of raising: callers
/// match exhaustively on all failure modes at compile time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The input was not a syntactically valid http/https URL.
    /// Rejected before a worker slot is consumed; never recorded in stats.
    InvalidInput,

    /// The external fetch call failed; the underlying cause is preserved
    /// for logging but reported to users generically
    Fetch(String),

    /// The fetched artifact exceeds the configured size limit
    SizeLimitExceeded {
        /// Actual artifact size in bytes
        size_bytes: u64,
        /// Configured limit in bytes
        limit_bytes: u64,
    },

    /// The deadline expired before the fetch finished
    Timeout,

    /// The executor is shutting down and not accepting new jobs.
    /// Rejected before a worker slot is consumed; never recorded in stats.
    ShuttingDown,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InvalidInput => write!(f, "invalid input"),
            FailureReason::Fetch(cause) => write!(f, "fetch failed: {cause}"),
            FailureReason::SizeLimitExceeded {
                size_bytes,
                limit_bytes,
            } => write!(
                f,
                "artifact exceeds size limit: {size_bytes} bytes (limit {limit_bytes})"
            ),
            FailureReason::Timeout => write!(f, "deadline exceeded"),
            FailureReason::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Event emitted during the job lifecycle
///
/// Consumers subscribe via [`JobExecutor::subscribe`](crate::JobExecutor::subscribe);
/// with no subscribers events are silently dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted and queued for a worker slot
    Accepted {
        /// Job ID
        id: JobId,
        /// Classified platform
        platform: Platform,
        /// Requesting user
        user_id: UserId,
    },

    /// Job dispatched to a worker, fetch in progress
    Fetching {
        /// Job ID
        id: JobId,
    },

    /// Fetch completed and artifact passed validation
    Succeeded {
        /// Job ID
        id: JobId,
        /// Artifact size in bytes
        size_bytes: u64,
    },

    /// Job failed (fetch error or size violation)
    Failed {
        /// Job ID
        id: JobId,
        /// Failure description
        error: String,
    },

    /// Deadline expired before the fetch finished
    TimedOut {
        /// Job ID
        id: JobId,
    },

    /// Usage counters were explicitly reset
    StatsReset,

    /// Graceful shutdown initiated
    Shutdown,
}

/// Immutable copy of the usage counters, for reporting
///
/// Returned by [`StatsStore::snapshot`](crate::StatsStore::snapshot) and
/// persisted verbatim as the stats file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Number of successfully completed jobs since the last reset
    #[serde(default)]
    pub total_downloads: u64,

    /// Number of failed or timed-out jobs since the last reset
    #[serde(default)]
    pub failed_downloads: u64,

    /// Successful downloads per platform
    #[serde(default)]
    pub platforms: HashMap<Platform, u64>,

    /// Successful downloads per user (keys are decimal user ids)
    #[serde(default)]
    pub users: HashMap<String, u64>,

    /// When the counters were last mutated or reset
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self {
            total_downloads: 0,
            failed_downloads: 0,
            platforms: HashMap::new(),
            users: HashMap::new(),
            updated_at: Utc::now(),
        }
    }
}

impl StatsSnapshot {
    /// Whether every counter is zero
    pub fn is_zeroed(&self) -> bool {
        self.total_downloads == 0
            && self.failed_downloads == 0
            && self.platforms.is_empty()
            && self.users.is_empty()
    }
}
