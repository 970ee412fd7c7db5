//! The external fetch collaborator boundary
//!
//! The actual media-retrieval algorithm is an opaque, blocking external call.
//! [`Fetcher`] is the seam: the executor runs it on a blocking worker and
//! converts every possible misbehavior into a [`FetchError`] before it can
//! touch the pool. [`CliFetcher`] is the production implementation, shelling
//! out to a yt-dlp-compatible downloader binary.

use crate::config::FetcherConfig;
use crate::error::FetchError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Maximum bytes of diagnostic output preserved from a failed fetch
const STDERR_TAIL_BYTES: usize = 2048;

/// Blocking fetch seam
///
/// Implementations download the resource at `url` to a file derived from
/// `output_template` and return the final path. The call runs on a dedicated
/// blocking worker; it should honor `cancel` on a best-effort basis, but the
/// executor does not depend on it — an uncancellable fetch is abandoned, not
/// awaited.
pub trait Fetcher: Send + Sync + 'static {
    /// Download `url` to a path derived from `output_template`
    ///
    /// `output_template` is a path prefix unique to the job (platform + job
    /// id); the implementation may append an extension. Returns the path of
    /// the produced artifact.
    fn fetch(
        &self,
        url: &Url,
        output_template: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError>;

    /// Implementation name, for logging
    fn name(&self) -> &'static str {
        "fetcher"
    }
}

/// Fetcher that invokes an external downloader binary
///
/// Runs `<binary> [extra_args..] -o <template>.%(ext)s <url>`, the yt-dlp
/// output-template convention. The child's stderr is captured to a sidecar
/// file so a chatty download can never deadlock on a full pipe; on failure
/// the tail of that file becomes the error detail.
///
/// Cancellation is polled: when the token fires, the child is killed and the
/// call returns [`FetchError::Cancelled`].
pub struct CliFetcher {
    binary_path: PathBuf,
    extra_args: Vec<String>,
    cancel_poll: Duration,
}

impl CliFetcher {
    /// Create a fetcher from configuration
    pub fn new(config: &FetcherConfig) -> Self {
        Self {
            binary_path: config.binary_path.clone(),
            extra_args: config.extra_args.clone(),
            cancel_poll: Duration::from_millis(config.cancel_poll_ms),
        }
    }

    fn stderr_log_path(template: &Path) -> PathBuf {
        let mut name = template.as_os_str().to_os_string();
        name.push(".stderr.log");
        PathBuf::from(name)
    }
}

impl Fetcher for CliFetcher {
    fn fetch(
        &self,
        url: &Url,
        output_template: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, FetchError> {
        let stderr_log = Self::stderr_log_path(output_template);
        let stderr_file = std::fs::File::create(&stderr_log)
            .map_err(|e| FetchError::Launch(format!("cannot create stderr log: {e}")))?;

        let mut template_arg = output_template.as_os_str().to_os_string();
        template_arg.push(".%(ext)s");

        let mut child = Command::new(&self.binary_path)
            .args(&self.extra_args)
            .arg("-o")
            .arg(&template_arg)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|e| {
                let _ = std::fs::remove_file(&stderr_log);
                FetchError::Launch(format!("{}: {e}", self.binary_path.display()))
            })?;

        // Poll for exit, honoring cancellation between polls
        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                let _ = std::fs::remove_file(&stderr_log);
                return Err(FetchError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => std::thread::sleep(self.cancel_poll),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = std::fs::remove_file(&stderr_log);
                    return Err(FetchError::Failed {
                        code: None,
                        detail: format!("wait failed: {e}"),
                    });
                }
            }
        };

        let detail = read_tail(&stderr_log, STDERR_TAIL_BYTES);
        let _ = std::fs::remove_file(&stderr_log);

        if !status.success() {
            return Err(FetchError::Failed {
                code: status.code(),
                detail,
            });
        }

        resolve_output(output_template).ok_or_else(|| FetchError::NoArtifact {
            template: output_template.to_path_buf(),
        })
    }

    fn name(&self) -> &'static str {
        "cli-downloader"
    }
}

/// Locate the artifact a downloader produced for a template prefix
///
/// The binary appends its own extension, so the produced file is whichever
/// sibling starts with `<template file name>.` — partial-download droppings
/// (`.part`, `.ytdl`) are ignored. With several candidates the most recently
/// modified wins.
fn resolve_output(template: &Path) -> Option<PathBuf> {
    let dir = template.parent()?;
    let stem = template.file_name()?.to_str()?;
    let prefix = format!("{stem}.");

    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir).ok()?.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) {
            continue;
        }
        if name.ends_with(".part") || name.ends_with(".ytdl") || name.ends_with(".stderr.log") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        match &best {
            Some((t, _)) if *t >= modified => {}
            _ => best = Some((modified, entry.path())),
        }
    }
    best.map(|(_, path)| path)
}

/// Read the last `limit` bytes of a file as lossy UTF-8
fn read_tail(path: &Path, limit: usize) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let start = bytes.len().saturating_sub(limit);
            String::from_utf8_lossy(&bytes[start..]).trim().to_string()
        }
        Err(_) => String::new(),
    }
}
