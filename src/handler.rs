//! Request handling at the chat-transport boundary
//!
//! [`RequestHandler`] is the glue between an inbound text message and the
//! executor: validate, submit, then drive the external [`Delivery`]
//! collaborator with either the artifact or a user-facing failure category.
//! Nothing here can fail the caller — delivery errors are logged and
//! swallowed, and a failed delivery still releases the artifact.

use crate::error::Result;
use crate::executor::{JobExecutor, JobOutcome};
use crate::types::{FailureReason, UserId};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// User-facing failure category
///
/// Maps 1:1 from [`FailureReason`], but carries no internal detail: the
/// delivery layer renders these however the platform requires. Rendering
/// text is deliberately out of scope here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureCategory {
    /// The message was not a usable http/https link
    InvalidLink,
    /// The fetch failed for an internal reason; suggest retrying later
    TryAgainLater,
    /// The media is larger than the configured delivery limit
    TooLarge,
    /// The fetch did not finish within the deadline
    TookTooLong,
    /// The service is shutting down or refusing new work
    Unavailable,
}

impl From<&FailureReason> for FailureCategory {
    fn from(reason: &FailureReason) -> Self {
        match reason {
            FailureReason::InvalidInput => FailureCategory::InvalidLink,
            FailureReason::Fetch(_) => FailureCategory::TryAgainLater,
            FailureReason::SizeLimitExceeded { .. } => FailureCategory::TooLarge,
            FailureReason::Timeout => FailureCategory::TookTooLong,
            FailureReason::ShuttingDown => FailureCategory::Unavailable,
        }
    }
}

/// Outbound delivery collaborator (the chat transport)
///
/// Implementations transmit messages and media to the requesting user.
/// `send_result` receives the artifact path for the duration of the call
/// only; the handler deletes the file once the call returns, whether it
/// succeeded or not.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Tell the user their request is being worked on
    async fn send_progress(&self, user: UserId, text: &str) -> Result<()>;

    /// Deliver the fetched media
    async fn send_result(&self, user: UserId, artifact: &Path, caption: &str) -> Result<()>;

    /// Report a failure category
    async fn send_failure(&self, user: UserId, category: FailureCategory) -> Result<()>;
}

/// Orchestrates classification, job submission, and result delivery
/// for inbound chat messages
pub struct RequestHandler {
    executor: Arc<JobExecutor>,
    delivery: Arc<dyn Delivery>,
}

impl RequestHandler {
    /// Create a handler over an executor and a delivery collaborator
    pub fn new(executor: Arc<JobExecutor>, delivery: Arc<dyn Delivery>) -> Self {
        Self { executor, delivery }
    }

    /// Handle one inbound text message
    ///
    /// Invoked by the chat transport once per message; returns nothing and
    /// never fails — every outcome is routed to the delivery collaborator,
    /// and delivery errors are logged and swallowed.
    pub async fn handle_request(&self, raw_text: &str, user: UserId) {
        let text = raw_text.trim();

        if let Err(e) = self.delivery.send_progress(user, "Fetching your media…").await {
            // A lost progress message is not worth failing the job over
            tracing::debug!(user_id = %user, error = %e, "Progress message failed");
        }

        match self.executor.submit(text, user).await {
            JobOutcome::Success(success) => {
                let caption = success.platform.to_string();
                if let Err(e) = self
                    .delivery
                    .send_result(user, success.artifact.path(), &caption)
                    .await
                {
                    tracing::warn!(
                        job_id = %success.id,
                        user_id = %user,
                        error = %e,
                        "Result delivery failed"
                    );
                }
                // Delivery done (or given up on): release the artifact either way
                success.artifact.delete().await;
            }
            JobOutcome::Failure(reason) => {
                let category = FailureCategory::from(&reason);
                if let Err(e) = self.delivery.send_failure(user, category).await {
                    tracing::warn!(user_id = %user, error = %e, "Failure delivery failed");
                }
            }
        }
    }
}
