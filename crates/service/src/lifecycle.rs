use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use gigboard_core::domain::job::{ChannelMessageId, Job, JobId};
use gigboard_core::domain::payload::JobPayload;
use gigboard_core::domain::user::{User, UserId};
use gigboard_core::entitlement::{self, Decision};
use gigboard_core::errors::{EditError, RetractError, SubmitError};
use gigboard_core::fingerprint::submission_fingerprint;
use gigboard_core::referral;
use gigboard_db::repositories::{
    CommitOutcome, JobRepository, NewJob, RepositoryError, UserRepository,
};
use gigboard_telegram::format;
use gigboard_telegram::gateway::ChannelGateway;

use crate::notify::OpsNotifier;

/// Drives a listing from submission to the channel and back out again.
///
/// The channel broadcast always precedes the storage commit. A commit that
/// then refuses compensates by deleting the broadcast copy, and a
/// compensation that itself fails is escalated so an operator can remove
/// the orphaned message by hand.
pub struct LifecycleService {
    users: Arc<dyn UserRepository>,
    jobs: Arc<dyn JobRepository>,
    gateway: Arc<dyn ChannelGateway>,
    notifier: Arc<dyn OpsNotifier>,
    dedup_window: Duration,
}

impl LifecycleService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        jobs: Arc<dyn JobRepository>,
        gateway: Arc<dyn ChannelGateway>,
        notifier: Arc<dyn OpsNotifier>,
        dedup_window_secs: u64,
    ) -> Self {
        Self {
            users,
            jobs,
            gateway,
            notifier,
            dedup_window: Duration::seconds(dedup_window_secs as i64),
        }
    }

    /// Idempotent registration, run on every `/start`.
    pub async fn ensure_registered(
        &self,
        user_id: UserId,
        username: Option<&str>,
    ) -> Result<User, RepositoryError> {
        self.users.ensure_user(user_id, username, Utc::now()).await
    }

    /// Read-only preview of the caller's posting entitlement.
    pub async fn evaluate(&self, user_id: UserId) -> Result<Decision, RepositoryError> {
        let now = Utc::now();
        let has_prior = self.jobs.count_for_owner(user_id).await? > 0;
        let user = match self.users.find_by_id(user_id).await? {
            Some(user) => user,
            None => User::fresh(user_id, None, now),
        };
        Ok(entitlement::evaluate(&user, has_prior, now))
    }

    /// The caller's live listings, newest first.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<Job>, RepositoryError> {
        self.jobs.list_for_owner(user_id).await
    }

    /// Validates, checks entitlement, broadcasts and commits one listing.
    ///
    /// The order matters: validation and the duplicate pre-check run before
    /// entitlement so malformed or repeated input never consumes anything,
    /// and nothing is stored until the channel has accepted the message.
    pub async fn submit(&self, user_id: UserId, payload: &JobPayload) -> Result<Job, SubmitError> {
        let now = Utc::now();
        let payload = payload.normalized();
        payload.validate()?;

        let user = self
            .users
            .ensure_user(user_id, None, now)
            .await
            .map_err(|error| storage("submit registration", error, SubmitError::Storage))?;

        let fingerprint = submission_fingerprint(user_id, &payload);
        let dedup_since = now - self.dedup_window;
        let duplicate = self
            .jobs
            .has_duplicate_since(user_id, &fingerprint, dedup_since)
            .await
            .map_err(|error| storage("duplicate pre-check", error, SubmitError::Storage))?;
        if duplicate {
            return Err(SubmitError::Duplicate);
        }

        let has_prior = self
            .jobs
            .count_for_owner(user_id)
            .await
            .map_err(|error| storage("prior job count", error, SubmitError::Storage))?
            > 0;
        let reason = match entitlement::evaluate(&user, has_prior, now) {
            Decision::Allow(reason) => reason,
            Decision::Deny { referral_progress } => {
                return Err(SubmitError::EntitlementDenied { referral_progress })
            }
        };

        let text = format::render_listing(&payload);
        let message = self
            .gateway
            .publish(&text)
            .await
            .map_err(|error| SubmitError::Broadcast(error.to_string()))?;

        let outcome = self
            .jobs
            .commit_published(
                NewJob {
                    owner: user_id,
                    channel_message_id: message,
                    payload: payload.clone(),
                    fingerprint,
                    created_at: now,
                },
                reason.consumption(),
                dedup_since,
            )
            .await;

        match outcome {
            Ok(CommitOutcome::Committed(job)) => {
                info!(user_id = %user_id, job_id = %job.id, ?reason, "listing published");
                Ok(job)
            }
            Ok(CommitOutcome::EntitlementGone) => {
                self.compensate(message, "entitlement consumed concurrently").await;
                let referral_progress = self.referral_progress(user_id).await;
                Err(SubmitError::EntitlementDenied { referral_progress })
            }
            Ok(CommitOutcome::DuplicatePayload) => {
                self.compensate(message, "identical listing committed first").await;
                Err(SubmitError::Duplicate)
            }
            Err(error) => {
                self.compensate(message, "publish commit failed").await;
                self.notifier
                    .escalate(&format!("publish commit failed for user {user_id}: {error}"))
                    .await;
                Err(SubmitError::Storage(error.to_string()))
            }
        }
    }

    /// Replaces a listing's content, channel copy first. A channel refusal
    /// leaves the stored listing untouched.
    pub async fn edit(
        &self,
        user_id: UserId,
        job_id: JobId,
        payload: &JobPayload,
    ) -> Result<Job, EditError> {
        let payload = payload.normalized();
        payload.validate()?;

        let job = self
            .jobs
            .find_by_id(job_id)
            .await
            .map_err(|error| storage("edit lookup", error, EditError::Storage))?
            .ok_or(EditError::NotFound(job_id))?;
        if !job.is_owned_by(user_id) {
            return Err(EditError::NotOwner(job_id));
        }

        let text = format::render_listing(&payload);
        self.gateway
            .edit(job.channel_message_id, &text)
            .await
            .map_err(|error| EditError::Broadcast(error.to_string()))?;

        let fingerprint = submission_fingerprint(user_id, &payload);
        match self.jobs.update_payload(job_id, &payload, &fingerprint).await {
            Ok(Some(updated)) => {
                info!(user_id = %user_id, job_id = %job_id, "listing updated");
                Ok(updated)
            }
            Ok(None) => {
                warn!(job_id = %job_id, "listing vanished between channel edit and store update");
                Err(EditError::NotFound(job_id))
            }
            Err(error) => {
                self.notifier
                    .escalate(&format!(
                        "store update of job {job_id} failed after its channel copy was already \
                         edited: {error}"
                    ))
                    .await;
                Err(EditError::Storage(error.to_string()))
            }
        }
    }

    /// Takes a listing down. Row removal is the retraction of record; a
    /// failed broadcast delete is escalated but never blocks it.
    pub async fn retract(&self, user_id: UserId, job_id: JobId) -> Result<(), RetractError> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await
            .map_err(|error| storage("retract lookup", error, RetractError::Storage))?
            .ok_or(RetractError::NotFound(job_id))?;
        if !job.is_owned_by(user_id) {
            return Err(RetractError::NotOwner(job_id));
        }

        if let Err(error) = self.gateway.delete(job.channel_message_id).await {
            warn!(job_id = %job_id, %error, "broadcast delete failed during retraction");
            self.notifier
                .escalate(&format!(
                    "channel message {} may be orphaned after retracting job {job_id}: {error}",
                    job.channel_message_id
                ))
                .await;
        }

        self.jobs
            .delete(job_id)
            .await
            .map_err(|error| storage("retract delete", error, RetractError::Storage))?;
        info!(user_id = %user_id, job_id = %job_id, "listing retracted");
        Ok(())
    }

    async fn compensate(&self, message: ChannelMessageId, cause: &str) {
        match self.gateway.delete(message).await {
            Ok(()) => info!(%message, cause, "removed broadcast copy of a refused commit"),
            Err(error) => {
                warn!(%message, cause, %error, "compensating broadcast delete failed");
                self.notifier
                    .escalate(&format!(
                        "channel message {message} is orphaned after a refused commit ({cause}): \
                         {error}"
                    ))
                    .await;
            }
        }
    }

    async fn referral_progress(&self, user_id: UserId) -> u32 {
        match self.users.find_by_id(user_id).await {
            Ok(Some(user)) => referral::progress(user.referral_count),
            Ok(None) => 0,
            Err(error) => {
                warn!(%user_id, %error, "could not re-read referral progress");
                0
            }
        }
    }
}

fn storage<E>(scope: &'static str, error: RepositoryError, wrap: fn(String) -> E) -> E {
    warn!(scope, %error, "storage failure");
    wrap(error.to_string())
}
