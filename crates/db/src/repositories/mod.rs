use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use gigboard_core::domain::job::{ChannelMessageId, Job, JobId};
use gigboard_core::domain::payload::JobPayload;
use gigboard_core::domain::user::{User, UserId};
use gigboard_core::entitlement::Consumption;

pub mod jobs;
pub mod memory;
pub mod users;

pub use jobs::SqlJobRepository;
pub use memory::InMemoryStore;
pub use users::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Result of attributing a member join to an inviter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    /// False when the member was already attributed, making the join a no-op.
    pub counted: bool,
    pub referral_count: u32,
    pub bonus_granted: bool,
}

/// Result of resolving a member leave against the stored attribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// None when the member was never attributed to anyone.
    pub inviter: Option<UserId>,
    pub referral_count: u32,
    pub bonus_revoked: bool,
}

/// How a publish commit ended.
#[derive(Clone, Debug, PartialEq)]
pub enum CommitOutcome {
    Committed(Job),
    /// The entitlement behind the decision was consumed concurrently.
    EntitlementGone,
    /// An identical fingerprint landed within the dedup window.
    DuplicatePayload,
}

/// Row content for a job about to be committed. The channel message id is
/// already known because the broadcast precedes the insert.
#[derive(Clone, Debug)]
pub struct NewJob {
    pub owner: UserId,
    pub channel_message_id: ChannelMessageId,
    pub payload: JobPayload,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Idempotent registration: creates the row on first sight, refreshes
    /// the stored handle when a new one is supplied and never resets
    /// entitlement state.
    async fn ensure_user(
        &self,
        id: UserId,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;

    /// Latest row carrying the handle, if any. Handles are mutable and
    /// not guaranteed unique over time.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    /// Returns false when no such user exists.
    async fn set_permanent_grant(&self, id: UserId, granted: bool)
        -> Result<bool, RepositoryError>;

    async fn set_subscription_until(
        &self,
        id: UserId,
        until: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn add_credits(&self, id: UserId, amount: u32) -> Result<bool, RepositoryError>;

    /// Attribute a join and bump the inviter's count in one transaction,
    /// granting one credit when the new count lands on a positive multiple
    /// of `bonus_every`. Idempotent per member.
    async fn record_member_join(
        &self,
        inviter: UserId,
        member: UserId,
        bonus_every: u32,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, RepositoryError>;

    /// Resolve the member's inviter, drop the attribution and decrement the
    /// count (floor zero) in one transaction, revoking one still-unspent
    /// credit when the count falls off a multiple of `bonus_every`.
    async fn record_member_leave(
        &self,
        member: UserId,
        bonus_every: u32,
    ) -> Result<LeaveOutcome, RepositoryError>;

    async fn count_users(&self) -> Result<u64, RepositoryError>;
    async fn count_active_subscriptions(&self, now: DateTime<Utc>)
        -> Result<u64, RepositoryError>;
    async fn count_permanent_grantees(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError>;

    /// Newest first.
    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Job>, RepositoryError>;

    /// Live row count; the first-post check must use this, not a cached
    /// counter, so retracted rows stop counting.
    async fn count_for_owner(&self, owner: UserId) -> Result<u64, RepositoryError>;

    async fn count_all(&self) -> Result<u64, RepositoryError>;

    /// Cheap duplicate probe run before the broadcast.
    async fn has_duplicate_since(
        &self,
        owner: UserId,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// The decisive submit step: one transaction that re-checks the dedup
    /// window, applies the entitlement consumption and inserts the row.
    /// Any check failing rolls the whole commit back.
    async fn commit_published(
        &self,
        job: NewJob,
        consumption: Consumption,
        dedup_since: DateTime<Utc>,
    ) -> Result<CommitOutcome, RepositoryError>;

    /// Replace the stored payload after the broadcast copy was updated.
    /// Identity, ownership and the channel handle are untouched.
    async fn update_payload(
        &self,
        id: JobId,
        payload: &JobPayload,
        fingerprint: &str,
    ) -> Result<Option<Job>, RepositoryError>;

    /// Row removal is the retraction of record.
    async fn delete(&self, id: JobId) -> Result<bool, RepositoryError>;
}
