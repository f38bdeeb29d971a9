use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use gigboard_core::domain::job::{Job, JobId};
use gigboard_core::domain::payload::JobPayload;
use gigboard_core::domain::user::{User, UserId};
use gigboard_core::entitlement::Consumption;

use super::{
    CommitOutcome, JobRepository, JoinOutcome, LeaveOutcome, NewJob, RepositoryError,
    UserRepository,
};

/// Entitlement checks and referral counting span users, jobs and edges,
/// so the whole state sits behind one lock to keep each operation atomic.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<i64, User>,
    jobs: BTreeMap<i64, StoredJob>,
    edges: HashMap<i64, i64>,
    next_job_id: i64,
}

#[derive(Clone)]
struct StoredJob {
    job: Job,
    fingerprint: String,
}

impl Inner {
    fn user_or_fresh(&mut self, id: UserId, now: DateTime<Utc>) -> &mut User {
        self.users.entry(id.0).or_insert_with(|| User::fresh(id, None, now))
    }
}

/// Direct snapshots for assertions. Both repository traits carry a
/// `find_by_id`, so callers holding the concrete store go through these
/// instead of disambiguating trait methods.
impl InMemoryStore {
    pub async fn user(&self, id: UserId) -> Option<User> {
        self.inner.read().await.users.get(&id.0).cloned()
    }

    pub async fn job(&self, id: JobId) -> Option<Job> {
        self.inner.read().await.jobs.get(&id.0).map(|stored| stored.job.clone())
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryStore {
    async fn ensure_user(
        &self,
        id: UserId,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        let mut inner = self.inner.write().await;
        let user = inner.user_or_fresh(id, now);
        if let Some(username) = username {
            user.username = Some(username.to_string());
        }
        Ok(user.clone())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id.0).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .filter(|user| user.username.as_deref() == Some(username))
            .max_by_key(|user| (user.created_at, user.id.0))
            .cloned())
    }

    async fn set_permanent_grant(
        &self,
        id: UserId,
        granted: bool,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id.0) {
            Some(user) => {
                user.permanent_grant = granted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_subscription_until(
        &self,
        id: UserId,
        until: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id.0) {
            Some(user) => {
                user.subscription_until = Some(until);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_credits(&self, id: UserId, amount: u32) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id.0) {
            Some(user) => {
                user.credited_posts += amount;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_member_join(
        &self,
        inviter: UserId,
        member: UserId,
        bonus_every: u32,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, RepositoryError> {
        let mut inner = self.inner.write().await;
        inner.user_or_fresh(inviter, now);

        if inner.edges.contains_key(&member.0) {
            let referral_count =
                inner.users.get(&inviter.0).map(|user| user.referral_count).unwrap_or(0);
            return Ok(JoinOutcome { counted: false, referral_count, bonus_granted: false });
        }
        inner.edges.insert(member.0, inviter.0);

        let user = inner.user_or_fresh(inviter, now);
        user.referral_count += 1;
        let referral_count = user.referral_count;

        let bonus_granted = bonus_every > 0 && referral_count % bonus_every == 0;
        if bonus_granted {
            user.credited_posts += 1;
        }

        Ok(JoinOutcome { counted: true, referral_count, bonus_granted })
    }

    async fn record_member_leave(
        &self,
        member: UserId,
        bonus_every: u32,
    ) -> Result<LeaveOutcome, RepositoryError> {
        let mut inner = self.inner.write().await;

        let Some(inviter_id) = inner.edges.remove(&member.0) else {
            return Ok(LeaveOutcome { inviter: None, referral_count: 0, bonus_revoked: false });
        };
        let inviter = UserId(inviter_id);

        let Some(user) = inner.users.get_mut(&inviter_id) else {
            return Ok(LeaveOutcome {
                inviter: Some(inviter),
                referral_count: 0,
                bonus_revoked: false,
            });
        };
        if user.referral_count == 0 {
            return Ok(LeaveOutcome {
                inviter: Some(inviter),
                referral_count: 0,
                bonus_revoked: false,
            });
        }
        user.referral_count -= 1;
        let referral_count = user.referral_count;

        let left_boundary = bonus_every > 0 && (referral_count + 1) % bonus_every == 0;
        let bonus_revoked = left_boundary && user.credited_posts > 0;
        if bonus_revoked {
            user.credited_posts -= 1;
        }

        Ok(LeaveOutcome { inviter: Some(inviter), referral_count, bonus_revoked })
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.users.len() as u64)
    }

    async fn count_active_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().filter(|user| user.has_active_subscription(now)).count() as u64)
    }

    async fn count_permanent_grantees(&self) -> Result<u64, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().filter(|user| user.permanent_grant).count() as u64)
    }
}

#[async_trait::async_trait]
impl JobRepository for InMemoryStore {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(&id.0).map(|stored| stored.job.clone()))
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Job>, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .values()
            .rev()
            .filter(|stored| stored.job.owner == owner)
            .map(|stored| stored.job.clone())
            .collect())
    }

    async fn count_for_owner(&self, owner: UserId) -> Result<u64, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.values().filter(|stored| stored.job.owner == owner).count() as u64)
    }

    async fn count_all(&self) -> Result<u64, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.len() as u64)
    }

    async fn has_duplicate_since(
        &self,
        owner: UserId,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.values().any(|stored| {
            stored.job.owner == owner
                && stored.fingerprint == fingerprint
                && stored.job.created_at > since
        }))
    }

    async fn commit_published(
        &self,
        job: NewJob,
        consumption: Consumption,
        dedup_since: DateTime<Utc>,
    ) -> Result<CommitOutcome, RepositoryError> {
        let mut inner = self.inner.write().await;

        let duplicate = inner.jobs.values().any(|stored| {
            stored.job.owner == job.owner
                && stored.fingerprint == job.fingerprint
                && stored.job.created_at > dedup_since
        });
        if duplicate {
            return Ok(CommitOutcome::DuplicatePayload);
        }

        match consumption {
            Consumption::None => {}
            Consumption::Credit => {
                let Some(user) = inner.users.get_mut(&job.owner.0) else {
                    return Ok(CommitOutcome::EntitlementGone);
                };
                if user.credited_posts == 0 {
                    return Ok(CommitOutcome::EntitlementGone);
                }
                user.credited_posts -= 1;
            }
            Consumption::FirstPost => {
                let prior = inner.jobs.values().any(|stored| stored.job.owner == job.owner);
                if prior {
                    return Ok(CommitOutcome::EntitlementGone);
                }
            }
        }

        inner.next_job_id += 1;
        let id = JobId(inner.next_job_id);
        let committed = Job {
            id,
            owner: job.owner,
            channel_message_id: job.channel_message_id,
            payload: job.payload,
            created_at: job.created_at,
        };
        inner
            .jobs
            .insert(id.0, StoredJob { job: committed.clone(), fingerprint: job.fingerprint });

        Ok(CommitOutcome::Committed(committed))
    }

    async fn update_payload(
        &self,
        id: JobId,
        payload: &JobPayload,
        fingerprint: &str,
    ) -> Result<Option<Job>, RepositoryError> {
        let mut inner = self.inner.write().await;
        match inner.jobs.get_mut(&id.0) {
            Some(stored) => {
                stored.job.payload = payload.clone();
                stored.fingerprint = fingerprint.to_string();
                Ok(Some(stored.job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: JobId) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.write().await;
        Ok(inner.jobs.remove(&id.0).is_some())
    }
}
