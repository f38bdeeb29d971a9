use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use gigboard_core::domain::user::{User, UserId};
use gigboard_core::errors::AdminError;
use gigboard_core::referral;
use gigboard_db::repositories::{JobRepository, RepositoryError, UserRepository};

/// Operator surface: grants, usage counters and per-user inspection.
pub struct AdminService {
    users: Arc<dyn UserRepository>,
    jobs: Arc<dyn JobRepository>,
}

/// Aggregate usage counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UsageStats {
    pub total_users: u64,
    pub live_jobs: u64,
    pub active_subscriptions: u64,
    pub permanent_grantees: u64,
}

/// One user's ledger row with its derived posting state.
#[derive(Clone, Debug, PartialEq)]
pub struct UserDetail {
    pub user: User,
    pub live_jobs: u64,
    pub referral_progress: u32,
    pub remaining_for_bonus: u32,
}

/// An operator-supplied way of pointing at a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserIdentifier {
    Id(UserId),
    Handle(String),
}

/// `@handle` or a bare numeric id. Anything else is refused rather than
/// guessed at.
pub fn parse_identifier(raw: &str) -> Result<UserIdentifier, AdminError> {
    let trimmed = raw.trim();
    if let Some(handle) = trimmed.strip_prefix('@') {
        if handle.is_empty() {
            return Err(AdminError::InvalidIdentifier(raw.to_string()));
        }
        return Ok(UserIdentifier::Handle(handle.to_string()));
    }

    trimmed
        .parse::<i64>()
        .map(|id| UserIdentifier::Id(UserId(id)))
        .map_err(|_| AdminError::InvalidIdentifier(raw.to_string()))
}

impl AdminService {
    pub fn new(users: Arc<dyn UserRepository>, jobs: Arc<dyn JobRepository>) -> Self {
        Self { users, jobs }
    }

    pub async fn grant_permanent(&self, identifier: &str) -> Result<User, AdminError> {
        let user = self.resolve(identifier).await?;
        let updated = self.users.set_permanent_grant(user.id, true).await.map_err(storage)?;
        if !updated {
            return Err(AdminError::UserNotFound(identifier.trim().to_string()));
        }
        info!(user_id = %user.id, "permanent grant set");
        self.reload(user.id).await
    }

    /// Extends from whichever is later, the current expiry or now, so
    /// stacking grants never shortens a subscription.
    pub async fn grant_subscription(
        &self,
        identifier: &str,
        days: u32,
    ) -> Result<User, AdminError> {
        let user = self.resolve(identifier).await?;
        let now = Utc::now();
        let base = user.subscription_until.filter(|until| *until > now).unwrap_or(now);
        let until = base + Duration::days(i64::from(days));

        let updated = self.users.set_subscription_until(user.id, until).await.map_err(storage)?;
        if !updated {
            return Err(AdminError::UserNotFound(identifier.trim().to_string()));
        }
        info!(user_id = %user.id, %until, days, "subscription extended");
        self.reload(user.id).await
    }

    pub async fn grant_credit(&self, identifier: &str) -> Result<User, AdminError> {
        let user = self.resolve(identifier).await?;
        let updated = self.users.add_credits(user.id, 1).await.map_err(storage)?;
        if !updated {
            return Err(AdminError::UserNotFound(identifier.trim().to_string()));
        }
        info!(user_id = %user.id, "one post credit added");
        self.reload(user.id).await
    }

    pub async fn stats(&self) -> Result<UsageStats, AdminError> {
        let now = Utc::now();
        Ok(UsageStats {
            total_users: self.users.count_users().await.map_err(storage)?,
            live_jobs: self.jobs.count_all().await.map_err(storage)?,
            active_subscriptions: self
                .users
                .count_active_subscriptions(now)
                .await
                .map_err(storage)?,
            permanent_grantees: self.users.count_permanent_grantees().await.map_err(storage)?,
        })
    }

    pub async fn user_info(&self, identifier: &str) -> Result<UserDetail, AdminError> {
        let user = self.resolve(identifier).await?;
        let live_jobs = self.jobs.count_for_owner(user.id).await.map_err(storage)?;
        let referral_progress = referral::progress(user.referral_count);
        let remaining_for_bonus = referral::remaining_for_bonus(user.referral_count);
        Ok(UserDetail { user, live_jobs, referral_progress, remaining_for_bonus })
    }

    async fn resolve(&self, raw: &str) -> Result<User, AdminError> {
        let found = match parse_identifier(raw)? {
            UserIdentifier::Id(id) => self.users.find_by_id(id).await.map_err(storage)?,
            UserIdentifier::Handle(handle) => {
                self.users.find_by_username(&handle).await.map_err(storage)?
            }
        };
        found.ok_or_else(|| AdminError::UserNotFound(raw.trim().to_string()))
    }

    async fn reload(&self, id: UserId) -> Result<User, AdminError> {
        self.users
            .find_by_id(id)
            .await
            .map_err(storage)?
            .ok_or_else(|| AdminError::UserNotFound(id.to_string()))
    }
}

fn storage(error: RepositoryError) -> AdminError {
    warn!(%error, "storage failure in the admin surface");
    AdminError::Storage(error.to_string())
}
