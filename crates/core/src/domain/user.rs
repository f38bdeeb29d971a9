use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque messaging-platform user id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entitlement ledger row for one user. Created idempotently on first
/// interaction and never deleted by the application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Display handle, refreshed on interaction. Only used to resolve
    /// operator-supplied identifiers; entitlement never depends on it.
    pub username: Option<String>,
    pub permanent_grant: bool,
    pub subscription_until: Option<DateTime<Utc>>,
    pub credited_posts: u32,
    pub referral_count: u32,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A brand-new ledger row: no grants, no credits, no referrals.
    pub fn fresh(id: UserId, username: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username,
            permanent_grant: false,
            subscription_until: None,
            credited_posts: 0,
            referral_count: 0,
            created_at: now,
        }
    }

    /// Subscription entitles posting strictly until its expiry instant.
    pub fn has_active_subscription(&self, now: DateTime<Utc>) -> bool {
        self.subscription_until.is_some_and(|until| until > now)
    }
}
