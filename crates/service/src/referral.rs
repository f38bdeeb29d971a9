use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use gigboard_core::domain::user::UserId;
use gigboard_core::referral::BONUS_THRESHOLD;
use gigboard_db::repositories::{JoinOutcome, LeaveOutcome, RepositoryError, UserRepository};

/// Feeds group membership changes into the referral ledger. Bonuses are
/// settled here, at join and leave time; entitlement evaluation only ever
/// sees the resulting credits.
pub struct ReferralService {
    users: Arc<dyn UserRepository>,
    bonus_every: u32,
}

impl ReferralService {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users, bonus_every: BONUS_THRESHOLD }
    }

    /// Attributes one joining member to the inviter. Self-invites are
    /// ignored and report an uncounted outcome.
    pub async fn member_joined(
        &self,
        inviter: UserId,
        member: UserId,
    ) -> Result<JoinOutcome, RepositoryError> {
        if inviter == member {
            debug!(%member, "self-attributed join ignored");
            return Ok(JoinOutcome { counted: false, referral_count: 0, bonus_granted: false });
        }

        let outcome =
            self.users.record_member_join(inviter, member, self.bonus_every, Utc::now()).await?;
        if !outcome.counted {
            debug!(%inviter, %member, "member already attributed, join not counted");
        } else if outcome.bonus_granted {
            info!(%inviter, referral_count = outcome.referral_count, "referral bonus credited");
        } else {
            debug!(%inviter, referral_count = outcome.referral_count, "referral counted");
        }
        Ok(outcome)
    }

    pub async fn member_left(&self, member: UserId) -> Result<LeaveOutcome, RepositoryError> {
        let outcome = self.users.record_member_leave(member, self.bonus_every).await?;
        match outcome.inviter {
            None => debug!(%member, "leave without stored attribution"),
            Some(inviter) if outcome.bonus_revoked => {
                info!(%inviter, %member, referral_count = outcome.referral_count, "referral bonus revoked on leave");
            }
            Some(inviter) => {
                debug!(%inviter, %member, referral_count = outcome.referral_count, "referral uncounted on leave");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gigboard_core::domain::user::UserId;
    use gigboard_db::repositories::InMemoryStore;

    use super::ReferralService;

    #[tokio::test]
    async fn self_invites_never_count() {
        let store = Arc::new(InMemoryStore::default());
        let referrals = ReferralService::new(store.clone());

        for _ in 0..5 {
            let outcome = referrals.member_joined(UserId(1), UserId(1)).await.expect("join");
            assert!(!outcome.counted);
        }

        assert_eq!(store.user(UserId(1)).await, None);
    }

    #[tokio::test]
    async fn fifth_distinct_join_credits_through_the_service() {
        let store = Arc::new(InMemoryStore::default());
        let referrals = ReferralService::new(store.clone());

        for member in 10..14 {
            let outcome =
                referrals.member_joined(UserId(1), UserId(member)).await.expect("join");
            assert!(outcome.counted);
            assert!(!outcome.bonus_granted);
        }
        let fifth = referrals.member_joined(UserId(1), UserId(14)).await.expect("join");
        assert!(fifth.bonus_granted);

        let inviter = store.user(UserId(1)).await.expect("user");
        assert_eq!(inviter.referral_count, 5);
        assert_eq!(inviter.credited_posts, 1);
    }

    #[tokio::test]
    async fn boundary_leave_revokes_through_the_service() {
        let store = Arc::new(InMemoryStore::default());
        let referrals = ReferralService::new(store.clone());
        for member in 10..15 {
            referrals.member_joined(UserId(1), UserId(member)).await.expect("join");
        }

        let outcome = referrals.member_left(UserId(14)).await.expect("leave");

        assert_eq!(outcome.inviter, Some(UserId(1)));
        assert!(outcome.bonus_revoked);
        let inviter = store.user(UserId(1)).await.expect("user");
        assert_eq!(inviter.referral_count, 4);
        assert_eq!(inviter.credited_posts, 0);
    }
}
