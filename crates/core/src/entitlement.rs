use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::User;
use crate::referral;

/// Why a submission is admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowReason {
    /// The author has never had a job stored, including retracted ones
    /// whose rows are gone.
    FirstPostFree,
    PermanentGrant,
    ActiveSubscription,
    /// A prepaid or referral-earned credit exists. Consumed at publish
    /// commit, never here.
    HasCredit,
}

/// Outcome of evaluating a user's right to post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Allow(AllowReason),
    Deny {
        /// Referrals accumulated toward the next bonus credit.
        referral_progress: u32,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// What the publish commit must verify-and-apply, atomically with the job
/// insert. A stale decision is caught by the commit, never papered over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consumption {
    /// Grant- or subscription-backed posts consume nothing.
    None,
    /// Decrement one credit, only while one remains.
    Credit,
    /// Re-verify the author still has no stored jobs.
    FirstPost,
}

impl AllowReason {
    pub fn consumption(&self) -> Consumption {
        match self {
            AllowReason::FirstPostFree => Consumption::FirstPost,
            AllowReason::PermanentGrant | AllowReason::ActiveSubscription => Consumption::None,
            AllowReason::HasCredit => Consumption::Credit,
        }
    }
}

/// Ordered entitlement check, first match wins:
/// free first post, permanent grant, unexpired subscription, prepaid credit.
///
/// Read-only by contract: it can be run speculatively (menu rendering)
/// without consuming anything. Referral bonuses are granted by the
/// membership feed when the count crosses the threshold, so they surface
/// here as ordinary credits.
///
/// `has_prior_jobs` must come from a live job count, not a cached counter,
/// so retracted rows stop counting.
pub fn evaluate(user: &User, has_prior_jobs: bool, now: DateTime<Utc>) -> Decision {
    if !has_prior_jobs {
        return Decision::Allow(AllowReason::FirstPostFree);
    }
    if user.permanent_grant {
        return Decision::Allow(AllowReason::PermanentGrant);
    }
    if user.has_active_subscription(now) {
        return Decision::Allow(AllowReason::ActiveSubscription);
    }
    if user.credited_posts > 0 {
        return Decision::Allow(AllowReason::HasCredit);
    }

    Decision::Deny { referral_progress: referral::progress(user.referral_count) }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::user::{User, UserId};

    use super::{evaluate, AllowReason, Decision};

    fn user() -> User {
        User::fresh(UserId(1), None, Utc::now())
    }

    #[test]
    fn first_post_is_free_even_for_granted_users() {
        let mut granted = user();
        granted.permanent_grant = true;

        let decision = evaluate(&granted, false, Utc::now());
        assert_eq!(decision, Decision::Allow(AllowReason::FirstPostFree));
    }

    #[test]
    fn permanent_grant_wins_once_first_post_is_spent() {
        let mut granted = user();
        granted.permanent_grant = true;
        granted.credited_posts = 3;

        let decision = evaluate(&granted, true, Utc::now());
        assert_eq!(decision, Decision::Allow(AllowReason::PermanentGrant));
    }

    #[test]
    fn active_subscription_beats_credits() {
        let now = Utc::now();
        let mut subscriber = user();
        subscriber.subscription_until = Some(now + Duration::days(3));
        subscriber.credited_posts = 2;

        let decision = evaluate(&subscriber, true, now);
        assert_eq!(decision, Decision::Allow(AllowReason::ActiveSubscription));
    }

    #[test]
    fn expired_subscription_falls_through_to_credits() {
        let now = Utc::now();
        let mut lapsed = user();
        lapsed.subscription_until = Some(now - Duration::seconds(1));
        lapsed.credited_posts = 1;

        let decision = evaluate(&lapsed, true, now);
        assert_eq!(decision, Decision::Allow(AllowReason::HasCredit));
    }

    #[test]
    fn exhausted_user_is_denied_with_referral_progress() {
        let mut exhausted = user();
        exhausted.referral_count = 7;

        let decision = evaluate(&exhausted, true, Utc::now());
        assert_eq!(decision, Decision::Deny { referral_progress: 2 });
    }

    #[test]
    fn only_credit_backed_posts_consume() {
        use super::Consumption;

        assert_eq!(AllowReason::FirstPostFree.consumption(), Consumption::FirstPost);
        assert_eq!(AllowReason::PermanentGrant.consumption(), Consumption::None);
        assert_eq!(AllowReason::ActiveSubscription.consumption(), Consumption::None);
        assert_eq!(AllowReason::HasCredit.consumption(), Consumption::Credit);
    }

    #[test]
    fn evaluation_is_read_only() {
        let now = Utc::now();
        let mut credited = user();
        credited.credited_posts = 1;
        let before = credited.clone();

        let first = evaluate(&credited, true, now);
        let second = evaluate(&credited, true, now);

        assert_eq!(first, Decision::Allow(AllowReason::HasCredit));
        assert_eq!(first, second);
        assert_eq!(credited, before);
    }
}
