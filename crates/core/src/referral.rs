//! Referral bonus policy.
//!
//! The membership feed is the single authority for referral bonuses: a
//! credit is granted the moment an inviter's count climbs onto a multiple
//! of the threshold, and best-effort revoked when a leave drops the count
//! back off that multiple. Entitlement evaluation never redeems referral
//! counts itself; by the time it runs, a referral bonus is an ordinary
//! credit.

pub const BONUS_THRESHOLD: u32 = 5;

/// True when an increment has just landed the count on a bonus boundary.
pub fn bonus_earned_on_join(new_count: u32) -> bool {
    new_count > 0 && new_count % BONUS_THRESHOLD == 0
}

/// True when a decrement is about to take the count off a bonus boundary,
/// which revokes the matching credit if it is still unspent.
pub fn bonus_lost_on_leave(old_count: u32) -> bool {
    old_count > 0 && old_count % BONUS_THRESHOLD == 0
}

/// Referrals accumulated toward the next bonus.
pub fn progress(count: u32) -> u32 {
    count % BONUS_THRESHOLD
}

/// How many more referrals earn the next bonus, in `1..=BONUS_THRESHOLD`.
pub fn remaining_for_bonus(count: u32) -> u32 {
    BONUS_THRESHOLD - progress(count)
}

#[cfg(test)]
mod tests {
    use super::{
        bonus_earned_on_join, bonus_lost_on_leave, progress, remaining_for_bonus, BONUS_THRESHOLD,
    };

    #[test]
    fn bonus_lands_exactly_on_multiples() {
        assert!(!bonus_earned_on_join(1));
        assert!(!bonus_earned_on_join(4));
        assert!(bonus_earned_on_join(5));
        assert!(!bonus_earned_on_join(6));
        assert!(!bonus_earned_on_join(9));
        assert!(bonus_earned_on_join(10));
    }

    #[test]
    fn zero_count_never_earns() {
        assert!(!bonus_earned_on_join(0));
        assert!(!bonus_lost_on_leave(0));
    }

    #[test]
    fn leaving_a_boundary_revokes() {
        assert!(bonus_lost_on_leave(5));
        assert!(bonus_lost_on_leave(10));
        assert!(!bonus_lost_on_leave(4));
        assert!(!bonus_lost_on_leave(7));
    }

    #[test]
    fn progress_wraps_at_threshold() {
        assert_eq!(progress(0), 0);
        assert_eq!(progress(3), 3);
        assert_eq!(progress(5), 0);
        assert_eq!(progress(12), 2);
    }

    #[test]
    fn remaining_counts_down_to_the_next_bonus() {
        assert_eq!(remaining_for_bonus(0), BONUS_THRESHOLD);
        assert_eq!(remaining_for_bonus(3), 2);
        assert_eq!(remaining_for_bonus(5), BONUS_THRESHOLD);
        assert_eq!(remaining_for_bonus(12), 3);
    }
}
