//! Orchestration layer - posting entitlements meet the channel
//!
//! This crate wires the domain rules to storage and transport:
//! - **Lifecycle** (`lifecycle`) - submit, edit, retract and list listings
//! - **Referrals** (`referral`) - membership feed into the bonus ledger
//! - **Admin** (`admin`) - grants, usage counters, per-user inspection
//! - **Bot relays** (`bot`) - the event-service implementations behind the dispatcher
//! - **Escalation** (`notify`) - operator alerts for state the bot cannot repair
//!
//! # Key invariants
//!
//! - Nothing is stored before the channel accepts the broadcast; a commit
//!   that then refuses deletes the broadcast copy again.
//! - Entitlement evaluation is read-only; consumption happens inside the
//!   publish commit and is re-verified there.
//! - Referral bonuses are settled by the membership feed, never at
//!   publish time.

pub mod admin;
pub mod bot;
pub mod lifecycle;
pub mod notify;
pub mod referral;

pub use admin::{AdminService, UsageStats, UserDetail};
pub use bot::{build_dispatcher, BotDeps};
pub use lifecycle::LifecycleService;
pub use notify::{OpsNotifier, RecordingOpsNotifier, TelegramOpsNotifier};
pub use referral::ReferralService;
