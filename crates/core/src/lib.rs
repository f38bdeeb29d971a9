pub mod config;
pub mod domain;
pub mod entitlement;
pub mod errors;
pub mod fingerprint;
pub mod referral;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::job::{ChannelMessageId, Job, JobId};
pub use domain::payload::{is_phone_shaped, JobPayload, PayloadField};
pub use domain::user::{User, UserId};
pub use entitlement::{evaluate, AllowReason, Consumption, Decision};
pub use errors::{AdminError, EditError, RetractError, SubmitError, ValidationError};
pub use fingerprint::submission_fingerprint;
