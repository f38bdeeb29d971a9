use thiserror::Error;

use crate::domain::job::JobId;
use crate::domain::payload::PayloadField;
use crate::referral::BONUS_THRESHOLD;

fn joined_labels(fields: &[PayloadField]) -> String {
    fields.iter().map(PayloadField::label).collect::<Vec<_>>().join(", ")
}

/// Payload rejection. Raised before any entitlement or broadcast work.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required fields: {}", joined_labels(.0))]
    MissingFields(Vec<PayloadField>),
    #[error("contact {value:?} is not phone-shaped")]
    ContactNotPhoneShaped { value: String },
}

impl ValidationError {
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingFields(fields) => {
                format!("The listing is incomplete. Please fill in: {}.", joined_labels(fields))
            }
            Self::ContactNotPhoneShaped { .. } => {
                "The contact must be a phone number, for example +7 999 123 45 67.".to_string()
            }
        }
    }
}

/// Submission failure. Every variant leaves the author free to retry.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no posting entitlement remaining ({referral_progress}/{BONUS_THRESHOLD} referrals)")]
    EntitlementDenied { referral_progress: u32 },
    #[error("an identical listing was just submitted")]
    Duplicate,
    #[error("broadcast failure: {0}")]
    Broadcast(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl SubmitError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(validation) => validation.user_message(),
            Self::EntitlementDenied { referral_progress } => {
                let remaining = BONUS_THRESHOLD - referral_progress % BONUS_THRESHOLD;
                format!(
                    "You have no posts left. Invite {remaining} more member(s) to earn a bonus \
                     post, or ask the administrator about a subscription."
                )
            }
            Self::Duplicate => {
                "This listing was already submitted a moment ago.".to_string()
            }
            Self::Broadcast(_) | Self::Storage(_) => {
                "The listing could not be published right now. Please try again shortly."
                    .to_string()
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {0} belongs to another user")]
    NotOwner(JobId),
    #[error("broadcast failure: {0}")]
    Broadcast(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl EditError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(validation) => validation.user_message(),
            Self::NotFound(_) => "That listing no longer exists.".to_string(),
            Self::NotOwner(_) => "Only the author can change a listing.".to_string(),
            Self::Broadcast(_) | Self::Storage(_) => {
                "The listing could not be updated right now. Please try again shortly.".to_string()
            }
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetractError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {0} belongs to another user")]
    NotOwner(JobId),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl RetractError {
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(_) => "That listing no longer exists.".to_string(),
            Self::NotOwner(_) => "Only the author can remove a listing.".to_string(),
            Self::Storage(_) => {
                "The listing could not be removed right now. Please try again shortly.".to_string()
            }
        }
    }
}

/// Operator-facing failures from the administration surface.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("identifier {0:?} is not a user id or @handle")]
    InvalidIdentifier(String),
    #[error("no user matches {0:?}")]
    UserNotFound(String),
    #[error("storage failure: {0}")]
    Storage(String),
}
