use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::payload::JobPayload;
use crate::domain::user::UserId;

/// Sequential storage id of a published job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of the message carrying the listing in the broadcast channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelMessageId(pub i64);

impl std::fmt::Display for ChannelMessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live published listing. A row exists iff the channel message exists;
/// retraction removes both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner: UserId,
    pub channel_message_id: ChannelMessageId,
    pub payload: JobPayload,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::payload::JobPayload;
    use crate::domain::user::UserId;

    use super::{ChannelMessageId, Job, JobId};

    #[test]
    fn ownership_is_exact() {
        let job = Job {
            id: JobId(1),
            owner: UserId(42),
            channel_message_id: ChannelMessageId(900),
            payload: JobPayload {
                address: "12 Forge Lane".to_string(),
                title: "Assemble a wardrobe".to_string(),
                payment: "40 per hour".to_string(),
                contact: "+7 999 123 45 67".to_string(),
                note: None,
            },
            created_at: Utc::now(),
        };

        assert!(job.is_owned_by(UserId(42)));
        assert!(!job.is_owned_by(UserId(43)));
    }
}
