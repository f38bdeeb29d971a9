use crate::domain::payload::JobPayload;
use crate::domain::user::UserId;

/// Fingerprint of one submission, used to catch the same form-fill being
/// committed twice. Owner-scoped so two users posting identical listings
/// never collide.
pub fn submission_fingerprint(owner: UserId, payload: &JobPayload) -> String {
    use sha2::{Digest, Sha256};

    let normalized = payload.normalized();
    let mut hasher = Sha256::new();
    hasher.update(owner.0.to_le_bytes());
    hasher.update([0u8]);
    for part in [
        normalized.address.as_str(),
        normalized.title.as_str(),
        normalized.payment.as_str(),
        normalized.contact.as_str(),
        normalized.note.as_deref().unwrap_or(""),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
