use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Fields of a job listing. The payload shape is closed: these five fields
/// and nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadField {
    Address,
    Title,
    Payment,
    Contact,
    Note,
}

impl PayloadField {
    pub const REQUIRED: [PayloadField; 4] =
        [PayloadField::Address, PayloadField::Title, PayloadField::Payment, PayloadField::Contact];

    pub fn label(&self) -> &'static str {
        match self {
            PayloadField::Address => "address",
            PayloadField::Title => "title",
            PayloadField::Payment => "payment",
            PayloadField::Contact => "contact",
            PayloadField::Note => "note",
        }
    }
}

impl std::fmt::Display for PayloadField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Structured listing content as submitted by the author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub address: String,
    pub title: String,
    pub payment: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl JobPayload {
    /// Trims surrounding whitespace on every field and drops a blank note.
    pub fn normalized(&self) -> Self {
        Self {
            address: self.address.trim().to_string(),
            title: self.title.trim().to_string(),
            payment: self.payment.trim().to_string(),
            contact: self.contact.trim().to_string(),
            note: self
                .note
                .as_deref()
                .map(str::trim)
                .filter(|note| !note.is_empty())
                .map(str::to_string),
        }
    }

    fn field_value(&self, field: PayloadField) -> Option<&str> {
        match field {
            PayloadField::Address => Some(&self.address),
            PayloadField::Title => Some(&self.title),
            PayloadField::Payment => Some(&self.payment),
            PayloadField::Contact => Some(&self.contact),
            PayloadField::Note => self.note.as_deref(),
        }
    }

    /// Checks required fields and the contact shape. Runs before any
    /// entitlement evaluation so malformed input never consumes anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<PayloadField> = PayloadField::REQUIRED
            .into_iter()
            .filter(|field| {
                self.field_value(*field).map(str::trim).unwrap_or_default().is_empty()
            })
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        if !is_phone_shaped(self.contact.trim()) {
            return Err(ValidationError::ContactNotPhoneShaped { value: self.contact.clone() });
        }

        Ok(())
    }
}

/// Contact shape check: optional leading `+`, then a digit, then digits
/// with interior spaces or dashes, ending with a digit, at least nine
/// characters after the optional `+`.
pub fn is_phone_shaped(value: &str) -> bool {
    let digits = value.strip_prefix('+').unwrap_or(value).as_bytes();
    if digits.len() < 9 {
        return false;
    }
    let interior_ok =
        digits.iter().all(|byte| byte.is_ascii_digit() || *byte == b' ' || *byte == b'-');
    interior_ok
        && digits.first().is_some_and(u8::is_ascii_digit)
        && digits.last().is_some_and(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use crate::errors::ValidationError;

    use super::{is_phone_shaped, JobPayload, PayloadField};

    fn payload() -> JobPayload {
        JobPayload {
            address: "12 Forge Lane".to_string(),
            title: "Assemble a wardrobe".to_string(),
            payment: "40 per hour".to_string(),
            contact: "+7 999 123 45 67".to_string(),
            note: None,
        }
    }

    #[test]
    fn complete_payload_passes_validation() {
        payload().validate().expect("valid payload");
    }

    #[test]
    fn blank_required_fields_are_reported_together() {
        let mut bad = payload();
        bad.address = "   ".to_string();
        bad.payment = String::new();

        let error = bad.validate().expect_err("missing fields");
        assert_eq!(
            error,
            ValidationError::MissingFields(vec![PayloadField::Address, PayloadField::Payment]),
        );
    }

    #[test]
    fn missing_fields_win_over_contact_shape() {
        let mut bad = payload();
        bad.title = String::new();
        bad.contact = "abc".to_string();

        let error = bad.validate().expect_err("missing title");
        assert!(matches!(error, ValidationError::MissingFields(ref fields) if fields == &[PayloadField::Title]));
    }

    #[test]
    fn non_numeric_contact_is_rejected() {
        let mut bad = payload();
        bad.contact = "call me maybe".to_string();

        let error = bad.validate().expect_err("bad contact");
        assert!(matches!(error, ValidationError::ContactNotPhoneShaped { .. }));
    }

    #[test]
    fn note_is_optional_and_blank_notes_normalize_away() {
        let mut with_note = payload();
        with_note.note = Some("  ".to_string());

        let normalized = with_note.normalized();
        assert_eq!(normalized.note, None);
        normalized.validate().expect("note never required");
    }

    #[test]
    fn normalization_trims_every_field() {
        let mut padded = payload();
        padded.title = "  Assemble a wardrobe  ".to_string();
        padded.note = Some(" bring tools ".to_string());

        let normalized = padded.normalized();
        assert_eq!(normalized.title, "Assemble a wardrobe");
        assert_eq!(normalized.note.as_deref(), Some("bring tools"));
    }

    #[test]
    fn phone_shapes() {
        assert!(is_phone_shaped("+7 999 123 45 67"));
        assert!(is_phone_shaped("89991234567"));
        assert!(is_phone_shaped("8-999-123-45-67"));

        assert!(!is_phone_shaped("abc"));
        assert!(!is_phone_shaped("+7 999"));
        assert!(!is_phone_shaped("7999123456x"));
        assert!(!is_phone_shaped("+-999123456"));
        assert!(!is_phone_shaped("799912345 "));
    }
}
