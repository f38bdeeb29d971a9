use gigboard_core::domain::payload::JobPayload;

/// Pulls one labeled value out of a line: emoji marker, optional
/// variation selector, flexible whitespace, then `Label:`.
fn field_value<'a>(line: &'a str, emoji: &str, label: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(emoji)?;
    let rest = rest.trim_start_matches('\u{fe0f}').trim_start();
    let value = rest.strip_prefix(label)?;
    Some(value.trim())
}

/// Line-oriented, order-insensitive form parser. Unknown lines are
/// ignored; a repeated label keeps its last value. Missing fields come
/// back empty and are reported by payload validation, not here.
pub fn parse_submission(text: &str) -> JobPayload {
    let mut address = String::new();
    let mut title = String::new();
    let mut payment = String::new();
    let mut contact = String::new();
    let mut note = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(value) = field_value(line, "📍", "Address:") {
            address = value.to_string();
        } else if let Some(value) = field_value(line, "📝", "Task:") {
            title = value.to_string();
        } else if let Some(value) = field_value(line, "💵", "Pay:") {
            payment = value.to_string();
        } else if let Some(value) = field_value(line, "☎", "Contact:") {
            contact = value.to_string();
        } else if let Some(value) = field_value(line, "📌", "Note:") {
            note = if value.is_empty() { None } else { Some(value.to_string()) };
        }
    }

    JobPayload { address, title, payment, contact, note }
}

/// True when at least one template label is present, which is the cue
/// that a private message is a form submission rather than chatter.
pub fn looks_like_form(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        field_value(line, "📍", "Address:").is_some()
            || field_value(line, "📝", "Task:").is_some()
            || field_value(line, "💵", "Pay:").is_some()
            || field_value(line, "☎", "Contact:").is_some()
            || field_value(line, "📌", "Note:").is_some()
    })
}

#[cfg(test)]
mod tests {
    use super::{looks_like_form, parse_submission};

    const FULL_FORM: &str = "📍 Address: Riverside 12, unit 4\n\
        📝 Task: Courier for 2 hours\n\
        💵 Pay: 500\n\
        ☎️ Contact: +996501234567\n\
        📌 Note: evenings only";

    #[test]
    fn parses_a_complete_form() {
        let payload = parse_submission(FULL_FORM);
        assert_eq!(payload.address, "Riverside 12, unit 4");
        assert_eq!(payload.title, "Courier for 2 hours");
        assert_eq!(payload.payment, "500");
        assert_eq!(payload.contact, "+996501234567");
        assert_eq!(payload.note.as_deref(), Some("evenings only"));
    }

    #[test]
    fn field_order_does_not_matter_and_noise_is_ignored() {
        let payload = parse_submission(
            "hello there\n\
             ☎️ Contact: +996501234567\n\
             📍 Address: Riverside 12\n\
             some stray line\n\
             💵 Pay: 500\n\
             📝 Task: Courier",
        );
        assert_eq!(payload.address, "Riverside 12");
        assert_eq!(payload.title, "Courier");
        assert!(payload.note.is_none());
    }

    #[test]
    fn missing_fields_come_back_empty() {
        let payload = parse_submission("📍 Address: Riverside 12");
        assert_eq!(payload.address, "Riverside 12");
        assert!(payload.title.is_empty());
        assert!(payload.payment.is_empty());
        assert!(payload.contact.is_empty());
    }

    #[test]
    fn tolerates_missing_spacing_and_plain_telephone_emoji() {
        let payload = parse_submission("📍Address: Riverside 12\n☎ Contact: +996501234567");
        assert_eq!(payload.address, "Riverside 12");
        assert_eq!(payload.contact, "+996501234567");
    }

    #[test]
    fn empty_note_value_is_dropped() {
        let payload = parse_submission("📌 Note:");
        assert!(payload.note.is_none());
    }

    #[test]
    fn repeated_label_keeps_the_last_value() {
        let payload = parse_submission("💵 Pay: 300\n💵 Pay: 500");
        assert_eq!(payload.payment, "500");
    }

    #[test]
    fn form_detection_needs_a_label() {
        assert!(looks_like_form("📝 Task: anything"));
        assert!(!looks_like_form("just a question about the channel"));
        assert!(!looks_like_form("/start"));
    }
}
