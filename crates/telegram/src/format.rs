use gigboard_core::domain::job::Job;
use gigboard_core::domain::payload::JobPayload;

pub const ADDRESS_LABEL: &str = "📍 Address:";
pub const TITLE_LABEL: &str = "📝 Task:";
pub const PAYMENT_LABEL: &str = "💵 Pay:";
pub const CONTACT_LABEL: &str = "☎️ Contact:";
pub const NOTE_LABEL: &str = "📌 Note:";

/// Escapes the three characters HTML parse mode reserves.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Channel rendering of one listing: bold headline, then labeled lines.
pub fn render_listing(payload: &JobPayload) -> String {
    let mut text = format!(
        "<b>Job: {}</b>\n{ADDRESS_LABEL} {}\n{PAYMENT_LABEL} {}\n{CONTACT_LABEL} {}",
        escape_html(&payload.title),
        escape_html(&payload.address),
        escape_html(&payload.payment),
        escape_html(&payload.contact),
    );
    if let Some(note) = &payload.note {
        text.push_str(&format!("\n{NOTE_LABEL} {}", escape_html(note)));
    }
    text
}

pub fn menu_text(invite_url: Option<&str>) -> String {
    let mut text = String::from(
        "👋 Hi! I publish job listings to the channel.\n\n\
         /post — publish a new listing\n\
         /list — your published listings\n\
         /delete &lt;id&gt; — take a listing down\n\
         /edit &lt;id&gt; — replace a listing's content",
    );
    if let Some(url) = invite_url {
        text.push_str(&format!("\n\n🌐 Channel: {}", escape_html(url)));
    }
    text
}

pub fn template_prompt() -> String {
    format!(
        "📄 Send the listing as one message, keeping the labels:\n\n\
         {ADDRESS_LABEL} Riverside 12, unit 4\n\
         {TITLE_LABEL} Courier for 2 hours\n\
         {PAYMENT_LABEL} 500\n\
         {CONTACT_LABEL} +996501234567\n\
         {NOTE_LABEL} (optional)"
    )
}

pub fn published_text() -> String {
    "✅ Your listing is published. Use /list to manage it.".to_string()
}

pub fn updated_text() -> String {
    "✅ Listing updated.".to_string()
}

pub fn retracted_text() -> String {
    "✅ Listing removed.".to_string()
}

pub fn empty_listing_text() -> String {
    "You have no published listings yet. Send /post to create one.".to_string()
}

/// Private-chat summary of the caller's listings, newest first.
pub fn listing_summary(jobs: &[Job]) -> String {
    let mut text = String::from("Your listings:\n");
    for job in jobs {
        text.push_str(&format!(
            "\n#{} · {} — {}",
            job.id,
            escape_html(&job.payload.title),
            escape_html(&job.payload.address),
        ));
    }
    text.push_str("\n\nRemove one with /delete &lt;id&gt;, rework one with /edit &lt;id&gt;.");
    text
}

pub fn group_moderation_text(bot_username: &str) -> String {
    format!(
        "<b>Group messages are restricted to the bot.</b>\n\
         To publish a listing, message @{} directly.",
        escape_html(bot_username)
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use gigboard_core::domain::job::{ChannelMessageId, Job, JobId};
    use gigboard_core::domain::payload::JobPayload;
    use gigboard_core::domain::user::UserId;

    use super::{escape_html, listing_summary, menu_text, render_listing};

    fn payload(note: Option<&str>) -> JobPayload {
        JobPayload {
            address: "Riverside 12".into(),
            title: "Courier <late shift>".into(),
            payment: "500".into(),
            contact: "+996501234567".into(),
            note: note.map(Into::into),
        }
    }

    #[test]
    fn listing_escapes_markup_and_keeps_labels() {
        let text = render_listing(&payload(None));
        assert!(text.starts_with("<b>Job: Courier &lt;late shift&gt;</b>"));
        assert!(text.contains("📍 Address: Riverside 12"));
        assert!(text.contains("💵 Pay: 500"));
        assert!(text.contains("☎️ Contact: +996501234567"));
        assert!(!text.contains("📌"));
    }

    #[test]
    fn note_line_appears_only_when_present() {
        let text = render_listing(&payload(Some("cash on delivery & tips")));
        assert!(text.ends_with("📌 Note: cash on delivery &amp; tips"));
    }

    #[test]
    fn menu_includes_channel_link_when_configured() {
        assert!(!menu_text(None).contains("🌐"));
        let with_link = menu_text(Some("https://t.me/gigboard"));
        assert!(with_link.contains("🌐 Channel: https://t.me/gigboard"));
    }

    #[test]
    fn summary_lists_ids_and_titles() {
        let job = Job {
            id: JobId(7),
            owner: UserId(1),
            channel_message_id: ChannelMessageId(99),
            payload: payload(None),
            created_at: Utc::now(),
        };
        let text = listing_summary(&[job]);
        assert!(text.contains("#7 · Courier &lt;late shift&gt; — Riverside 12"));
    }

    #[test]
    fn escape_handles_all_reserved_characters() {
        assert_eq!(escape_html("a<b>&c"), "a&lt;b&gt;&amp;c");
    }
}
