use serde::{Deserialize, Serialize};

/// One newsletter email, already converted to plain text and capped by the fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterRecord {
    pub sender: String,
    pub subject: String,
    pub date: Option<String>, // ISO8601, None when the Date header is missing/unparseable
    pub body: String,
    pub message_id: String,
}

#[cfg(test)]
pub(crate) fn record(sender: &str, subject: &str, body: &str) -> NewsletterRecord {
    NewsletterRecord {
        sender: sender.to_string(),
        subject: subject.to_string(),
        date: None,
        body: body.to_string(),
        message_id: format!("msg-{}", subject.to_lowercase().replace(' ', "-")),
    }
}
