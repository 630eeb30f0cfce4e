use anyhow::{Context, Result};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;
use reqwest::Client;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;
use xxhash_rust::xxh3::xxh3_64;

use crate::api_types::*;
use crate::config::{Config, MAX_BODY_CHARS, MIN_BODY_CHARS};
use crate::html::html_to_text;
use crate::models::NewsletterRecord;

/// Gmail sends URL-safe base64, sometimes without padding.
const GMAIL_B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Unix-second bounds `[start, end)` of `date` as a calendar day in `tz`.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (i64, i64) {
    let local_midnight = |d: NaiveDate| -> i64 {
        let naive = d.and_hms_opt(0, 0, 0).unwrap_or_default();
        // zones that start DST at midnight skip it; the day then begins at
        // the first local instant that does exist
        (0..=2)
            .find_map(|h| tz.from_local_datetime(&(naive + Duration::hours(h))).earliest())
            .map(|dt| dt.timestamp())
            .unwrap_or_else(|| naive.and_utc().timestamp())
    };
    (local_midnight(date), local_midnight(date + Duration::days(1)))
}

pub fn gmail_query(label: &str, date: NaiveDate, tz: Tz) -> String {
    let (after, before) = day_bounds(date, tz);
    format!("label:{} after:{} before:{}", label, after, before)
}

fn header<'a>(headers: &'a [Header], name: &str) -> &'a str {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
        .unwrap_or("")
}

/// RFC 2822 `Date` header to ISO 8601; `None` when missing or unparseable.
pub fn parse_date_header(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    // drop trailing comments like "(UTC)" or "(PST)"
    let value = match value.find(" (") {
        Some(idx) if value.ends_with(')') => &value[..idx],
        _ => value,
    };
    DateTime::parse_from_rfc2822(value).ok().map(|dt| dt.to_rfc3339())
}

fn decode_data(data: &str) -> Option<String> {
    GMAIL_B64
        .decode(data.trim())
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn part_data(part: &MessagePart) -> Option<&str> {
    part.body.data.as_deref().filter(|d| !d.is_empty())
}

/// Pull readable text out of a message payload, preferring HTML over plain
/// text and descending into nested multiparts.
pub fn extract_body(payload: &MessagePart) -> String {
    if let Some(data) = part_data(payload) {
        match payload.mime_type.as_str() {
            "text/html" => return decode_data(data).map(|h| html_to_text(&h)).unwrap_or_default(),
            "text/plain" => return decode_data(data).unwrap_or_default(),
            _ => {}
        }
    }

    let mut html_body = String::new();
    let mut plain_body = String::new();
    for part in &payload.parts {
        match (part.mime_type.as_str(), part_data(part)) {
            ("text/html", Some(data)) => {
                html_body = decode_data(data).map(|h| html_to_text(&h)).unwrap_or_default();
            }
            ("text/plain", Some(data)) => {
                plain_body = decode_data(data).unwrap_or_default();
            }
            (mime, _) if mime.starts_with("multipart/") => {
                let nested = extract_body(part);
                if html_body.is_empty() && !nested.is_empty() {
                    html_body = nested;
                }
            }
            _ => {}
        }
    }

    if html_body.is_empty() {
        plain_body
    } else {
        html_body
    }
}

fn cap_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s,
    }
}

/// Convert one API message to a record; `None` for empty/near-empty bodies.
pub fn to_record(msg: GmailMessage) -> Option<NewsletterRecord> {
    let headers = &msg.payload.headers;
    let subject = header(headers, "Subject").to_string();
    let sender = header(headers, "From").to_string();
    let date = parse_date_header(header(headers, "Date"));
    let body = extract_body(&msg.payload);

    if body.trim().chars().count() < MIN_BODY_CHARS {
        warn!("Skipping empty/tiny newsletter - subject={:?}", subject);
        return None;
    }

    Some(NewsletterRecord {
        sender,
        subject,
        date,
        body: cap_chars(body, MAX_BODY_CHARS),
        message_id: msg.id,
    })
}

fn subject_key(subject: &str) -> u64 {
    xxh3_64(subject.trim().nfc().collect::<String>().to_lowercase().as_bytes())
}

/// Keep the first newsletter per subject; some senders double-send.
pub fn dedupe_by_subject(newsletters: Vec<NewsletterRecord>) -> Vec<NewsletterRecord> {
    let mut seen: HashSet<u64> = HashSet::new();
    newsletters
        .into_iter()
        .filter(|nl| seen.insert(subject_key(&nl.subject)))
        .collect()
}

/// Read-only Gmail client authorized for one run.
pub struct GmailFetcher {
    http: Client,
    access_token: String,
    api_base: String,
    label: String,
    max_newsletters: usize,
}

impl GmailFetcher {
    pub fn new(http: Client, access_token: String, cfg: &Config) -> Self {
        Self {
            http,
            access_token,
            api_base: cfg.gmail_api_base.trim_end_matches('/').to_string(),
            label: cfg.gmail_label.clone(),
            max_newsletters: cfg.max_newsletters,
        }
    }

    /// Exchange the stored refresh token for an access token and build a client.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let http = Client::builder().build()?;
        let raw = std::fs::read_to_string(&cfg.gmail_token_path)
            .with_context(|| format!("Reading Gmail token {}", cfg.gmail_token_path.display()))?;
        let user: AuthorizedUser = serde_json::from_str(&raw)
            .with_context(|| format!("Parsing Gmail token {}", cfg.gmail_token_path.display()))?;

        debug!("Refreshing Gmail access token - token_url={}", cfg.google_token_url);
        let resp = http
            .post(&cfg.google_token_url)
            .form(&[
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("Gmail token refresh request failed")?
            .error_for_status()
            .context("Gmail token refresh rejected")?;
        let token: TokenResponse = resp.json().await.context("Decoding Gmail token response")?;
        debug!("Gmail access token refreshed - expires_in={:?}", token.expires_in);

        Ok(Self::new(http, token.access_token, cfg))
    }

    async fn list_message_ids(&self, query: &str) -> Result<Vec<String>> {
        let url = format!("{}/gmail/v1/users/me/messages", self.api_base);
        let max_results = self.max_newsletters.to_string();
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut req = self
                .http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[("q", query), ("maxResults", max_results.as_str())]);
            if let Some(t) = &page_token {
                req = req.query(&[("pageToken", t.as_str())]);
            }
            let page: ListMessagesResponse = req
                .send()
                .await
                .with_context(|| format!("Request failed for {}", url))?
                .error_for_status()
                .with_context(|| format!("HTTP error for {}", url))?
                .json()
                .await
                .context("Decoding Gmail message list")?;

            ids.extend(page.messages.into_iter().map(|m| m.id));
            page_token = page.next_page_token;
            if page_token.is_none() || ids.len() >= self.max_newsletters {
                break;
            }
        }
        ids.truncate(self.max_newsletters);
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<GmailMessage> {
        let url = format!("{}/gmail/v1/users/me/messages/{}", self.api_base, id);
        self.http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .with_context(|| format!("Request failed for {}", url))?
            .error_for_status()
            .with_context(|| format!("HTTP error for {}", url))?
            .json()
            .await
            .with_context(|| format!("Decoding JSON for {}", url))
    }

    /// Newsletters labelled for `date` (a calendar day in `tz`), in list order.
    pub async fn fetch_newsletters(&self, date: NaiveDate, tz: Tz) -> Result<Vec<NewsletterRecord>> {
        let start = std::time::Instant::now();
        let query = gmail_query(&self.label, date, tz);
        info!("Gmail query: {}", query);

        let ids = self.list_message_ids(&query).await?;
        if ids.is_empty() {
            info!("No newsletters found for this date.");
            return Ok(Vec::new());
        }
        info!("Found {} newsletters. Fetching bodies...", ids.len());

        let mut newsletters = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.get_message(id).await {
                Ok(msg) => {
                    if let Some(nl) = to_record(msg) {
                        newsletters.push(nl);
                    }
                }
                Err(e) => warn!("Failed to fetch message {}: {:#}", id, e),
            }
        }
        info!("Successfully fetched {} newsletters.", newsletters.len());

        let unique = dedupe_by_subject(newsletters);
        info!(
            "Gmail fetch completed - duration={:.2}s, unique_newsletters={}",
            start.elapsed().as_secs_f32(),
            unique.len()
        );
        Ok(unique)
    }
}
