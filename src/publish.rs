use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::out_models::DigestResult;
use crate::render::ordered_categories;

const NOTION_VERSION: &str = "2022-06-28";
/// Notion rejects rich text longer than this per text object.
const MAX_TEXT_CHARS: usize = 2000;
/// Notion accepts at most this many children in one create-page request.
const MAX_BLOCKS: usize = 100;

/* ------------------------------ Block builders ----------------------------- */

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn rich_text(text: &str) -> Value {
    json!([{ "type": "text", "text": { "content": truncate(text, MAX_TEXT_CHARS) } }])
}

fn block(kind: &str, content: Value) -> Value {
    json!({ "object": "block", "type": kind, kind: content })
}

fn paragraph(text: &str) -> Value {
    block("paragraph", json!({ "rich_text": rich_text(text) }))
}

fn heading(text: &str, level: u8) -> Value {
    block(&format!("heading_{}", level), json!({ "rich_text": rich_text(text) }))
}

fn bullet(text: &str) -> Value {
    block("bulleted_list_item", json!({ "rich_text": rich_text(text) }))
}

fn callout(text: &str, emoji: &str) -> Value {
    block(
        "callout",
        json!({ "rich_text": rich_text(text), "icon": { "type": "emoji", "emoji": emoji } }),
    )
}

fn toggle(title: &str, children: Vec<Value>) -> Value {
    block("toggle", json!({ "rich_text": rich_text(title), "children": children }))
}

fn divider() -> Value {
    block("divider", json!({}))
}

pub fn category_emoji(category: &str) -> &'static str {
    match category {
        "AI & ML" => "🤖",
        "Funding & Deals" => "💰",
        "Market Trends" => "📈",
        "Legal Tech" => "⚖️",
        "Product Launches" => "🚀",
        "Policy & Regulation" => "📜",
        "Specter-Relevant" => "🎯",
        _ => "📌",
    }
}

/* ------------------------------- Page layout ------------------------------- */

/// Page body: summary, specter callouts, categorized bullets, per-source toggles.
pub fn build_page_content(digest: &DigestResult) -> Vec<Value> {
    let mut blocks = Vec::new();

    blocks.push(heading("Executive Summary", 2));
    let summary = if digest.executive_summary.is_empty() {
        "No summary available."
    } else {
        digest.executive_summary.as_str()
    };
    blocks.push(callout(summary, "📋"));
    blocks.push(divider());

    if !digest.specter_relevant.is_empty() {
        blocks.push(heading("🎯 Specter-Relevant", 2));
        for item in &digest.specter_relevant {
            blocks.push(callout(item, "⚡"));
        }
        blocks.push(divider());
    }

    let categories = ordered_categories(digest);
    if !categories.is_empty() {
        blocks.push(heading("Categorized Insights", 2));
        for (category, insights) in categories {
            blocks.push(heading(&format!("{} {}", category_emoji(category), category), 3));
            for insight in insights {
                blocks.push(bullet(insight));
            }
        }
        blocks.push(divider());
    }

    if !digest.per_source.is_empty() {
        blocks.push(heading("Source Details", 2));
        for (source, name) in digest.per_source.iter().zip(digest.source_names()) {
            let mut children = Vec::new();
            if !source.summary.is_empty() {
                children.push(paragraph(&source.summary));
            }
            for fact in &source.key_facts {
                children.push(bullet(&format!("📌 {}", fact)));
            }
            for link in &source.links {
                children.push(bullet(&format!("🔗 {}", link)));
            }
            if children.is_empty() {
                children.push(paragraph("No details extracted."));
            }
            blocks.push(toggle(&format!("📰 {}", name), children));
        }
    }

    if blocks.len() > MAX_BLOCKS {
        warn!("Truncating blocks from {} to {} (Notion limit)", blocks.len(), MAX_BLOCKS);
        blocks.truncate(MAX_BLOCKS - 1);
        blocks.push(paragraph("⚠️ Content truncated due to Notion block limit."));
    }
    blocks
}

/// "Failed" beats "Partial" beats "Generated".
pub fn digest_status(digest: &DigestResult) -> &'static str {
    if digest.is_failed() {
        "Failed"
    } else if digest.parse_error.is_some() {
        "Partial"
    } else {
        "Generated"
    }
}

pub fn page_title(date: NaiveDate) -> String {
    format!("📬 Newsletter Digest — {}", date.format("%B %d, %Y"))
}

pub fn build_page_properties(digest: &DigestResult, date: NaiveDate, newsletter_count: usize) -> Value {
    let categories: Vec<Value> = digest
        .known_active_categories()
        .into_iter()
        .map(|c| json!({ "name": c }))
        .collect();
    let sources = digest.source_names().join(", ");

    json!({
        "Title": { "title": [{ "text": { "content": page_title(date) } }] },
        "Date": { "date": { "start": date.format("%Y-%m-%d").to_string() } },
        "Newsletter Count": { "number": newsletter_count },
        "Categories": { "multi_select": categories },
        "Status": { "select": { "name": digest_status(digest) } },
        "Sources": { "rich_text": [{ "text": { "content": truncate(&sources, MAX_TEXT_CHARS) } }] },
    })
}

/* --------------------------------- Client ---------------------------------- */

pub struct NotionPublisher {
    http: Client,
    api_key: String,
    database_id: String,
    api_base: String,
}

impl NotionPublisher {
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self {
            http: Client::builder().build().context("building Notion HTTP client")?,
            api_key: cfg.notion_api_key.clone(),
            database_id: cfg.notion_database_id.clone(),
            api_base: cfg.notion_api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Create one page (properties + content) in the digest database; returns its URL.
    pub async fn publish_digest(&self, digest: &DigestResult, date: NaiveDate, newsletter_count: usize) -> Result<String> {
        let start = std::time::Instant::now();
        let children = build_page_content(digest);
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": build_page_properties(digest, date, newsletter_count),
            "children": children,
        });
        info!("Creating Notion page: {}", page_title(date));
        debug!("Notion page payload - blocks={}", body["children"].as_array().map_or(0, Vec::len));

        let url = format!("{}/v1/pages", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Request failed for {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("Failed to create Notion page ({}): {}", status, detail);
        }

        let page: Value = resp.json().await.context("Decoding Notion page response")?;
        let page_url = page["url"]
            .as_str()
            .context("Notion response has no page url")?
            .to_string();
        info!(
            "Notion page created - duration={:.2}s, url={}",
            start.elapsed().as_secs_f32(),
            page_url
        );
        Ok(page_url)
    }
}
