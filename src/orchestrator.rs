use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::budget::TokenBudget;
use crate::config::Config;
use crate::fetch::GmailFetcher;
use crate::llm::AnthropicClient;
use crate::out_models::DigestResult;
use crate::publish::NotionPublisher;
use crate::render::render_digest_markdown;
use crate::summarize::Summarizer;

fn write_json<P: AsRef<Path>, T: ?Sized + Serialize>(path: P, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_vec_pretty(value)?)
        .map(|_| ())
        .map_err(|e| e.into())
}

/// Write `digest_{date}.json` and `digest_{date}.md` into `output_dir`.
pub fn write_dry_run(digest: &DigestResult, date: NaiveDate, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating output directory {}", output_dir.display()))?;

    let stem = format!("digest_{}", date.format("%Y-%m-%d"));
    let json_path = output_dir.join(format!("{}.json", stem));
    let md_path = output_dir.join(format!("{}.md", stem));

    write_json(&json_path, digest).with_context(|| format!("Writing {}", json_path.display()))?;
    fs::write(&md_path, render_digest_markdown(digest, date))
        .with_context(|| format!("Writing {}", md_path.display()))?;
    Ok((json_path, md_path))
}

fn summary_preview(summary: &str) -> String {
    summary.chars().take(100).collect()
}

fn log_digest_stats(digest: &DigestResult) {
    info!(
        "Digest ready - active_categories={:?}, specter_items={}, sources={}",
        digest.active_categories,
        digest.specter_relevant.len(),
        digest.per_source.len()
    );
    info!("Executive summary: {}...", summary_preview(&digest.executive_summary));

    // active_categories is taken as reported; mismatches are only surfaced
    let (listed_but_empty, filled_but_unlisted) = digest.category_mismatches();
    if !listed_but_empty.is_empty() {
        warn!("Active categories without insights: {:?}", listed_but_empty);
    }
    if !filled_but_unlisted.is_empty() {
        warn!("Categories with insights but not listed as active: {:?}", filled_but_unlisted);
    }
    if let Some(err) = &digest.parse_error {
        warn!("Digest was recovered from an undecodable reply: {}", err);
    }
}

/// One day's run: fetch, summarize, then publish to Notion or write local files.
pub async fn run_daily(cfg: &Config, date: NaiveDate, dry_run: bool, output_dir: &Path) -> Result<()> {
    let pipeline_start = std::time::Instant::now();
    info!(
        "Pipeline started - date={}, dry_run={}, timezone={}",
        date,
        dry_run,
        cfg.timezone.name()
    );

    // 1) fetch
    let fetch_start = std::time::Instant::now();
    let fetcher = GmailFetcher::connect(cfg).await.context("Connecting to Gmail")?;
    let newsletters = fetcher
        .fetch_newsletters(date, cfg.timezone)
        .await
        .context("Fetching newsletters")?;
    info!(
        "Fetch completed - duration={:.2}s, newsletters={}",
        fetch_start.elapsed().as_secs_f32(),
        newsletters.len()
    );

    if newsletters.is_empty() {
        info!("No newsletters found. Nothing to do.");
        return Ok(());
    }
    for n in &newsletters {
        debug!("Newsletter - sender={}, subject={}, chars={}", n.sender, n.subject, n.body.chars().count());
    }

    // 2) summarize
    let summarize_start = std::time::Instant::now();
    let client = AnthropicClient::new(cfg)?;
    info!("Summarizing with model {}", client.model());
    let budget = TokenBudget::new(cfg.max_input_tokens, cfg.chars_per_token);
    let digest = Summarizer::new(&client, budget)
        .summarize(&newsletters, date)
        .await?;
    info!(
        "Summarization completed - duration={:.2}s",
        summarize_start.elapsed().as_secs_f32()
    );
    log_digest_stats(&digest);

    // 3) deliver
    if dry_run {
        let (json_path, md_path) = write_dry_run(&digest, date, output_dir)?;
        info!("Dry run - wrote {} and {}", json_path.display(), md_path.display());
        println!("\n📋 Executive Summary:\n{}", digest.executive_summary);
    } else {
        let publisher = NotionPublisher::new(cfg)?;
        let url = publisher
            .publish_digest(&digest, date, newsletters.len())
            .await
            .context("Publishing to Notion")?;
        info!("Published to Notion: {}", url);
    }

    info!(
        "Pipeline completed - duration={:.2}s, newsletters={}",
        pipeline_start.elapsed().as_secs_f32(),
        newsletters.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_digest;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn dry_run_writes_json_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested");
        let digest = decode_digest(
            r#"{"executive_summary":"Quiet day.","categories":{"AI & ML":["Model X"]},"active_categories":["AI & ML"]}"#,
        );

        let (json_path, md_path) = write_dry_run(&digest, day(), &out).unwrap();
        assert_eq!(json_path, out.join("digest_2026-10-16.json"));
        assert_eq!(md_path, out.join("digest_2026-10-16.md"));

        let saved: DigestResult = serde_json::from_slice(&fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(saved, digest);
        let raw = fs::read_to_string(&json_path).unwrap();
        assert!(raw.contains("\n  \"executive_summary\": \"Quiet day.\""));
        assert!(!raw.contains("_parse_error"));

        let md = fs::read_to_string(&md_path).unwrap();
        assert!(md.contains("## Executive Summary\nQuiet day."));
        assert!(md.contains("### AI & ML\n- Model X"));
    }

    #[test]
    fn failure_digest_keeps_diagnostics_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let digest = decode_digest("the model rambled");
        let (json_path, _) = write_dry_run(&digest, day(), dir.path()).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&fs::read(json_path).unwrap()).unwrap();
        assert_eq!(raw["_raw_response"], "the model rambled");
        assert!(raw["_parse_error"].is_string());
    }

    #[test]
    fn preview_is_char_bounded() {
        assert_eq!(summary_preview("short"), "short");
        let long = "é".repeat(150);
        assert_eq!(summary_preview(&long).chars().count(), 100);
    }
}
