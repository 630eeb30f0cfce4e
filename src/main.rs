mod api_types;
mod budget;
mod config;
mod decode;
mod fetch;
mod html;
mod llm;
mod models;
mod orchestrator;
mod out_models;
mod prompts;
mod publish;
mod render;
mod summarize;

use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;

use config::Config;
use orchestrator::run_daily;

/// Newsletter Digest - daily Gmail newsletter summary published to Notion
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Process newsletters from this date (YYYY-MM-DD) instead of yesterday
    #[arg(long)]
    date: Option<String>,

    /// Process today's newsletters instead of yesterday's
    #[arg(long)]
    today: bool,

    /// Summarize but don't publish; write digest JSON and Markdown locally
    #[arg(long)]
    dry_run: bool,

    /// Directory for dry-run output files
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

/// Log file location split into the directory and file name the appender wants.
fn log_file_parts(path: &Path) -> Option<(PathBuf, String)> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, name))
}

/// Stdout logging, plus a copy of every line appended to `log_file` when one is given.
fn init_tracing(log_level: &str, log_file: Option<&Path>) {
    let mut file_error = None;
    let file_layer = log_file.and_then(log_file_parts).and_then(|(dir, name)| {
        match RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(name)
            .build(&dir)
        {
            Ok(appender) => Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(false)
                    .with_line_number(true),
            ),
            Err(e) => {
                file_error = Some(e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(true),
        )
        .with(file_layer)
        .init();

    if let Some(e) = file_error {
        warn!("File logging disabled - {}", e);
    }
}

/// `--date` wins, then `--today`, else yesterday in the digest time zone.
fn target_date(args: &Args, today: NaiveDate) -> Result<NaiveDate, chrono::ParseError> {
    match &args.date {
        Some(d) => NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d"),
        None if args.today => Ok(today),
        None => Ok(today - Duration::days(1)),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing("info", None);
            error!("{}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&cfg.log_level, Some(&cfg.log_file));
    info!("Starting newsletter_digest");

    if let Err(e) = cfg.validate(args.dry_run) {
        error!("{}", e);
        std::process::exit(1);
    }

    let today = Utc::now().with_timezone(&cfg.timezone).date_naive();
    let date = match target_date(&args, today) {
        Ok(d) => d,
        Err(e) => {
            error!("Invalid --date {:?} (expected YYYY-MM-DD): {}", args.date.as_deref().unwrap_or_default(), e);
            std::process::exit(1);
        }
    };
    debug!("Target date resolved - date={}, local_today={}", date, today);

    if let Err(e) = run_daily(&cfg, date, args.dry_run, &args.output_dir).await {
        error!("Pipeline failed: {:#}", e);
        std::process::exit(1);
    }
}
