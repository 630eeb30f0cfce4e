use chrono_tz::Tz;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com";
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Hard cap on reply length for every model call.
pub const MAX_OUTPUT_TOKENS: u32 = 4096;
/// Per-newsletter body cap applied by the fetcher (~3.7K tokens).
pub const MAX_BODY_CHARS: usize = 15_000;
/// Bodies shorter than this (after trimming) are treated as empty.
pub const MIN_BODY_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid {expected}: {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Configuration errors:\n{}", bullet_list(.0))]
    Missing(Vec<String>),
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Process-wide settings, read once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    // Anthropic
    pub anthropic_api_key: String,
    pub model: String,
    pub anthropic_api_base: String,
    pub llm_timeout: Duration,

    // Notion
    pub notion_api_key: String,
    pub notion_database_id: String,
    pub notion_api_base: String,

    // Gmail
    pub gmail_token_path: PathBuf,
    pub gmail_label: String,
    pub gmail_api_base: String,
    pub google_token_url: String,

    // Limits
    pub max_newsletters: usize,
    pub max_input_tokens: usize,
    pub chars_per_token: usize,

    pub timezone: Tz,
    pub log_level: String,
    pub log_file: PathBuf,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; `from_env` is this over `std::env::var`.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| -> String {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            anthropic_api_key: text("ANTHROPIC_API_KEY", ""),
            model: text("ANTHROPIC_MODEL", DEFAULT_MODEL),
            anthropic_api_base: text("ANTHROPIC_API_BASE", DEFAULT_ANTHROPIC_API_BASE),
            llm_timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 300u64, "number of seconds")?),

            notion_api_key: text("NOTION_API_KEY", ""),
            notion_database_id: text("NOTION_DATABASE_ID", ""),
            notion_api_base: text("NOTION_API_BASE", DEFAULT_NOTION_API_BASE),

            gmail_token_path: PathBuf::from(text("GMAIL_TOKEN_PATH", "token.json")),
            gmail_label: text("GMAIL_LABEL", "Newsletter"),
            gmail_api_base: text("GMAIL_API_BASE", DEFAULT_GMAIL_API_BASE),
            google_token_url: text("GOOGLE_TOKEN_URL", DEFAULT_GOOGLE_TOKEN_URL),

            max_newsletters: parse_or(&get, "MAX_NEWSLETTERS", 30usize, "positive integer")?,
            max_input_tokens: parse_or(&get, "MAX_INPUT_TOKENS", 75_000usize, "positive integer")?,
            chars_per_token: parse_or(&get, "CHARS_PER_TOKEN", 4usize, "positive integer")?,

            timezone: parse_or(&get, "DIGEST_TIMEZONE", Tz::UTC, "IANA time zone name")?,
            log_level: text("LOG_LEVEL", "info").to_lowercase(),
            log_file: PathBuf::from(text("LOG_FILE", "digest.log")),
        })
    }

    /// Check everything the run needs before any network call is made.
    /// Notion settings are only required when the digest will be published.
    pub fn validate(&self, dry_run: bool) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.anthropic_api_key.is_empty() {
            errors.push("ANTHROPIC_API_KEY not set".to_string());
        }
        if !dry_run {
            if self.notion_api_key.is_empty() {
                errors.push("NOTION_API_KEY not set".to_string());
            }
            if self.notion_database_id.is_empty() {
                errors.push("NOTION_DATABASE_ID not set".to_string());
            }
        }
        if !self.gmail_token_path.exists() {
            errors.push(format!(
                "Gmail token not found at {}",
                self.gmail_token_path.display()
            ));
        }
        if self.max_newsletters == 0 {
            errors.push("MAX_NEWSLETTERS must be at least 1".to_string());
        }
        if self.chars_per_token == 0 {
            errors.push("CHARS_PER_TOKEN must be at least 1".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(errors))
        }
    }
}

fn parse_or<F, T>(get: &F, key: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value: v,
        }),
    }
}
