use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::budget::TokenBudget;
use crate::decode::decode_digest;
use crate::llm::Oracle;
use crate::models::NewsletterRecord;
use crate::out_models::DigestResult;
use crate::prompts::{format_newsletters_block, user_chunk_synthesis, user_extraction};

/// Human-readable date used inside prompts, e.g. "October 16, 2026".
pub fn prompt_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

/// Drives the model calls for one day's digest.
///
/// Everything that fits the input budget goes out in a single extraction call.
/// Otherwise newsletters are split into budget-sized chunks, each chunk gets
/// its own extraction call, and the raw chunk replies are merged by one final
/// synthesis call. Only the final reply is decoded.
pub struct Summarizer<'a, O: Oracle + ?Sized> {
    oracle: &'a O,
    budget: TokenBudget,
}

impl<'a, O: Oracle + ?Sized> Summarizer<'a, O> {
    pub fn new(oracle: &'a O, budget: TokenBudget) -> Self {
        Self { oracle, budget }
    }

    pub async fn summarize(&self, newsletters: &[NewsletterRecord], date: NaiveDate) -> Result<DigestResult> {
        if newsletters.is_empty() {
            debug!("No newsletters to summarize - skipping LLM");
            return Ok(DigestResult::empty_day());
        }

        let date_str = prompt_date(date);
        let all_content = format_newsletters_block(newsletters);
        let total_tokens = self.budget.estimate(&all_content) + self.budget.prompt_overhead;

        if self.budget.fits(total_tokens) {
            info!(
                "Single-call mode - newsletters={}, approx_tokens={}",
                newsletters.len(),
                total_tokens
            );
            let prompt = user_extraction(&date_str, newsletters.len(), &all_content);
            let reply = self
                .oracle
                .generate(&prompt)
                .await
                .context("LLM extraction call failed")?;
            return Ok(decode_digest(&reply));
        }

        info!(
            "Chunked mode - newsletters={}, approx_tokens={}, budget={}",
            newsletters.len(),
            total_tokens,
            self.budget.max_input_tokens
        );
        let chunks = self.budget.partition(newsletters);
        info!("Split into {} chunks", chunks.len());

        let mut partial_replies = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            info!(
                "Processing chunk {}/{} ({} newsletters)",
                i + 1,
                chunks.len(),
                chunk.len()
            );
            let prompt = user_extraction(&date_str, chunk.len(), &format_newsletters_block(chunk));
            let reply = self
                .oracle
                .generate(&prompt)
                .await
                .with_context(|| format!("LLM call failed for chunk {}/{}", i + 1, chunks.len()))?;
            partial_replies.push(reply);
        }

        info!("Synthesizing {} chunks into final digest", partial_replies.len());
        let synthesis = user_chunk_synthesis(&date_str, &partial_replies);
        let reply = self
            .oracle
            .generate(&synthesis)
            .await
            .context("LLM synthesis call failed")?;
        Ok(decode_digest(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record;
    use crate::out_models::{NO_NEWSLETTERS_SUMMARY, PARSE_FAILURE_SUMMARY};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every prompt it was given.
    struct ScriptedOracle {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn always(reply: &str, n: usize) -> Self {
            Self::new((0..n).map(|_| Ok(reply.to_string())).collect())
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no scripted reply left")))
        }
    }

    const DIGEST_JSON: &str = r#"{"executive_summary":"Legal AI is hot.","categories":{"Legal Tech":["Harvey raised (Source: Axios)"]},"per_source":[{"source":"Axios","summary":"s","key_facts":[],"links":[]}],"specter_relevant":["Harvey"],"active_categories":["Legal Tech"]}"#;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn newsletters(n: usize, body_chars: usize) -> Vec<NewsletterRecord> {
        (0..n)
            .map(|i| record(&format!("Sender {}", i), &format!("Issue {}", i), &"w".repeat(body_chars)))
            .collect()
    }

    #[test]
    fn prompt_date_is_long_form() {
        assert_eq!(prompt_date(day()), "October 16, 2026");
        assert_eq!(prompt_date(NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()), "March 04, 2026");
    }

    #[tokio::test]
    async fn no_newsletters_makes_no_calls() {
        let oracle = ScriptedOracle::new(vec![]);
        let s = Summarizer::new(&oracle, TokenBudget::new(75_000, 4));
        let d = s.summarize(&[], day()).await.unwrap();

        assert_eq!(d.executive_summary, NO_NEWSLETTERS_SUMMARY);
        assert!(d.categories.is_empty());
        assert!(d.per_source.is_empty());
        assert!(d.specter_relevant.is_empty());
        assert!(d.active_categories.is_empty());
        assert!(oracle.prompts().is_empty());
    }

    #[tokio::test]
    async fn small_day_is_one_call() {
        let oracle = ScriptedOracle::always(DIGEST_JSON, 1);
        let s = Summarizer::new(&oracle, TokenBudget::new(75_000, 4));
        let records = newsletters(5, 2_000);
        let d = s.summarize(&records, day()).await.unwrap();

        let prompts = oracle.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("full text of 5 newsletters"));
        assert!(prompts[0].contains("Today's date: October 16, 2026"));
        assert!(prompts[0].contains("=== NEWSLETTER 5 ==="));
        assert_eq!(d, decode_digest(DIGEST_JSON));
    }

    #[tokio::test]
    async fn large_day_is_chunked_then_synthesized() {
        // 25 * (3750 + 200) tokens is far over a 20k budget; 4 records per chunk.
        let records = newsletters(25, 15_000);
        let budget = TokenBudget::new(20_000, 4);
        let expected_chunks = budget.partition(&records).len();
        assert_eq!(expected_chunks, 7);

        let mut replies: Vec<Result<String>> = (0..expected_chunks)
            .map(|i| Ok(format!("{{\"executive_summary\":\"partial {}\"}}", i)))
            .collect();
        replies.push(Ok(DIGEST_JSON.to_string()));
        let oracle = ScriptedOracle::new(replies);

        let d = Summarizer::new(&oracle, budget).summarize(&records, day()).await.unwrap();
        assert_eq!(d, decode_digest(DIGEST_JSON));

        let prompts = oracle.prompts();
        assert_eq!(prompts.len(), expected_chunks + 1);
        assert!(prompts[0].contains("full text of 4 newsletters"));
        assert!(prompts[0].contains("From: Sender 3\n"));
        assert!(!prompts[0].contains("From: Sender 4\n"));
        assert!(prompts[6].contains("full text of 1 newsletters"));
        assert!(prompts[6].contains("From: Sender 24\n"));

        let synthesis = prompts.last().unwrap();
        assert!(synthesis.starts_with("You are combining multiple partial newsletter analyses"));
        assert!(synthesis.contains(
            "{\"executive_summary\":\"partial 0\"}\n\n---\n\n{\"executive_summary\":\"partial 1\"}"
        ));
        assert!(synthesis.contains("{\"executive_summary\":\"partial 6\"}"));
    }

    #[tokio::test]
    async fn chunk_replies_are_passed_through_raw() {
        let records = newsletters(3, 15_000);
        let budget = TokenBudget::new(6_000, 4);
        let oracle = ScriptedOracle::new(vec![
            Ok("not json".to_string()),
            Ok("```json\n{}\n```".to_string()),
            Ok("{}".to_string()),
            Ok("still not json".to_string()),
        ]);
        let d = Summarizer::new(&oracle, budget).summarize(&records, day()).await.unwrap();

        let synthesis = oracle.prompts().pop().unwrap();
        assert!(synthesis.contains("not json\n\n---\n\n```json\n{}\n```\n\n---\n\n{}"));
        // only the final reply is decoded
        assert_eq!(d.executive_summary, PARSE_FAILURE_SUMMARY);
        assert_eq!(d.raw_response.as_deref(), Some("still not json"));
    }

    #[tokio::test]
    async fn fenced_reply_is_unwrapped() {
        let oracle = ScriptedOracle::always("```json\n{\"executive_summary\":\"x\",\"categories\":{}}\n```", 1);
        let d = Summarizer::new(&oracle, TokenBudget::new(75_000, 4))
            .summarize(&newsletters(1, 500), day())
            .await
            .unwrap();
        assert_eq!(d.executive_summary, "x");
        assert!(d.parse_error.is_none());
    }

    #[tokio::test]
    async fn malformed_reply_is_recovered() {
        let oracle = ScriptedOracle::always("not json at all", 1);
        let d = Summarizer::new(&oracle, TokenBudget::new(75_000, 4))
            .summarize(&newsletters(2, 500), day())
            .await
            .unwrap();
        assert_eq!(d.executive_summary, PARSE_FAILURE_SUMMARY);
        assert!(d.categories.is_empty());
        assert!(!d.parse_error.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oracle_failure_aborts_without_retry() {
        let records = newsletters(25, 15_000);
        let oracle = ScriptedOracle::new(vec![
            Ok("{}".to_string()),
            Err(anyhow!("connection reset")),
            Ok("{}".to_string()),
        ]);
        let err = Summarizer::new(&oracle, TokenBudget::new(20_000, 4))
            .summarize(&records, day())
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("connection reset"));
        assert!(err.to_string().contains("chunk 2/7"));
        assert_eq!(oracle.prompts().len(), 2);
    }

    #[tokio::test]
    async fn works_through_a_trait_object() {
        let oracle = ScriptedOracle::always(DIGEST_JSON, 1);
        let dyn_oracle: &dyn Oracle = &oracle;
        let d = Summarizer::new(dyn_oracle, TokenBudget::new(75_000, 4))
            .summarize(&newsletters(1, 100), day())
            .await
            .unwrap();
        assert_eq!(d.executive_summary, "Legal AI is hot.");
    }
}
