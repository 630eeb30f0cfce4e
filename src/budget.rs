use crate::models::NewsletterRecord;

/// Tokens reserved for the fixed part of every extraction prompt.
pub const PROMPT_OVERHEAD_TOKENS: usize = 2000;
/// Tokens reserved per newsletter for its header lines and delimiter.
pub const RECORD_OVERHEAD_TOKENS: usize = 200;

/// Rough token count: `chars / chars_per_token`, rounded down.
///
/// This is a character heuristic, not a real tokenizer; it only needs to be
/// pessimistic enough to keep prompts under the model's context window.
pub fn estimate_tokens(s: &str, chars_per_token: usize) -> usize {
    s.chars().count() / chars_per_token.max(1)
}

/// A contiguous run of newsletters sent to the model in one call.
pub type Chunk<'a> = &'a [NewsletterRecord];

#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    pub max_input_tokens: usize,
    pub chars_per_token: usize,
    pub prompt_overhead: usize,
    pub record_overhead: usize,
}

impl TokenBudget {
    pub fn new(max_input_tokens: usize, chars_per_token: usize) -> Self {
        Self {
            max_input_tokens,
            chars_per_token,
            prompt_overhead: PROMPT_OVERHEAD_TOKENS,
            record_overhead: RECORD_OVERHEAD_TOKENS,
        }
    }

    pub fn estimate(&self, s: &str) -> usize {
        estimate_tokens(s, self.chars_per_token)
    }

    pub fn fits(&self, tokens: usize) -> bool {
        tokens <= self.max_input_tokens
    }

    pub fn partition<'a>(&self, records: &'a [NewsletterRecord]) -> Vec<Chunk<'a>> {
        partition(
            records,
            self.max_input_tokens,
            self.prompt_overhead,
            self.record_overhead,
            self.chars_per_token,
        )
    }
}

/// Greedy, order-preserving split of `records` into the fewest chunks whose
/// estimated cost stays within `budget`.
///
/// A record that is too large on its own still gets a chunk of its own; it is
/// never dropped or split.
pub fn partition<'a>(
    records: &'a [NewsletterRecord],
    budget: usize,
    fixed_overhead: usize,
    per_record_overhead: usize,
    chars_per_token: usize,
) -> Vec<Chunk<'a>> {
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut current_cost = fixed_overhead;

    for (i, r) in records.iter().enumerate() {
        let cost = estimate_tokens(&r.body, chars_per_token) + per_record_overhead;
        if i > start && current_cost + cost > budget {
            chunks.push(&records[start..i]);
            start = i;
            current_cost = fixed_overhead;
        }
        current_cost += cost;
    }
    if start < records.len() {
        chunks.push(&records[start..]);
    }
    chunks
}
