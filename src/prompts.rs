use crate::models::NewsletterRecord;
use crate::out_models::CATEGORIES;

/// Separator placed between raw chunk replies in the synthesis prompt.
pub const PARTIAL_SEPARATOR: &str = "\n\n---\n\n";

/// Render newsletters as one delimited text block, numbered from 1.
pub fn format_newsletters_block(newsletters: &[NewsletterRecord]) -> String {
    newsletters
        .iter()
        .enumerate()
        .map(|(i, nl)| {
            format!(
                "=== NEWSLETTER {n} ===\nFrom: {from}\nSubject: {subject}\nDate: {date}\n---\n{body}\n",
                n = i + 1,
                from = nl.sender,
                subject = nl.subject,
                date = nl.date.as_deref().unwrap_or("Unknown"),
                body = nl.body,
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn categories_list() -> String {
    CATEGORIES
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n   ")
}

pub fn user_extraction(date: &str, count: usize, newsletters_block: &str) -> String {
    format!(r#"You are a senior analyst creating a daily intelligence briefing from newsletters.
Today's date: {date}

You will receive the full text of {count} newsletters. Your job:

1. **Per-Newsletter Summary**: For each newsletter, extract:
   - Source (sender name)
   - 2-3 sentence summary of the most important points
   - Key facts, numbers, or quotes worth noting
   - Any links or resources mentioned

2. **Categorized Digest**: Group ALL insights across all newsletters into these categories:
   {categories}

   For each category that has relevant content:
   - Write 3-5 bullet points synthesizing across sources
   - Note which source(s) each insight came from
   - Highlight anything time-sensitive or actionable

3. **Executive Summary**: Write a 3-4 sentence overview of the most important things from today's newsletters. What should the reader pay attention to?

4. **Specter-Relevant Flag**: Specifically flag anything related to:
   - Legal technology, litigation tools, AI in law
   - Mass tort / class action news
   - Medical record processing, healthcare data
   - Funding rounds in legal tech or adjacent spaces

Output format - respond with ONLY valid JSON (no markdown fences):
{{
    "executive_summary": "...",
    "categories": {{
        "AI & ML": ["insight 1 (Source: X)", "insight 2 (Source: Y)"],
        "Funding & Deals": ["..."],
        ...
    }},
    "per_source": [
        {{
            "source": "Newsletter Name",
            "summary": "2-3 sentence summary",
            "key_facts": ["fact 1", "fact 2"],
            "links": ["url1", "url2"]
        }}
    ],
    "specter_relevant": ["specific item 1", "specific item 2"],
    "active_categories": ["AI & ML", "Funding & Deals"]
}}

Only include categories that have actual content. The "active_categories" array should list the category names that have insights.

---

Here are today's newsletters:

{newsletters}
"#,
        date = date,
        count = count,
        categories = categories_list(),
        newsletters = newsletters_block,
    )
}

pub fn user_chunk_synthesis(date: &str, partial_replies: &[String]) -> String {
    format!(r#"You are combining multiple partial newsletter analyses into one final daily briefing.
Today's date: {date}

Below are partial analyses from different batches of newsletters. Merge them into a single coherent briefing.

Combine and deduplicate insights. Produce the same JSON format:
{{
    "executive_summary": "...",
    "categories": {{...}},
    "per_source": [...],
    "specter_relevant": [...],
    "active_categories": [...]
}}

Partial analyses:
{chunks}
"#,
        date = date,
        chunks = partial_replies.join(PARTIAL_SEPARATOR),
    )
}
