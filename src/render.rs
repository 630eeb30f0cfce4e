use chrono::NaiveDate;

use crate::out_models::{DigestResult, CATEGORIES};

/// Non-empty categories: the fixed set first in its canonical order, then any
/// extra names the model invented, alphabetically.
pub fn ordered_categories(d: &DigestResult) -> Vec<(&str, &[String])> {
    let known = CATEGORIES
        .iter()
        .filter_map(|c| d.categories.get_key_value(*c));
    let extra = d
        .categories
        .iter()
        .filter(|(name, _)| !CATEGORIES.contains(&name.as_str()));
    known
        .chain(extra)
        .filter(|(_, insights)| !insights.is_empty())
        .map(|(name, insights)| (name.as_str(), insights.as_slice()))
        .collect()
}

/// Dry-run rendering; same section order as the Notion page.
pub fn render_digest_markdown(d: &DigestResult, date: NaiveDate) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Newsletter Digest — {}\n\n", date.format("%B %d, %Y")));

    md.push_str("## Executive Summary\n");
    let summary = d.executive_summary.trim();
    md.push_str(&format!(
        "{}\n\n",
        if summary.is_empty() { "No summary available." } else { summary }
    ));

    if !d.specter_relevant.is_empty() {
        md.push_str("## 🎯 Specter-Relevant\n");
        for item in &d.specter_relevant {
            md.push_str(&format!("- ⚡ {}\n", item));
        }
        md.push('\n');
    }

    let categories = ordered_categories(d);
    if !categories.is_empty() {
        md.push_str("## Categorized Insights\n");
        for (name, insights) in categories {
            md.push_str(&format!("\n### {}\n", name));
            for insight in insights {
                md.push_str(&format!("- {}\n", insight));
            }
        }
        md.push('\n');
    }

    if !d.per_source.is_empty() {
        md.push_str("## Source Details\n");
        for (s, name) in d.per_source.iter().zip(d.source_names()) {
            md.push_str(&format!("\n### 📰 {}\n", name));
            if !s.summary.is_empty() {
                md.push_str(&format!("{}\n", s.summary.trim()));
            }
            for fact in &s.key_facts {
                md.push_str(&format!("- 📌 {}\n", fact));
            }
            for link in &s.links {
                md.push_str(&format!("- 🔗 {}\n", link));
            }
            if s.summary.is_empty() && s.key_facts.is_empty() && s.links.is_empty() {
                md.push_str("No details extracted.\n");
            }
        }
        md.push('\n');
    }

    if let Some(err) = &d.parse_error {
        md.push_str(&format!("---\n_Parse error: {}_\n", err));
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::out_models::SourceSummary;
    use std::collections::BTreeMap;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn categories_follow_canonical_order_and_skip_empty() {
        let mut categories = BTreeMap::new();
        categories.insert("Legal Tech".to_string(), vec!["a".to_string()]);
        categories.insert("AI & ML".to_string(), vec!["b".to_string()]);
        categories.insert("Market Trends".to_string(), vec![]);
        categories.insert("Crypto".to_string(), vec!["c".to_string()]);
        let d = DigestResult {
            categories,
            ..Default::default()
        };
        let names: Vec<&str> = ordered_categories(&d).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["AI & ML", "Legal Tech", "Crypto"]);
    }

    #[test]
    fn renders_sections_in_page_order() {
        let mut categories = BTreeMap::new();
        categories.insert("Funding & Deals".to_string(), vec!["Harvey raised $300M".to_string()]);
        let d = DigestResult {
            executive_summary: "Legal AI funding continues.".into(),
            categories,
            per_source: vec![
                SourceSummary {
                    source: "Axios Pro".into(),
                    summary: "Deal roundup.".into(),
                    key_facts: vec!["$300M Series E".into()],
                    links: vec!["https://example.com/harvey".into()],
                },
                SourceSummary {
                    source: " ".into(),
                    ..Default::default()
                },
            ],
            specter_relevant: vec!["Harvey raise".into()],
            active_categories: vec!["Funding & Deals".into()],
            ..Default::default()
        };
        let md = render_digest_markdown(&d, day());

        assert!(md.starts_with("# Newsletter Digest — October 16, 2026\n\n## Executive Summary\nLegal AI funding continues.\n"));
        let order = [
            "## Executive Summary",
            "## 🎯 Specter-Relevant",
            "- ⚡ Harvey raise",
            "## Categorized Insights",
            "### Funding & Deals",
            "- Harvey raised $300M",
            "## Source Details",
            "### 📰 Axios Pro",
            "- 📌 $300M Series E",
            "- 🔗 https://example.com/harvey",
            "### 📰 Unknown",
            "No details extracted.",
        ];
        let positions: Vec<usize> = order.iter().map(|s| md.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", md);
        assert!(!md.contains("Parse error"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let md = render_digest_markdown(&DigestResult::empty_day(), day());
        assert!(md.contains("No newsletters received today."));
        assert!(!md.contains("Specter"));
        assert!(!md.contains("Categorized Insights"));
        assert!(!md.contains("Source Details"));
    }

    #[test]
    fn parse_error_is_noted() {
        let d = DigestResult {
            executive_summary: "Failed to parse newsletter digest. Check logs.".into(),
            parse_error: Some("expected value at line 1 column 1".into()),
            ..Default::default()
        };
        let md = render_digest_markdown(&d, day());
        assert!(md.ends_with("_Parse error: expected value at line 1 column 1_\n"));
    }
}
