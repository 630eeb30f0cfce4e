use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Fixed category set the model is asked to sort insights into.
pub const CATEGORIES: [&str; 7] = [
    "AI & ML",
    "Funding & Deals",
    "Market Trends",
    "Legal Tech",
    "Product Launches",
    "Policy & Regulation",
    "Specter-Relevant",
];

pub const NO_NEWSLETTERS_SUMMARY: &str = "No newsletters received today.";
pub const PARSE_FAILURE_SUMMARY: &str = "Failed to parse newsletter digest. Check logs.";

/// Models sometimes emit `null` for an empty field; treat it like a missing one.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Lists may also carry `null` elements; those are dropped.
fn nulls_dropped<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items = Option::<Vec<Option<T>>>::deserialize(d)?.unwrap_or_default();
    Ok(items.into_iter().flatten().collect())
}

/// Category map where a whole entry or single insights may be `null`.
fn lenient_categories<'de, D>(d: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<Vec<Option<String>>>>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|(name, insights)| (name, insights.unwrap_or_default().into_iter().flatten().collect()))
        .collect())
}

pub fn is_known_category(name: &str) -> bool {
    CATEGORIES.contains(&name)
}

/// Structured digest for one day's newsletters.
///
/// Every field defaults to empty so partial model output still deserializes.
/// `parse_error` / `raw_response` are only present when the reply could not be
/// decoded at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestResult {
    #[serde(deserialize_with = "null_as_default")]
    pub executive_summary: String,
    #[serde(deserialize_with = "lenient_categories")]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(deserialize_with = "nulls_dropped")]
    pub per_source: Vec<SourceSummary>,
    #[serde(deserialize_with = "nulls_dropped")]
    pub specter_relevant: Vec<String>,
    #[serde(deserialize_with = "nulls_dropped")]
    pub active_categories: Vec<String>,
    #[serde(rename = "_parse_error", skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(rename = "_raw_response", skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSummary {
    #[serde(deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(deserialize_with = "nulls_dropped")]
    pub key_facts: Vec<String>,
    #[serde(deserialize_with = "nulls_dropped")]
    pub links: Vec<String>,
}

impl DigestResult {
    pub fn empty_day() -> Self {
        Self {
            executive_summary: NO_NEWSLETTERS_SUMMARY.to_string(),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.executive_summary.is_empty() || self.executive_summary.starts_with("Failed")
    }

    /// `active_categories` restricted to the fixed category set, in the model's order.
    pub fn known_active_categories(&self) -> Vec<&str> {
        self.active_categories
            .iter()
            .map(String::as_str)
            .filter(|c| is_known_category(c))
            .collect()
    }

    /// Active categories the model listed but gave no insights for, and
    /// non-empty categories it forgot to list.
    pub fn category_mismatches(&self) -> (Vec<&str>, Vec<&str>) {
        let listed_but_empty = self
            .active_categories
            .iter()
            .filter(|c| self.categories.get(c.as_str()).map_or(true, Vec::is_empty))
            .map(String::as_str)
            .collect();
        let filled_but_unlisted = self
            .categories
            .iter()
            .filter(|(name, insights)| !insights.is_empty() && !self.active_categories.contains(*name))
            .map(|(name, _)| name.as_str())
            .collect();
        (listed_but_empty, filled_but_unlisted)
    }

    /// Sources as listed by the model, "Unknown" for blank names.
    pub fn source_names(&self) -> Vec<&str> {
        self.per_source
            .iter()
            .map(|s| if s.source.trim().is_empty() { "Unknown" } else { s.source.as_str() })
            .collect()
    }
}
