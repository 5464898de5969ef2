//! Papers, ranking picks and the digest entries built from both.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// One search result, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub authors: String,
    pub url: String,
    pub pdf_url: String,
    pub published: DateTime<Utc>,
}

/// One paper chosen by the ranking model.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Pick {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_scores")]
    pub scores: BTreeMap<String, i64>,
    #[serde(default)]
    pub reason_zh: Option<String>,
    #[serde(default)]
    pub reason_en: Option<String>,
    #[serde(default)]
    pub core_value_zh: Option<String>,
    #[serde(default)]
    pub core_value_en: Option<String>,
}

impl Pick {
    /// Converts one item of the model's list; items that can't be joined by id are dropped.
    pub fn from_value(item: Value) -> Option<Self> {
        if !item.get("id").map_or(false, Value::is_string) {
            debug!("Dropping pick without a string id: {}", item);
            return None;
        }
        match serde_json::from_value::<Pick>(item) {
            Ok(pick) if !pick.id.trim().is_empty() => Some(pick),
            Ok(_) => None,
            Err(e) => {
                debug!("Dropping malformed pick: {}", e);
                None
            }
        }
    }
}

// Models write scores as 4, 4.5 or "4"; anything else is discarded.
fn lenient_scores<'de, D>(deserializer: D) -> Result<BTreeMap<String, i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(name, v)| {
            let n = match &v {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
                Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
                _ => None,
            };
            n.map(|n| (name, n))
        })
        .collect())
}

/// The persisted unit: a paper merged with its pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pdf_url: String,
    #[serde(default)]
    pub scores: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_value_zh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_value_en: Option<String>,
}

impl DigestEntry {
    /// Copies every paper field, then overlays the pick. The field sets are disjoint
    /// apart from `id`, which is equal by construction.
    pub fn merge(paper: &PaperRecord, pick: &Pick) -> Self {
        Self {
            id: pick.id.clone(),
            title: paper.title.clone(),
            summary: paper.summary.clone(),
            authors: paper.authors.clone(),
            url: paper.url.clone(),
            pdf_url: paper.pdf_url.clone(),
            scores: pick.scores.clone(),
            reason_zh: pick.reason_zh.clone(),
            reason_en: pick.reason_en.clone(),
            core_value_zh: pick.core_value_zh.clone(),
            core_value_en: pick.core_value_en.clone(),
        }
    }

    pub fn total_score(&self) -> i64 {
        self.scores.values().sum()
    }
}

/// Best-effort join of picks to candidates. Unknown ids are dropped silently,
/// repeated ids keep their first pick, and the model's order is preserved.
pub fn merge(candidates: &[PaperRecord], picks: &[Pick]) -> Vec<DigestEntry> {
    let mut seen = HashSet::new();
    picks
        .iter()
        .filter_map(|pick| {
            let paper = candidates.iter().find(|p| p.id == pick.id)?;
            seen.insert(pick.id.as_str()).then(|| DigestEntry::merge(paper, pick))
        })
        .collect()
}
