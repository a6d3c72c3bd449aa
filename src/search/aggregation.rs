//! Facet aggregation results and their translation into UI summaries

use crate::search::error::SearchResult;
use crate::search::facet::FacetKey;
use crate::state::ResourceStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// One value bucket as returned by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBucket {
    pub key: String,
    pub count: u64,
}

/// Engine-native aggregation output, keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAggregations {
    /// Value buckets per field, largest count first
    pub terms: BTreeMap<String, Vec<RawBucket>>,

    /// Documents lacking the field
    pub missing: BTreeMap<String, u64>,
}

/// Facet header of a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetInfo {
    pub key: FacetKey,
    pub label: String,
    pub missing_count: u64,
}

/// One facet value with its document count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub key: String,
    pub label: String,
    pub count: u64,
}

/// What the UI renders for one facet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetSummary {
    pub facet: FacetInfo,
    pub values: Vec<FacetValue>,
}

/// Facet summaries keyed by facet
pub type FacetSummaries = BTreeMap<FacetKey, FacetSummary>;

/// Turns raw engine aggregations into labelled facet summaries
pub struct AggregationTranslator {
    store: Arc<dyn ResourceStore>,
}

impl AggregationTranslator {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Convert raw aggregations.
    ///
    /// Keys that do not decode to a facet are dropped. Vocabulary and term
    /// labels come from the store; a vocabulary unknown to the store keeps its
    /// raw key as label and an unknown term its id.
    pub async fn convert(&self, raw: &RawAggregations) -> SearchResult<FacetSummaries> {
        let mut decoded: Vec<(FacetKey, &[RawBucket])> = Vec::new();
        for (name, buckets) in &raw.terms {
            match FacetKey::parse(name) {
                Some(key) => decoded.push((key, buckets)),
                None => tracing::debug!(key = %name, "Dropping undecodable aggregation"),
            }
        }
        let missing: HashMap<FacetKey, u64> = raw
            .missing
            .iter()
            .filter_map(|(name, count)| FacetKey::parse(name).map(|key| (key, *count)))
            .collect();

        let vocabulary_ids: Vec<i64> = decoded
            .iter()
            .filter_map(|(key, _)| key.vocabulary_id())
            .collect();
        let term_ids: Vec<i64> = decoded
            .iter()
            .filter(|(key, _)| key.vocabulary_id().is_some())
            .flat_map(|(_, buckets)| buckets.iter().filter_map(|b| b.key.parse().ok()))
            .collect();

        let vocabulary_labels: HashMap<i64, String> = if vocabulary_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .get_vocabularies(&vocabulary_ids)
                .await?
                .into_iter()
                .map(|v| (v.id, v.name))
                .collect()
        };
        let term_labels: HashMap<i64, String> = if term_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .get_terms(&term_ids)
                .await?
                .into_iter()
                .map(|t| (t.id, t.label))
                .collect()
        };

        let mut summaries = FacetSummaries::new();
        for (key, buckets) in decoded {
            let summary = match key {
                FacetKey::Builtin(builtin) => FacetSummary {
                    facet: FacetInfo {
                        key,
                        label: builtin.label().to_string(),
                        missing_count: 0,
                    },
                    values: buckets
                        .iter()
                        .map(|bucket| FacetValue {
                            key: bucket.key.clone(),
                            label: bucket.key.clone(),
                            count: bucket.count,
                        })
                        .collect(),
                },
                FacetKey::Vocabulary(id) => FacetSummary {
                    facet: FacetInfo {
                        key,
                        label: vocabulary_labels
                            .get(&id)
                            .cloned()
                            .unwrap_or_else(|| key.field_name()),
                        missing_count: missing.get(&key).copied().unwrap_or(0),
                    },
                    values: buckets
                        .iter()
                        .map(|bucket| {
                            let label = bucket
                                .key
                                .parse::<i64>()
                                .ok()
                                .and_then(|term_id| term_labels.get(&term_id).cloned())
                                .unwrap_or_else(|| bucket.key.clone());
                            FacetValue {
                                key: bucket.key.clone(),
                                label,
                                count: bucket.count,
                            }
                        })
                        .collect(),
                },
            };
            summaries.insert(key, summary);
        }

        Ok(summaries)
    }
}
