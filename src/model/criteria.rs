//! Wire-format and typed representations of match-tree leaf criteria (§4.4, §6).

use indexmap::IndexMap;
use serde::Deserialize;

/// A criterion field's value as it arrives in trial vocabulary: either a single token or a
/// list of tokens (multiple diagnoses combine into one criterion, §4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum CriterionValue {
    Single(String),
    List(Vec<String>),
}

impl CriterionValue {
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(CriterionValue::Single(s.clone())),
            serde_json::Value::Bool(b) => Some(CriterionValue::Single(b.to_string())),
            serde_json::Value::Number(n) => Some(CriterionValue::Single(n.to_string())),
            serde_json::Value::Array(items) => Some(CriterionValue::List(
                items
                    .iter()
                    .filter_map(|v| match v {
                        serde_json::Value::String(s) => Some(s.clone()),
                        serde_json::Value::Bool(b) => Some(b.to_string()),
                        serde_json::Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    /// The raw string tokens, in order, regardless of single/list shape.
    pub fn tokens(&self) -> Vec<&str> {
        match self {
            CriterionValue::Single(s) => vec![s.as_str()],
            CriterionValue::List(items) => items.iter().map(|s| s.as_str()).collect(),
        }
    }

    /// Strips a leading `!` from every token, reporting whether any token carried it.
    /// A criterion is only ever uniformly positive or negative (§6): the first `!` found
    /// decides the field's polarity and is stripped from all of its tokens.
    pub fn strip_polarity(&self) -> (bool, Vec<String>) {
        let negative = self.tokens().iter().any(|t| t.starts_with('!'));
        let cleaned = self
            .tokens()
            .into_iter()
            .map(|t| t.strip_prefix('!').unwrap_or(t).to_string())
            .collect();
        (negative, cleaned)
    }
}

fn fields_from_raw(raw: IndexMap<String, serde_json::Value>) -> IndexMap<String, CriterionValue> {
    raw.into_iter()
        .filter_map(|(k, v)| CriterionValue::from_json(&v).map(|cv| (k, cv)))
        .collect()
}

/// A `clinical` leaf's criterion map, keyed by trial-vocabulary field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicalCriterion {
    pub fields: IndexMap<String, CriterionValue>,
}

/// A `genomic` leaf's criterion map, keyed by trial-vocabulary field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenomicCriterion {
    pub fields: IndexMap<String, CriterionValue>,
}

/// Recursive wire-format representation of a match-tree payload (§6): an object of exactly
/// one key, either a junction (`and`/`or`, list-valued) or a leaf (`clinical`/`genomic`,
/// map-valued).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawMatchEntry {
    And(Vec<RawMatchEntry>),
    Or(Vec<RawMatchEntry>),
    Clinical(IndexMap<String, serde_json::Value>),
    Genomic(IndexMap<String, serde_json::Value>),
}

impl RawMatchEntry {
    /// Converts the raw, untyped criterion maps at the leaves into the typed
    /// [`ClinicalCriterion`]/[`GenomicCriterion`] shape, leaving junction structure untouched.
    pub fn into_typed(self) -> MatchTreePayload {
        match self {
            RawMatchEntry::And(children) => {
                MatchTreePayload::And(children.into_iter().map(Self::into_typed).collect())
            }
            RawMatchEntry::Or(children) => {
                MatchTreePayload::Or(children.into_iter().map(Self::into_typed).collect())
            }
            RawMatchEntry::Clinical(raw) => MatchTreePayload::Clinical(ClinicalCriterion {
                fields: fields_from_raw(raw),
            }),
            RawMatchEntry::Genomic(raw) => MatchTreePayload::Genomic(GenomicCriterion {
                fields: fields_from_raw(raw),
            }),
        }
    }
}

/// Typed match-tree payload, ready for the C5 builder to turn into an arena-indexed tree.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchTreePayload {
    And(Vec<MatchTreePayload>),
    Or(Vec<MatchTreePayload>),
    Clinical(ClinicalCriterion),
    Genomic(GenomicCriterion),
}

impl MatchTreePayload {
    pub fn from_raw(raw: RawMatchEntry) -> Self {
        raw.into_typed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_value_strips_polarity() {
        let v = CriterionValue::Single("!Mutation".into());
        let (neg, cleaned) = v.strip_polarity();
        assert!(neg);
        assert_eq!(cleaned, vec!["Mutation".to_string()]);
    }

    #[test]
    fn criterion_value_list_polarity_is_uniform() {
        let v = CriterionValue::List(vec!["!Lung Adenocarcinoma".into(), "Melanoma".into()]);
        let (neg, cleaned) = v.strip_polarity();
        assert!(neg);
        assert_eq!(cleaned, vec!["Lung Adenocarcinoma".to_string(), "Melanoma".to_string()]);
    }

    #[test]
    fn raw_match_entry_parses_and_and_leaf() {
        let json = r#"{"and": [{"clinical": {"age_numerical": ">=18"}}, {"genomic": {"hugo_symbol": "BRAF"}}]}"#;
        let raw: RawMatchEntry = serde_json::from_str(json).unwrap();
        let typed = MatchTreePayload::from_raw(raw);
        match typed {
            MatchTreePayload::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[0], MatchTreePayload::Clinical(_)));
                assert!(matches!(children[1], MatchTreePayload::Genomic(_)));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }
}
