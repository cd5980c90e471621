//! Trial-vocabulary to store-vocabulary field/value normalization.
//!
//! Built once from a fixed constant table and threaded through the engine via
//! [`crate::config::EngineConfig`] — this replaces the source's module-level lookup
//! dictionaries with an explicit, constructor-injected table.

use std::collections::HashMap;

/// Key and value lookup tables mapping trial-vocabulary tokens to store-vocabulary tokens.
///
/// Key lookups are case-insensitive on the trial side (trial authors are inconsistent about
/// casing); value lookups are exact.
#[derive(Debug, Clone)]
pub struct VocabularyTable {
    keys: HashMap<String, &'static str>,
    values: HashMap<(&'static str, String), &'static str>,
}

impl Default for VocabularyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VocabularyTable {
    /// Builds the fixed, built-in vocabulary table.
    pub fn new() -> Self {
        let key_pairs: &[(&str, &str)] = &[
            ("AGE_NUMERICAL", "BIRTH_DATE"),
            ("EXON", "TRUE_TRANSCRIPT_EXON"),
            ("HUGO_SYMBOL", "TRUE_HUGO_SYMBOL"),
            ("PROTEIN_CHANGE", "TRUE_PROTEIN_CHANGE"),
            ("WILDCARD_PROTEIN_CHANGE", "TRUE_PROTEIN_CHANGE"),
            (
                "ONCOTREE_PRIMARY_DIAGNOSIS",
                "ONCOTREE_PRIMARY_DIAGNOSIS_NAME",
            ),
            ("VARIANT_CLASSIFICATION", "TRUE_VARIANT_CLASSIFICATION"),
            ("VARIANT_CATEGORY", "VARIANT_CATEGORY"),
            ("CNV_CALL", "CNV_CALL"),
            ("WILDTYPE", "WILDTYPE"),
            ("GENDER", "GENDER"),
        ];
        let keys = key_pairs
            .iter()
            .map(|(old, new)| (old.to_ascii_uppercase(), *new))
            .collect();

        let value_pairs: &[(&str, &str, &str)] = &[
            ("VARIANT_CATEGORY", "Mutation", "MUTATION"),
            ("VARIANT_CATEGORY", "Copy Number Variation", "CNV"),
            ("VARIANT_CATEGORY", "Structural Variation", "SV"),
            (
                "CNV_CALL",
                "High Amplification",
                "High level amplification",
            ),
            ("CNV_CALL", "Homozygous Deletion", "Homozygous deletion"),
            ("CNV_CALL", "Heterozygous Deletion", "Heterozygous deletion"),
            ("WILDTYPE", "true", "true"),
            ("WILDTYPE", "false", "false"),
        ];
        let values = value_pairs
            .iter()
            .map(|(field, old, new)| ((*field, old.to_string()), *new))
            .collect();

        Self { keys, values }
    }

    /// Translates a trial-vocabulary field name to its store-vocabulary equivalent.
    /// Unknown keys pass through unchanged.
    pub fn translate_key<'a>(&'a self, trial_key: &'a str) -> &'a str {
        self.keys
            .get(&trial_key.to_ascii_uppercase())
            .copied()
            .unwrap_or(trial_key)
    }

    /// Translates a value for a given store-vocabulary field. Unknown values pass through
    /// unchanged.
    pub fn translate_value<'a>(&'a self, store_field: &str, trial_value: &'a str) -> &'a str {
        self.values
            .get(&(store_field, trial_value.to_string()))
            .copied()
            .unwrap_or(trial_value)
    }

    /// All key mappings, for the `vocab dump` CLI subcommand.
    pub fn key_table(&self) -> &HashMap<String, &'static str> {
        &self.keys
    }
}
