//! Store Facade (C10): a capability interface over the clinical, genomic, trial, and
//! trial-match collections, plus an in-memory implementation used by tests and by the CLI's
//! fixture-driven batch mode.
//!
//! The real document store (§1 "out of scope") is an external collaborator; this module only
//! fixes the shape of the boundary the rest of the engine talks through.

use std::collections::{HashMap, HashSet};

use crate::compiler::{ClinicalQuery, GenomicQuery};
use crate::err::StoreError;
use crate::model::trial::TrialDocument;
use crate::model::{ClinicalRecord, GenomicRecord, SampleId, TrialMatch};

/// Read access to the clinical collection.
pub trait ClinicalStore {
    /// Every sample id with a clinical record — the `ALL` set of §4.6.
    fn all_sample_ids(&self) -> Result<HashSet<SampleId>, StoreError>;

    /// Rows matching a compiled clinical query.
    fn find_clinical(&self, query: &ClinicalQuery) -> Result<Vec<ClinicalRecord>, StoreError>;

    /// Single-record lookup, used by C8 to join `mrn` and other clinical fields onto a
    /// trial-match record.
    fn clinical_by_sample(&self, sample_id: &str) -> Result<Option<ClinicalRecord>, StoreError>;
}

/// Read access to the genomic collection.
pub trait GenomicStore {
    /// Rows matching a compiled genomic query.
    fn find_genomic(&self, query: &GenomicQuery) -> Result<Vec<GenomicRecord>, StoreError>;
}

/// Read access to the trial collection.
pub trait TrialStore {
    fn trials(&self) -> Result<Vec<TrialDocument>, StoreError>;
}

/// Write access to the trial-match sink, scoped by `protocol_no` (§4.8, §6).
pub trait TrialMatchSink {
    /// Deletes every existing record for `protocol_no` and inserts `records` in its place.
    /// Must be atomic per the §7 isolation boundary: a failure leaves the prior contents of
    /// `protocol_no` untouched.
    fn replace_protocol(&mut self, protocol_no: &str, records: Vec<TrialMatch>) -> Result<(), StoreError>;

    /// All distinct protocol numbers currently present in the sink.
    fn distinct_protocols(&self) -> Result<Vec<String>, StoreError>;

    /// All records currently in the sink, across every protocol — what C9 ranks over.
    fn all_matches(&self) -> Result<Vec<TrialMatch>, StoreError>;

    /// Overwrites `sort_order` on every record in the sink by `(sample_id, protocol_no,
    /// match_level, internal_id)` identity, as computed by C9.
    fn apply_ranks(&mut self, ranks: &HashMap<(SampleId, String, String, String), i64>) -> Result<(), StoreError>;
}

/// The full capability surface the engine needs: clinical + genomic reads, trial reads, and
/// trial-match writes.
pub trait StoreFacade: ClinicalStore + GenomicStore + TrialStore + TrialMatchSink {}

impl<T: ClinicalStore + GenomicStore + TrialStore + TrialMatchSink> StoreFacade for T {}

/// An in-memory store, constructed from plain `Vec`s. Used by every integration test in this
/// crate and by the CLI's `run` subcommand when pointed at JSON fixture files.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    clinical: Vec<ClinicalRecord>,
    genomic: Vec<GenomicRecord>,
    trials: Vec<TrialDocument>,
    matches: HashMap<String, Vec<TrialMatch>>,
}

impl InMemoryStore {
    pub fn new(clinical: Vec<ClinicalRecord>, genomic: Vec<GenomicRecord>, trials: Vec<TrialDocument>) -> Self {
        Self {
            clinical,
            genomic,
            trials,
            matches: HashMap::new(),
        }
    }

    fn clinical_matches(record: &ClinicalRecord, query: &ClinicalQuery) -> bool {
        if let Some(diagnosis_in) = &query.diagnosis_in {
            if !diagnosis_in.contains(&record.oncotree_primary_diagnosis) {
                return false;
            }
        }
        if let Some(bound) = query.birth_date {
            if !bound.matches(record.birth_date) {
                return false;
            }
        }
        if let Some(gender) = &query.gender {
            if !record.gender.eq_ignore_ascii_case(gender) {
                return false;
            }
        }
        true
    }

    fn genomic_matches(record: &GenomicRecord, query: &GenomicQuery) -> bool {
        use crate::model::{CnvCall, VariantCategory, VariantDetail};
        use std::str::FromStr;

        if let Some(hugo) = &query.hugo_symbol {
            if !record.hugo_symbol.eq_ignore_ascii_case(hugo) {
                return false;
            }
        }
        if let Some(category) = &query.variant_category {
            let Ok(wanted) = VariantCategory::from_str(category) else {
                return false;
            };
            if record.variant_category != wanted {
                return false;
            }
        }
        match query.wildtype {
            Some(wanted) => {
                if record.wildtype != wanted {
                    return false;
                }
            }
            None => {
                // Wildtype defaulting (§4.4): match only false (absence is never modeled as
                // `wildtype` being optional at the row level, the field is mandatory, so the
                // default means "is false").
                if record.wildtype {
                    return false;
                }
            }
        }

        if !query.signature.is_empty() {
            let Some(sig) = &record.signature else {
                return false;
            };
            if let Some(v) = &query.signature.mmr_status {
                if sig.mmr_status.as_deref() != Some(v.as_str()) {
                    return false;
                }
            }
            if let Some(v) = &query.signature.ms_status {
                if sig.ms_status.as_deref() != Some(v.as_str()) {
                    return false;
                }
            }
            if let Some(v) = &query.signature.tobacco_status {
                if sig.tobacco_status.as_deref() != Some(v.as_str()) {
                    return false;
                }
            }
            if let Some(v) = &query.signature.tmz_status {
                if sig.tmz_status.as_deref() != Some(v.as_str()) {
                    return false;
                }
            }
            if let Some(v) = &query.signature.pole_status {
                if sig.pole_status.as_deref() != Some(v.as_str()) {
                    return false;
                }
            }
            if let Some(v) = &query.signature.apobec_status {
                if sig.apobec_status.as_deref() != Some(v.as_str()) {
                    return false;
                }
            }
            if let Some(v) = &query.signature.uva_status {
                if sig.uva_status.as_deref() != Some(v.as_str()) {
                    return false;
                }
            }
            return true;
        }

        match &record.detail {
            VariantDetail::Mutation(m) => {
                if query.cnv_call.is_some() {
                    return false;
                }
                if let Some(v) = &query.protein_change {
                    if m.protein_change.as_deref() != Some(v.as_str()) {
                        return false;
                    }
                }
                if let Some(v) = &query.wildcard_protein_change {
                    if m.ref_residue.as_deref() != Some(v.as_str()) {
                        return false;
                    }
                }
                if let Some(v) = &query.variant_classification {
                    if m.variant_class.as_deref() != Some(v.as_str()) {
                        return false;
                    }
                }
                if let Some(v) = &query.exon {
                    if m.transcript_exon.as_deref() != Some(v.as_str()) {
                        return false;
                    }
                }
                true
            }
            VariantDetail::Cnv(c) => {
                if query.protein_change.is_some()
                    || query.wildcard_protein_change.is_some()
                    || query.variant_classification.is_some()
                    || query.exon.is_some()
                {
                    return false;
                }
                if let Some(v) = &query.cnv_call {
                    let Ok(wanted) = CnvCall::from_str(v) else {
                        return false;
                    };
                    if c.cnv_call != wanted {
                        return false;
                    }
                }
                true
            }
            VariantDetail::Sv(_) => {
                query.protein_change.is_none()
                    && query.wildcard_protein_change.is_none()
                    && query.variant_classification.is_none()
                    && query.exon.is_none()
                    && query.cnv_call.is_none()
            }
        }
    }
}

impl ClinicalStore for InMemoryStore {
    fn all_sample_ids(&self) -> Result<HashSet<SampleId>, StoreError> {
        Ok(self.clinical.iter().map(|r| r.sample_id.clone()).collect())
    }

    fn find_clinical(&self, query: &ClinicalQuery) -> Result<Vec<ClinicalRecord>, StoreError> {
        Ok(self
            .clinical
            .iter()
            .filter(|r| Self::clinical_matches(r, query))
            .cloned()
            .collect())
    }

    fn clinical_by_sample(&self, sample_id: &str) -> Result<Option<ClinicalRecord>, StoreError> {
        Ok(self.clinical.iter().find(|r| r.sample_id == sample_id).cloned())
    }
}

impl GenomicStore for InMemoryStore {
    fn find_genomic(&self, query: &GenomicQuery) -> Result<Vec<GenomicRecord>, StoreError> {
        Ok(self
            .genomic
            .iter()
            .filter(|r| Self::genomic_matches(r, query))
            .cloned()
            .collect())
    }
}

impl TrialStore for InMemoryStore {
    fn trials(&self) -> Result<Vec<TrialDocument>, StoreError> {
        Ok(self.trials.clone())
    }
}

impl TrialMatchSink for InMemoryStore {
    fn replace_protocol(&mut self, protocol_no: &str, records: Vec<TrialMatch>) -> Result<(), StoreError> {
        self.matches.insert(protocol_no.to_string(), records);
        Ok(())
    }

    fn distinct_protocols(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.matches.keys().cloned().collect())
    }

    fn all_matches(&self) -> Result<Vec<TrialMatch>, StoreError> {
        Ok(self.matches.values().flatten().cloned().collect())
    }

    fn apply_ranks(&mut self, ranks: &HashMap<(SampleId, String, String, String), i64>) -> Result<(), StoreError> {
        for records in self.matches.values_mut() {
            for record in records.iter_mut() {
                let key = (
                    record.sample_id.clone(),
                    record.protocol_no.clone(),
                    record.match_level.to_string(),
                    record.internal_id.clone(),
                );
                if let Some(rank) = ranks.get(&key) {
                    record.sort_order = Some(*rank);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClinicalRecordBuilder, VitalStatus};
    use chrono::NaiveDate;

    fn sample_clinical() -> ClinicalRecord {
        ClinicalRecordBuilder::default()
            .sample_id("S1")
            .mrn("MRN1")
            .birth_date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
            .gender("Female")
            .oncotree_primary_diagnosis("Lung Adenocarcinoma")
            .vital_status(VitalStatus::Alive)
            .build()
            .unwrap()
    }

    #[test]
    fn find_clinical_filters_by_diagnosis() {
        let store = InMemoryStore::new(vec![sample_clinical()], vec![], vec![]);
        let mut query = ClinicalQuery::default();
        query.diagnosis_in = Some(["Lung Adenocarcinoma".to_string()].into_iter().collect());
        let found = store.find_clinical(&query).unwrap();
        assert_eq!(found.len(), 1);

        let mut miss = ClinicalQuery::default();
        miss.diagnosis_in = Some(["Melanoma".to_string()].into_iter().collect());
        assert!(store.find_clinical(&miss).unwrap().is_empty());
    }

    #[test]
    fn replace_protocol_overwrites_prior_contents() {
        let mut store = InMemoryStore::new(vec![], vec![], vec![]);
        store.replace_protocol("19-001", vec![]).unwrap();
        assert_eq!(store.distinct_protocols().unwrap(), vec!["19-001".to_string()]);
    }
}
