//! Top-level engine facade: owns an [`EngineConfig`] and a store, and exposes the single
//! `run_batch` entry point C8 drives. Kept thin on purpose — all the real work lives in
//! [`crate::driver`], [`crate::eval`], and [`crate::rank`]; this module exists to give
//! callers (and these end-to-end tests) one object to construct instead of threading config
//! and store through every call.

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::err::DriveError;
use crate::store::StoreFacade;

/// Owns the engine's read-only configuration and drives a full batch over a store.
pub struct MatchEngine {
    config: EngineConfig,
}

impl MatchEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates every trial in `store` and rewrites its sink partitions, then ranks the
    /// whole sink (§4.8, §4.9).
    pub fn run_batch(&self, store: &mut (impl StoreFacade + Send + Sync), today: NaiveDate) -> Result<(), DriveError> {
        crate::driver::run_batch(store, &self.config, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::criteria::{ClinicalCriterion, GenomicCriterion};
    use crate::model::{
        AccrualStatus, ClinicalRecordBuilder, CnvCall, CnvDetail, CriterionValue, GenomicRecordBuilder, MatchType,
        MutationDetail, SampleId, VariantCategory, VariantDetail, VitalStatus,
    };
    use crate::model::trial::TrialDocument;
    use crate::oncotree::{Oncotree, OncotreeEdge};
    use crate::store::{InMemoryStore, TrialMatchSink};
    use indexmap::IndexMap;
    use std::collections::HashSet;

    fn oncotree() -> Oncotree {
        Oncotree::build([
            OncotreeEdge { parent_text: None, text: "Tissue".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Lymph".into() },
            OncotreeEdge { parent_text: Some("Lymph".into()), text: "Hodgkin Lymphoma".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Skin".into() },
            OncotreeEdge { parent_text: Some("Skin".into()), text: "Melanoma".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Lung".into() },
            OncotreeEdge { parent_text: Some("Lung".into()), text: "Lung Adenocarcinoma".into() },
        ])
    }

    fn fields(pairs: &[(&str, &str)]) -> IndexMap<String, CriterionValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), CriterionValue::Single(v.to_string()))).collect()
    }

    fn clinical(sample_id: &str, diagnosis: &str, birth_year: i32, alive: bool) -> crate::model::ClinicalRecord {
        ClinicalRecordBuilder::default()
            .sample_id(sample_id)
            .mrn(format!("MRN-{sample_id}"))
            .birth_date(chrono::NaiveDate::from_ymd_opt(birth_year, 1, 1).unwrap())
            .gender("Female")
            .oncotree_primary_diagnosis(diagnosis)
            .vital_status(if alive { VitalStatus::Alive } else { VitalStatus::Deceased })
            .build()
            .unwrap()
    }

    fn trial(protocol_no: &str, criterion_json: &str) -> TrialDocument {
        let json = format!(
            r#"{{
                "protocol_no": "{protocol_no}",
                "_summary": {{"status": [{{"value": "Open to Accrual"}}]}},
                "treatment_list": {{"step": [{{
                    "step_internal_id": "s1",
                    "step_code": "STEP1",
                    "match": [{criterion_json}]
                }}]}}
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    /// Scenario 1 (§8): BRAF V600E variant match, gated on age + diagnosis.
    #[test]
    fn scenario_braf_v600e_variant_match() {
        let config = EngineConfig::new(oncotree());
        let engine = MatchEngine::new(config);

        let s1 = clinical("S1", "Lung Adenocarcinoma", 1976, true);
        let braf = GenomicRecordBuilder::default()
            .sample_id("S1")
            .variant_key("v1")
            .hugo_symbol("BRAF")
            .variant_category(VariantCategory::Mutation)
            .wildtype(false)
            .tier(1u8)
            .detail(VariantDetail::Mutation(MutationDetail {
                protein_change: Some("p.V600E".into()),
                ref_residue: Some("p.V600".into()),
                ..Default::default()
            }))
            .build()
            .unwrap();

        let trial = trial(
            "19-001",
            r#"{"and": [
                {"genomic": {"hugo_symbol": "BRAF", "variant_category": "Mutation", "protein_change": "p.V600E"}},
                {"clinical": {"age_numerical": ">=18", "oncotree_primary_diagnosis": "Lung Adenocarcinoma"}}
            ]}"#,
        );
        let mut store = InMemoryStore::new(vec![s1], vec![braf], vec![trial]);
        engine.run_batch(&mut store, today()).unwrap();

        let matches = store.all_matches().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].sample_id, "S1");
        assert_eq!(matches[0].evidence.match_type, Some(MatchType::Variant));
        assert_eq!(matches[0].evidence.genomic_alteration.as_deref(), Some("BRAF p.V600E"));
    }

    /// Scenario 3 (§8): `_SOLID_` expansion excludes liquid tumors.
    #[test]
    fn scenario_solid_tumor_expansion() {
        let config = EngineConfig::new(oncotree());
        let engine = MatchEngine::new(config);

        let liquid_sample = clinical("S1", "Hodgkin Lymphoma", 1980, true);
        let solid_sample = clinical("S2", "Melanoma", 1980, true);
        let trial = trial("19-002", r#"{"clinical": {"oncotree_primary_diagnosis": "_SOLID_"}}"#);
        let mut store = InMemoryStore::new(vec![liquid_sample, solid_sample], vec![], vec![trial]);
        engine.run_batch(&mut store, today()).unwrap();

        let matches = store.all_matches().unwrap();
        let matched_samples: HashSet<SampleId> = matches.iter().map(|m| m.sample_id.clone()).collect();
        assert!(matched_samples.contains("S2"));
        assert!(!matched_samples.contains("S1"));
    }

    /// Scenario 4 (§8): wildcard protein-change matches any variant sharing the ref residue.
    #[test]
    fn scenario_wildcard_protein_change() {
        let config = EngineConfig::new(oncotree());
        let engine = MatchEngine::new(config);

        let s1 = clinical("S1", "Melanoma", 1980, true);
        let s2 = clinical("S2", "Melanoma", 1980, true);
        let v600e = GenomicRecordBuilder::default()
            .sample_id("S1")
            .variant_key("v1")
            .hugo_symbol("BRAF")
            .variant_category(VariantCategory::Mutation)
            .wildtype(false)
            .detail(VariantDetail::Mutation(MutationDetail {
                ref_residue: Some("p.V600".into()),
                protein_change: Some("p.V600E".into()),
                ..Default::default()
            }))
            .build()
            .unwrap();
        let v600d = GenomicRecordBuilder::default()
            .sample_id("S2")
            .variant_key("v2")
            .hugo_symbol("BRAF")
            .variant_category(VariantCategory::Mutation)
            .wildtype(false)
            .detail(VariantDetail::Mutation(MutationDetail {
                ref_residue: Some("p.V600".into()),
                protein_change: Some("p.V600D".into()),
                ..Default::default()
            }))
            .build()
            .unwrap();

        let trial = trial("19-003", r#"{"genomic": {"hugo_symbol": "BRAF", "wildcard_protein_change": "p.V600"}}"#);
        let mut store = InMemoryStore::new(vec![s1, s2], vec![v600e, v600d], vec![trial]);
        engine.run_batch(&mut store, today()).unwrap();

        let matches = store.all_matches().unwrap();
        let matched_samples: HashSet<SampleId> = matches.iter().map(|m| m.sample_id.clone()).collect();
        assert!(matched_samples.contains("S1"));
        assert!(matched_samples.contains("S2"));
        assert!(matches.iter().all(|m| m.evidence.match_type == Some(MatchType::Wildcard)));
    }

    /// Scenario 5 (§8): CNV call match is exact, not "any CNV on this gene".
    #[test]
    fn scenario_cnv_call_exact_match() {
        let config = EngineConfig::new(oncotree());
        let engine = MatchEngine::new(config);

        let s1 = clinical("S1", "Melanoma", 1980, true);
        let s2 = clinical("S2", "Melanoma", 1980, true);
        let het_del = GenomicRecordBuilder::default()
            .sample_id("S1")
            .variant_key("v1")
            .hugo_symbol("BRAF")
            .variant_category(VariantCategory::Cnv)
            .wildtype(false)
            .detail(VariantDetail::Cnv(CnvDetail { cnv_call: CnvCall::HeterozygousDeletion }))
            .build()
            .unwrap();
        let gain = GenomicRecordBuilder::default()
            .sample_id("S2")
            .variant_key("v2")
            .hugo_symbol("BRAF")
            .variant_category(VariantCategory::Cnv)
            .wildtype(false)
            .detail(VariantDetail::Cnv(CnvDetail { cnv_call: CnvCall::Gain }))
            .build()
            .unwrap();

        let trial = trial(
            "19-004",
            r#"{"genomic": {"hugo_symbol": "BRAF", "variant_category": "Copy Number Variation", "cnv_call": "Heterozygous Deletion"}}"#,
        );
        let mut store = InMemoryStore::new(vec![s1, s2], vec![het_del, gain], vec![trial]);
        engine.run_batch(&mut store, today()).unwrap();

        let matches = store.all_matches().unwrap();
        let matched_samples: HashSet<SampleId> = matches.iter().map(|m| m.sample_id.clone()).collect();
        assert_eq!(matched_samples, ["S1".to_string()].into_iter().collect());
    }

    /// Scenario 6 (§8): the ranker prefers a tier-1 variant match at a DFCI trial over a
    /// gene-level match at a non-DFCI trial.
    #[test]
    fn scenario_ranker_prefers_specific_tier1_dfci_match() {
        let config = EngineConfig::new(oncotree());
        let engine = MatchEngine::new(config);

        let s = clinical("S", "Melanoma", 1980, true);
        let braf = GenomicRecordBuilder::default()
            .sample_id("S")
            .variant_key("v1")
            .hugo_symbol("BRAF")
            .variant_category(VariantCategory::Mutation)
            .wildtype(false)
            .tier(1u8)
            .detail(VariantDetail::Mutation(MutationDetail {
                protein_change: Some("p.V600E".into()),
                ref_residue: Some("p.V600".into()),
                ..Default::default()
            }))
            .build()
            .unwrap();

        let mut trial_a = trial("19-001", r#"{"genomic": {"hugo_symbol": "BRAF", "protein_change": "p.V600E"}}"#);
        trial_a.coordinating_center = Some("DFCI".to_string());
        let mut trial_b = trial("18-050", r#"{"genomic": {"hugo_symbol": "BRAF"}}"#);
        trial_b.coordinating_center = Some("OTHER".to_string());

        let mut store = InMemoryStore::new(vec![s], vec![braf], vec![trial_a, trial_b]);
        engine.run_batch(&mut store, today()).unwrap();

        let matches = store.all_matches().unwrap();
        let rank_a = matches.iter().find(|m| m.protocol_no == "19-001").unwrap().sort_order;
        let rank_b = matches.iter().find(|m| m.protocol_no == "18-050").unwrap().sort_order;
        assert_eq!(rank_a, Some(0));
        assert_eq!(rank_b, Some(1));
    }

    #[test]
    fn sink_idempotence_running_batch_twice_yields_same_contents() {
        let config = EngineConfig::new(oncotree());
        let engine = MatchEngine::new(config);

        let s1 = clinical("S1", "Lung Adenocarcinoma", 1976, true);
        let braf = GenomicRecordBuilder::default()
            .sample_id("S1")
            .variant_key("v1")
            .hugo_symbol("BRAF")
            .variant_category(VariantCategory::Mutation)
            .wildtype(false)
            .tier(1u8)
            .detail(VariantDetail::Mutation(MutationDetail {
                protein_change: Some("p.V600E".into()),
                ..Default::default()
            }))
            .build()
            .unwrap();
        let trial = trial("19-001", r#"{"genomic": {"hugo_symbol": "BRAF", "protein_change": "p.V600E"}}"#);
        let mut store = InMemoryStore::new(vec![s1], vec![braf], vec![trial]);

        engine.run_batch(&mut store, today()).unwrap();
        let mut first = store.all_matches().unwrap();
        engine.run_batch(&mut store, today()).unwrap();
        let mut second = store.all_matches().unwrap();

        first.sort_by(|a, b| a.internal_id.cmp(&b.internal_id));
        second.sort_by(|a, b| a.internal_id.cmp(&b.internal_id));
        assert_eq!(first, second);
    }

    #[test]
    fn unused_imports_guard() {
        let _ = ClinicalCriterion::default();
        let _ = GenomicCriterion::default();
        let _ = fields(&[]);
        let _ = AccrualStatus::Open;
    }
}
