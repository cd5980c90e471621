//! Core data model shared across the match-tree evaluation engine.
//!
//! Types here mirror the data model's clinical records, genomic
//! records, trial documents, evidence, and trial-match output records.

pub mod criteria;
pub mod trial;

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

pub use criteria::{
    ClinicalCriterion, CriterionValue, GenomicCriterion, MatchTreePayload, RawMatchEntry,
};

/// A patient/sample identifier.
pub type SampleId = String;

/// Patient vital status as carried on the clinical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VitalStatus {
    Alive,
    Deceased,
}

/// Clinical record as ingested from the clinical collection. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[builder(setter(into))]
pub struct ClinicalRecord {
    pub sample_id: SampleId,
    pub mrn: String,
    pub birth_date: NaiveDate,
    /// Free-text gender as recorded by the source system (`"Male"` / `"Female"` / other).
    pub gender: String,
    pub oncotree_primary_diagnosis: String,
    pub vital_status: VitalStatus,
    #[builder(default)]
    pub ord_physician_name: Option<String>,
    #[builder(default)]
    pub ord_physician_email: Option<String>,
    #[builder(default)]
    pub report_date: Option<NaiveDate>,
}

/// The three variant categories a genomic row can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VariantCategory {
    #[strum(serialize = "MUTATION")]
    Mutation,
    #[strum(serialize = "CNV")]
    Cnv,
    #[strum(serialize = "SV")]
    Sv,
}

/// CNV call values, in store vocabulary (post C1 normalization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum CnvCall {
    #[strum(serialize = "High level amplification")]
    #[serde(rename = "High level amplification")]
    HighLevelAmplification,
    #[strum(serialize = "Gain")]
    #[serde(rename = "Gain")]
    Gain,
    #[strum(serialize = "Heterozygous deletion")]
    #[serde(rename = "Heterozygous deletion")]
    HeterozygousDeletion,
    #[strum(serialize = "Homozygous deletion")]
    #[serde(rename = "Homozygous deletion")]
    HomozygousDeletion,
}

/// Fields specific to a `MUTATION`-category genomic row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationDetail {
    pub protein_change: Option<String>,
    /// The residue prefix of `protein_change` (e.g. `p.V600` for `p.V600E`), used for
    /// wildcard-protein-change matching.
    pub ref_residue: Option<String>,
    pub variant_class: Option<String>,
    pub transcript_exon: Option<String>,
    pub cdna_change: Option<String>,
    pub chromosome: Option<String>,
    pub position: Option<i64>,
    pub ref_allele: Option<String>,
    pub canonical_strand: Option<String>,
}

/// Fields specific to a `CNV`-category genomic row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CnvDetail {
    pub cnv_call: CnvCall,
}

/// Fields specific to an `SV`-category genomic row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SvDetail {
    pub sv_comment: Option<String>,
}

/// Category-specific payload of a genomic row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariantDetail {
    Mutation(MutationDetail),
    Cnv(CnvDetail),
    Sv(SvDetail),
}

/// Tumor mutational / molecular signature status, optionally present on a genomic row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureStatus {
    pub mmr_status: Option<String>,
    pub ms_status: Option<String>,
    pub tobacco_status: Option<String>,
    pub tmz_status: Option<String>,
    pub pole_status: Option<String>,
    pub apobec_status: Option<String>,
    pub uva_status: Option<String>,
}

impl SignatureStatus {
    /// Whether any signature field carries a value.
    pub fn is_present(&self) -> bool {
        self.mmr_status.is_some()
            || self.ms_status.is_some()
            || self.tobacco_status.is_some()
            || self.tmz_status.is_some()
            || self.pole_status.is_some()
            || self.apobec_status.is_some()
            || self.uva_status.is_some()
    }
}

/// A single genomic row, keyed by `(sample_id, variant_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[builder(setter(into))]
pub struct GenomicRecord {
    pub sample_id: SampleId,
    pub variant_key: String,
    pub hugo_symbol: String,
    pub variant_category: VariantCategory,
    pub wildtype: bool,
    #[builder(default)]
    pub tier: Option<u8>,
    #[builder(default)]
    pub allele_fraction: Option<f64>,
    pub detail: VariantDetail,
    #[builder(default)]
    pub signature: Option<SignatureStatus>,
}

/// Granularity at which a genomic leaf matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchType {
    Variant,
    Wildcard,
    Exon,
    VariantClass,
    Gene,
}

/// Cancer-type specificity of the clinical diagnosis criterion that produced a match,
/// used by the C9 ranker's cancer-type-specificity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosisLevel {
    Specific,
    Solid,
    Liquid,
}

/// A per-sample explanation of why a leaf matched. Produced by C7, carried upward by C6,
/// copied verbatim into the final `TrialMatch` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub sample_id: SampleId,
    pub match_type: Option<MatchType>,
    pub genomic_alteration: Option<String>,
    pub hugo_symbol: Option<String>,
    pub protein_change: Option<String>,
    pub variant_classification: Option<String>,
    pub variant_category: Option<VariantCategory>,
    pub cnv_call: Option<CnvCall>,
    pub wildtype: Option<bool>,
    pub chromosome: Option<String>,
    pub position: Option<i64>,
    pub cdna_change: Option<String>,
    pub reference_allele: Option<String>,
    pub transcript_exon: Option<String>,
    pub canonical_strand: Option<String>,
    pub allele_fraction: Option<f64>,
    pub tier: Option<u8>,
    pub genomic_id: Option<String>,
    /// Set only when this signature status triggered a signature-bucket match.
    pub signature: Option<SignatureStatus>,
}

impl Evidence {
    /// Evidence tuple equality for the "full evidence tuple" de-duplication rule.
    /// `allele_fraction` is compared bitwise since `f64` is not `Eq`.
    pub fn same_tuple(&self, other: &Evidence) -> bool {
        self.sample_id == other.sample_id
            && self.match_type == other.match_type
            && self.genomic_alteration == other.genomic_alteration
            && self.hugo_symbol == other.hugo_symbol
            && self.protein_change == other.protein_change
            && self.variant_classification == other.variant_classification
            && self.variant_category == other.variant_category
            && self.cnv_call == other.cnv_call
            && self.wildtype == other.wildtype
            && self.chromosome == other.chromosome
            && self.position == other.position
            && self.cdna_change == other.cdna_change
            && self.reference_allele == other.reference_allele
            && self.transcript_exon == other.transcript_exon
            && self.canonical_strand == other.canonical_strand
            && self.allele_fraction.map(f64::to_bits) == other.allele_fraction.map(f64::to_bits)
            && self.tier == other.tier
            && self.genomic_id == other.genomic_id
    }
}

/// One of the three trial-node levels a match tree can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchLevel {
    Step,
    Arm,
    Dose,
}

/// Whether a trial (or trial node) is presently recruiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccrualStatus {
    Open,
    Closed,
}

/// The coordinating center constant used by the C9 ranker; anything other than DFCI sorts
/// behind it.
pub const COORDINATING_CENTER_DFCI: &str = "DFCI";

/// One (sample, trial-node, evidence) output record, as emitted by C8 and ranked by C9.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[builder(setter(into))]
pub struct TrialMatch {
    pub sample_id: SampleId,
    pub mrn: String,
    pub protocol_no: String,
    pub match_level: MatchLevel,
    pub internal_id: String,
    pub code: String,
    pub trial_accrual_status: AccrualStatus,
    #[builder(default)]
    pub diagnosis_level: Option<DiagnosisLevel>,
    #[builder(default = "COORDINATING_CENTER_DFCI.to_string()")]
    pub coordinating_center: String,
    pub evidence: Evidence,
    #[builder(default)]
    pub vital_status: Option<VitalStatus>,
    /// Filled in by C9; `None` until the ranker has run, `Some(-1)` if filtered out.
    #[builder(default)]
    pub sort_order: Option<i64>,
}

/// Per-sample clinical lookup helper built once per batch.
#[derive(Debug, Default)]
pub struct ClinicalIndex {
    by_sample: HashMap<SampleId, ClinicalRecord>,
}

impl ClinicalIndex {
    pub fn new(records: impl IntoIterator<Item = ClinicalRecord>) -> Self {
        Self {
            by_sample: records.into_iter().map(|r| (r.sample_id.clone(), r)).collect(),
        }
    }

    pub fn get(&self, sample_id: &str) -> Option<&ClinicalRecord> {
        self.by_sample.get(sample_id)
    }

    pub fn mrn_for(&self, sample_id: &str) -> Option<&str> {
        self.by_sample.get(sample_id).map(|r| r.mrn.as_str())
    }
}
