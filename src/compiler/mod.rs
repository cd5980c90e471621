//! Compiles a single match-tree leaf criterion into a store-query plan, projection spec,
//! inclusion/exclusion polarity, and reason-level descriptor.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::age::{AgePredicate, BirthDateBound};
use crate::config::EngineConfig;
use crate::err::CompileError;
use crate::model::{ClinicalCriterion, CriterionValue, GenomicCriterion};

/// The granularity at which a genomic leaf is meant to match, computed at compile time.
/// A superset of [`crate::model::MatchType`]: `Signature` never appears in emitted
/// evidence, it only steers which store fields the leaf's query touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonLevel {
    Variant,
    Wildcard,
    Exon,
    VariantClass,
    Gene,
    Signature,
}

impl ReasonLevel {
    /// The evidence-facing [`crate::model::MatchType`], or `None` for `Signature` leaves
    /// (which carry no match-type, only a populated `signature` block).
    pub fn to_match_type(self) -> Option<crate::model::MatchType> {
        use crate::model::MatchType;
        match self {
            ReasonLevel::Variant => Some(MatchType::Variant),
            ReasonLevel::Wildcard => Some(MatchType::Wildcard),
            ReasonLevel::Exon => Some(MatchType::Exon),
            ReasonLevel::VariantClass => Some(MatchType::VariantClass),
            ReasonLevel::Gene => Some(MatchType::Gene),
            ReasonLevel::Signature => None,
        }
    }
}

/// What fields a leaf's matched rows should be reported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Full evidence projection (mutation/CNV/SV fields, per §4.4).
    Full,
    /// Exclusion leaves only ever need the sample id to compute the complement set.
    SampleIdOnly,
}

/// A compiled clinical leaf query. Every present field is ANDed together; diagnosis
/// membership is always expressed as a positive "in this set" test — exclusion polarity is
/// applied afterwards, against the global sample set, not by negating the query itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicalQuery {
    pub diagnosis_in: Option<HashSet<String>>,
    pub birth_date: Option<BirthDateBound>,
    pub gender: Option<String>,
}

impl ClinicalQuery {
    /// Whether the query has no recognized fields at all (compiles to "match everyone").
    pub fn is_empty(&self) -> bool {
        self.diagnosis_in.is_none() && self.birth_date.is_none() && self.gender.is_none()
    }
}

/// Signature-field equality sub-query, recognized independently of mutation/CNV/SV fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureQuery {
    pub mmr_status: Option<String>,
    pub ms_status: Option<String>,
    pub tobacco_status: Option<String>,
    pub tmz_status: Option<String>,
    pub pole_status: Option<String>,
    pub apobec_status: Option<String>,
    pub uva_status: Option<String>,
}

impl SignatureQuery {
    fn is_empty(&self) -> bool {
        self.mmr_status.is_none()
            && self.ms_status.is_none()
            && self.tobacco_status.is_none()
            && self.tmz_status.is_none()
            && self.pole_status.is_none()
            && self.apobec_status.is_none()
            && self.uva_status.is_none()
    }
}

/// A compiled genomic leaf query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenomicQuery {
    pub hugo_symbol: Option<String>,
    pub variant_category: Option<String>,
    pub protein_change: Option<String>,
    pub wildcard_protein_change: Option<String>,
    pub variant_classification: Option<String>,
    pub exon: Option<String>,
    pub cnv_call: Option<String>,
    /// `None` means "apply wildtype defaulting" (match `false` or absent); `Some(v)` means
    /// the criterion named `wildtype` explicitly and defaulting does not apply.
    pub wildtype: Option<bool>,
    pub signature: SignatureQuery,
}

/// The store-query half of a compiled leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    Clinical(ClinicalQuery),
    Genomic(GenomicQuery),
    /// Never matches (SV at variant granularity, or a criterion with no recognized fields
    /// at all on the genomic side).
    Empty,
}

/// The full output of compiling one leaf criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledLeaf {
    pub plan: QueryPlan,
    pub projection: Projection,
    pub inclusion: bool,
    pub reason_level: ReasonLevel,
}

fn field<'a>(fields: &'a indexmap::IndexMap<String, CriterionValue>, name: &str) -> Option<&'a CriterionValue> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

/// Compiles a `clinical` leaf criterion.
pub fn compile_clinical(
    criterion: &ClinicalCriterion,
    config: &EngineConfig,
    today: NaiveDate,
) -> Result<CompiledLeaf, CompileError> {
    let mut any_negative = false;
    let mut query = ClinicalQuery::default();

    if let Some(value) = field(&criterion.fields, "oncotree_primary_diagnosis") {
        let (negative, tokens) = value.strip_polarity();
        any_negative |= negative;
        query.diagnosis_in = Some(config.oncotree.expand_all(tokens.iter().map(String::as_str)));
    }
    if let Some(value) = field(&criterion.fields, "age_numerical") {
        let (negative, tokens) = value.strip_polarity();
        any_negative |= negative;
        let raw = tokens.first().cloned().unwrap_or_default();
        let predicate = AgePredicate::parse(&raw)?;
        query.birth_date = Some(predicate.to_birth_date_bound(today));
    }
    if let Some(value) = field(&criterion.fields, "gender") {
        let (negative, tokens) = value.strip_polarity();
        any_negative |= negative;
        query.gender = tokens.into_iter().next();
    }

    let reason_level = ReasonLevel::Gene;
    Ok(CompiledLeaf {
        plan: QueryPlan::Clinical(query),
        projection: if any_negative { Projection::SampleIdOnly } else { Projection::Full },
        inclusion: !any_negative,
        reason_level,
    })
}

const SV_ONLY_FIELDS: &[&str] = &["protein_change", "wildcard_protein_change", "variant_classification", "exon"];

/// Compiles a `genomic` leaf criterion.
pub fn compile_genomic(criterion: &GenomicCriterion, config: &EngineConfig) -> Result<CompiledLeaf, CompileError> {
    let mut any_negative = false;
    let mut query = GenomicQuery::default();

    let mut take = |name: &str| -> Option<String> {
        field(&criterion.fields, name).map(|v| {
            let (negative, tokens) = v.strip_polarity();
            any_negative |= negative;
            tokens.into_iter().next().unwrap_or_default()
        })
    };

    query.hugo_symbol = take("hugo_symbol");
    let variant_category_raw = take("variant_category");
    query.variant_category = variant_category_raw
        .as_deref()
        .map(|v| config.vocab.translate_value("VARIANT_CATEGORY", v).to_string());
    query.protein_change = take("protein_change");
    query.wildcard_protein_change = take("wildcard_protein_change");
    query.variant_classification = take("variant_classification");
    query.exon = take("exon");
    let cnv_call_raw = take("cnv_call");
    query.cnv_call = cnv_call_raw
        .as_deref()
        .map(|v| config.vocab.translate_value("CNV_CALL", v).to_string());

    let wildtype_explicit = field(&criterion.fields, "wildtype").is_some();
    if let Some(raw) = take("wildtype") {
        query.wildtype = Some(raw.eq_ignore_ascii_case("true"));
    }

    query.signature.mmr_status = take("mmr_status");
    query.signature.ms_status = take("ms_status");
    query.signature.tobacco_status = take("tobacco_status");
    query.signature.tmz_status = take("tmz_status");
    query.signature.pole_status = take("pole_status");
    query.signature.apobec_status = take("apobec_status");
    query.signature.uva_status = take("uva_status");

    let reason_level = if !query.signature.is_empty() {
        ReasonLevel::Signature
    } else if query.variant_category.as_deref() == Some("SV") {
        if SV_ONLY_FIELDS.iter().any(|f| field(&criterion.fields, f).is_some()) {
            return Ok(CompiledLeaf {
                plan: QueryPlan::Empty,
                projection: Projection::SampleIdOnly,
                inclusion: !any_negative,
                reason_level: ReasonLevel::Gene,
            });
        }
        ReasonLevel::Gene
    } else if query.variant_category.as_deref() == Some("CNV") || query.cnv_call.is_some() {
        if query.cnv_call.is_some() {
            ReasonLevel::Variant
        } else {
            ReasonLevel::Gene
        }
    } else if query.protein_change.is_some() {
        ReasonLevel::Variant
    } else if query.wildcard_protein_change.is_some() {
        ReasonLevel::Wildcard
    } else if query.variant_classification.is_some() {
        ReasonLevel::VariantClass
    } else if query.exon.is_some() {
        ReasonLevel::Exon
    } else {
        ReasonLevel::Gene
    };

    if query.hugo_symbol.is_none()
        && query.variant_category.is_none()
        && query.protein_change.is_none()
        && query.wildcard_protein_change.is_none()
        && query.variant_classification.is_none()
        && query.exon.is_none()
        && query.cnv_call.is_none()
        && !wildtype_explicit
        && query.signature.is_empty()
    {
        return Ok(CompiledLeaf {
            plan: QueryPlan::Empty,
            projection: Projection::SampleIdOnly,
            inclusion: !any_negative,
            reason_level,
        });
    }

    Ok(CompiledLeaf {
        plan: QueryPlan::Genomic(query),
        projection: if any_negative { Projection::SampleIdOnly } else { Projection::Full },
        inclusion: !any_negative,
        reason_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::oncotree::{Oncotree, OncotreeEdge};
    use indexmap::IndexMap;

    fn config() -> EngineConfig {
        let oncotree = Oncotree::build([
            OncotreeEdge { parent_text: None, text: "Tissue".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Lung".into() },
            OncotreeEdge { parent_text: Some("Lung".into()), text: "Lung Adenocarcinoma".into() },
        ]);
        EngineConfig::new(oncotree)
    }

    fn criterion(pairs: &[(&str, &str)]) -> IndexMap<String, CriterionValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), CriterionValue::Single(v.to_string())))
            .collect()
    }

    #[test]
    fn clinical_compiles_diagnosis_and_age() {
        let c = ClinicalCriterion {
            fields: criterion(&[("oncotree_primary_diagnosis", "Lung Adenocarcinoma"), ("age_numerical", ">=18")]),
        };
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let compiled = compile_clinical(&c, &config(), today).unwrap();
        assert!(compiled.inclusion);
        match compiled.plan {
            QueryPlan::Clinical(q) => {
                assert!(q.diagnosis_in.unwrap().contains("Lung Adenocarcinoma"));
                assert!(q.birth_date.is_some());
            }
            _ => panic!("expected clinical plan"),
        }
    }

    #[test]
    fn genomic_exclusion_flag_from_any_negative_field() {
        let c = GenomicCriterion {
            fields: criterion(&[("hugo_symbol", "BRAF"), ("variant_category", "!Mutation")]),
        };
        let compiled = compile_genomic(&c, &config()).unwrap();
        assert!(!compiled.inclusion);
    }

    #[test]
    fn sv_variant_granularity_compiles_empty() {
        let c = GenomicCriterion {
            fields: criterion(&[("variant_category", "Structural Variation"), ("protein_change", "p.X")]),
        };
        let compiled = compile_genomic(&c, &config()).unwrap();
        assert_eq!(compiled.plan, QueryPlan::Empty);
    }

    #[test]
    fn reason_level_cascade_prefers_protein_change() {
        let c = GenomicCriterion {
            fields: criterion(&[("hugo_symbol", "BRAF"), ("protein_change", "p.V600E"), ("exon", "15")]),
        };
        let compiled = compile_genomic(&c, &config()).unwrap();
        assert_eq!(compiled.reason_level, ReasonLevel::Variant);
    }
}
