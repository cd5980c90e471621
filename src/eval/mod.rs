//! Match Evaluator (C6): the core post-order traversal of a built [`MatchTree`], combining
//! per-leaf store queries into per-node sample-id result sets and evidence lists (§4.6).

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::compiler::{compile_clinical, compile_genomic, Projection, QueryPlan, ReasonLevel};
use crate::config::EngineConfig;
use crate::err::EvalError;
use crate::evidence::{clinical_evidence, format_genomic_match, synthesize_negative_evidence};
use crate::model::{Evidence, SampleId};
use crate::store::{ClinicalStore, GenomicStore};
use crate::tree::{LeafCriterion, MatchNode, MatchTree, NodeId};

/// The `(result, evidence)` pair carried by every node during the traversal, and the final
/// answer read off the root (§4.6).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOutcome {
    pub result: HashSet<SampleId>,
    pub evidence: Vec<Evidence>,
}

/// Appends `new` into `into`, skipping any record already present by full-tuple equality
/// (§3 invariant: "de-duplicated by the full evidence tuple"), and keeping only samples in
/// `keep`.
fn merge_dedup(into: &mut Vec<Evidence>, new: impl IntoIterator<Item = Evidence>, keep: &HashSet<SampleId>) {
    for candidate in new {
        if !keep.contains(&candidate.sample_id) {
            continue;
        }
        if !into.iter().any(|existing| existing.same_tuple(&candidate)) {
            into.push(candidate);
        }
    }
}

/// Evaluates a single leaf, returning its `(result, evidence)`.
fn evaluate_leaf(
    criterion: &LeafCriterion,
    store: &(impl ClinicalStore + GenomicStore + ?Sized),
    config: &EngineConfig,
    today: NaiveDate,
    all_samples: &HashSet<SampleId>,
) -> Result<EvalOutcome, EvalError> {
    match criterion {
        LeafCriterion::Clinical(c) => {
            let compiled = compile_clinical(c, config, today)?;
            let QueryPlan::Clinical(query) = &compiled.plan else {
                unreachable!("compile_clinical always returns a Clinical plan")
            };
            let rows = store.find_clinical(query)?;
            let matched: HashSet<SampleId> = rows.iter().map(|r| r.sample_id.clone()).collect();

            if compiled.inclusion {
                let evidence = matched.iter().map(clinical_evidence).collect();
                Ok(EvalOutcome { result: matched, evidence })
            } else {
                let result: HashSet<SampleId> = all_samples.difference(&matched).cloned().collect();
                let evidence = result.iter().map(clinical_evidence).collect();
                Ok(EvalOutcome { result, evidence })
            }
        }
        LeafCriterion::Genomic(g) => {
            let compiled = compile_genomic(g, config)?;
            match &compiled.plan {
                QueryPlan::Empty => Ok(EvalOutcome::default()),
                QueryPlan::Genomic(query) => {
                    let rows = store.find_genomic(query)?;
                    if compiled.inclusion {
                        let result: HashSet<SampleId> = rows.iter().map(|r| r.sample_id.clone()).collect();
                        let evidence = rows
                            .iter()
                            .map(|r| format_genomic_match(r, compiled.reason_level))
                            .collect();
                        Ok(EvalOutcome { result, evidence })
                    } else {
                        let matched: HashSet<SampleId> = rows.iter().map(|r| r.sample_id.clone()).collect();
                        let result: HashSet<SampleId> = all_samples.difference(&matched).cloned().collect();
                        let evidence = result
                            .iter()
                            .map(|s| synthesize_negative_evidence(s, g, compiled.reason_level))
                            .collect();
                        Ok(EvalOutcome { result, evidence })
                    }
                }
                QueryPlan::Clinical(_) => unreachable!("compile_genomic never returns a Clinical plan"),
            }
        }
    }
}

/// Evaluates a whole [`MatchTree`] against the store, returning the root's `(result,
/// evidence)`. `all_samples` is the global `ALL` set of §4.6, typically cached once per batch
/// (§5 "Shared-resource policy").
pub fn evaluate(
    tree: &MatchTree,
    store: &(impl ClinicalStore + GenomicStore + ?Sized),
    config: &EngineConfig,
    today: NaiveDate,
    all_samples: &HashSet<SampleId>,
) -> Result<EvalOutcome, EvalError> {
    let mut outcomes: HashMap<NodeId, EvalOutcome> = HashMap::new();

    for id in tree.post_order() {
        let outcome = match tree.node(id) {
            MatchNode::Leaf(criterion) => evaluate_leaf(criterion, store, config, today, all_samples)?,
            MatchNode::And(children) => {
                let mut result: Option<HashSet<SampleId>> = None;
                for child in children {
                    let child_result = &outcomes[child].result;
                    result = Some(match result {
                        None => child_result.clone(),
                        Some(acc) => acc.intersection(child_result).cloned().collect(),
                    });
                }
                let result = result.unwrap_or_default();

                let mut evidence = Vec::new();
                for child in children {
                    merge_dedup(&mut evidence, outcomes[child].evidence.iter().cloned(), &result);
                }
                EvalOutcome { result, evidence }
            }
            MatchNode::Or(children) => {
                let mut result = HashSet::new();
                for child in children {
                    result.extend(outcomes[child].result.iter().cloned());
                }

                let mut evidence = Vec::new();
                for child in children {
                    merge_dedup(&mut evidence, outcomes[child].evidence.iter().cloned(), &result);
                }
                EvalOutcome { result, evidence }
            }
        };
        outcomes.insert(id, outcome);
    }

    Ok(outcomes.remove(&tree.root()).expect("root was visited in post-order"))
}

/// Exclusion leaves always project only `SAMPLE_ID` (§4.4); used by store implementations
/// that want to short-circuit genomic-row hydration for negated leaves.
pub fn is_sample_id_only(projection: Projection) -> bool {
    matches!(projection, Projection::SampleIdOnly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::criteria::{ClinicalCriterion, CriterionValue, GenomicCriterion};
    use crate::model::{
        CnvCall, CnvDetail, GenomicRecordBuilder, MutationDetail, VariantCategory, VariantDetail,
        ClinicalRecordBuilder, VitalStatus,
    };
    use crate::oncotree::{Oncotree, OncotreeEdge};
    use crate::store::InMemoryStore;
    use crate::tree::MatchTree;
    use indexmap::IndexMap;

    fn config() -> EngineConfig {
        let oncotree = Oncotree::build([
            OncotreeEdge { parent_text: None, text: "Tissue".into() },
            OncotreeEdge { parent_text: Some("Tissue".into()), text: "Lung".into() },
            OncotreeEdge { parent_text: Some("Lung".into()), text: "Lung Adenocarcinoma".into() },
        ]);
        EngineConfig::new(oncotree)
    }

    fn clinical_fields(pairs: &[(&str, &str)]) -> IndexMap<String, CriterionValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), CriterionValue::Single(v.to_string()))).collect()
    }

    fn s1_clinical() -> crate::model::ClinicalRecord {
        ClinicalRecordBuilder::default()
            .sample_id("S1")
            .mrn("MRN1")
            .birth_date(chrono::NaiveDate::from_ymd_opt(1976, 1, 1).unwrap())
            .gender("Female")
            .oncotree_primary_diagnosis("Lung Adenocarcinoma")
            .vital_status(VitalStatus::Alive)
            .build()
            .unwrap()
    }

    fn s2_clinical() -> crate::model::ClinicalRecord {
        ClinicalRecordBuilder::default()
            .sample_id("S2")
            .mrn("MRN2")
            .birth_date(chrono::NaiveDate::from_ymd_opt(1990, 1, 1).unwrap())
            .gender("Male")
            .oncotree_primary_diagnosis("Lung Adenocarcinoma")
            .vital_status(VitalStatus::Alive)
            .build()
            .unwrap()
    }

    fn braf_v600e(sample_id: &str) -> crate::model::GenomicRecord {
        GenomicRecordBuilder::default()
            .sample_id(sample_id)
            .variant_key(format!("{sample_id}-braf"))
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
            .unwrap()
    }

    #[test]
    fn scenario_braf_v600e_variant_match() {
        let config = config();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let store = InMemoryStore::new(vec![s1_clinical(), s2_clinical()], vec![braf_v600e("S1")], vec![]);
        let all_samples: HashSet<SampleId> = ["S1".to_string(), "S2".to_string()].into_iter().collect();

        use crate::model::MatchTreePayload;
        let payload = MatchTreePayload::And(vec![
            MatchTreePayload::Genomic(GenomicCriterion {
                fields: clinical_fields(&[("hugo_symbol", "BRAF"), ("variant_category", "Mutation"), ("protein_change", "p.V600E")]),
            }),
            MatchTreePayload::Clinical(ClinicalCriterion {
                fields: clinical_fields(&[("age_numerical", ">=18"), ("oncotree_primary_diagnosis", "Lung Adenocarcinoma")]),
            }),
        ]);
        let tree = MatchTree::build(payload).unwrap();

        let outcome = evaluate(&tree, &store, &config, today, &all_samples).unwrap();
        assert_eq!(outcome.result, ["S1".to_string()].into_iter().collect());
        assert_eq!(outcome.evidence.len(), 1);
        assert_eq!(outcome.evidence[0].genomic_alteration.as_deref(), Some("BRAF p.V600E"));
        assert_eq!(outcome.evidence[0].match_type, Some(crate::model::MatchType::Variant));
    }

    #[test]
    fn scenario_exclusion_of_braf_v600e() {
        let config = config();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let store = InMemoryStore::new(vec![s1_clinical(), s2_clinical()], vec![braf_v600e("S1")], vec![]);
        let all_samples: HashSet<SampleId> = ["S1".to_string(), "S2".to_string()].into_iter().collect();

        use crate::model::MatchTreePayload;
        let payload = MatchTreePayload::Genomic(GenomicCriterion {
            fields: clinical_fields(&[("hugo_symbol", "BRAF"), ("variant_category", "!Mutation"), ("protein_change", "p.V600E")]),
        });
        let tree = MatchTree::build(payload).unwrap();
        let outcome = evaluate(&tree, &store, &config, today, &all_samples).unwrap();
        assert!(outcome.result.contains("S2"));
        assert!(!outcome.result.contains("S1"));
    }

    #[test]
    fn scenario_cnv_call_is_exact_not_any_cnv() {
        let config = config();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
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
        let store = InMemoryStore::new(vec![s1_clinical(), s2_clinical()], vec![het_del, gain], vec![]);
        let all_samples: HashSet<SampleId> = ["S1".to_string(), "S2".to_string()].into_iter().collect();

        use crate::model::MatchTreePayload;
        let payload = MatchTreePayload::Genomic(GenomicCriterion {
            fields: clinical_fields(&[
                ("hugo_symbol", "BRAF"),
                ("variant_category", "Copy Number Variation"),
                ("cnv_call", "Heterozygous Deletion"),
            ]),
        });
        let tree = MatchTree::build(payload).unwrap();
        let outcome = evaluate(&tree, &store, &config, today, &all_samples).unwrap();
        assert_eq!(outcome.result, ["S1".to_string()].into_iter().collect());
    }

    #[test]
    fn and_node_evidence_keeps_first_childs_record_on_tie() {
        let config = config();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let store = InMemoryStore::new(vec![s1_clinical()], vec![braf_v600e("S1")], vec![]);
        let all_samples: HashSet<SampleId> = ["S1".to_string()].into_iter().collect();

        use crate::model::MatchTreePayload;
        let payload = MatchTreePayload::And(vec![
            MatchTreePayload::Genomic(GenomicCriterion {
                fields: clinical_fields(&[("hugo_symbol", "BRAF"), ("protein_change", "p.V600E")]),
            }),
            MatchTreePayload::Genomic(GenomicCriterion {
                fields: clinical_fields(&[("hugo_symbol", "BRAF"), ("protein_change", "p.V600E")]),
            }),
        ]);
        let tree = MatchTree::build(payload).unwrap();
        let outcome = evaluate(&tree, &store, &config, today, &all_samples).unwrap();
        // Both children contribute an equal-by-value evidence tuple; AND dedups to one record.
        assert_eq!(outcome.evidence.len(), 1);
    }
}
