//! Trial Driver (C8): walks `step → arm → dose`, invokes the evaluator once per match tree,
//! attaches trial-node identifiers and accrual status, and writes trial-match records to the
//! sink (§4.8). The final ranking pass (C9) runs once per batch, over the whole sink, after
//! every trial has been (re)written — see [`run_batch`].

use std::collections::HashSet;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::err::{BuildError, DriveError, EvalError, StoreError};
use crate::eval::evaluate;
use crate::model::criteria::RawMatchEntry;
use crate::model::trial::{Arm, DoseLevel, Step, TrialDocument};
use crate::model::{AccrualStatus, DiagnosisLevel, MatchLevel, MatchTreePayload, SampleId, TrialMatch, TrialMatchBuilder};
use crate::oncotree::{LIQUID_TOKEN, SOLID_TOKEN};
use crate::rank::rank;
use crate::store::StoreFacade;
use crate::tree::MatchTree;

/// One step/arm/dose node's identity, independent of nesting level.
struct NodeIdentity {
    match_level: MatchLevel,
    internal_id: String,
    code: String,
    suspended: bool,
}

fn is_suspended(flag: &Option<String>) -> bool {
    matches!(flag.as_deref(), Some(s) if s.eq_ignore_ascii_case("y"))
}

/// Scans a match-tree payload for the first clinical leaf naming
/// `oncotree_primary_diagnosis`, classifying it by the reserved-token rules (§4.2, §4.9's
/// "cancer-type specificity" key). `None` if no diagnosis criterion appears anywhere in the
/// tree — the open question of §9 resolved by scanning the whole node's tree rather than
/// trying to track which leaf produced which sample's evidence.
fn diagnosis_level_of(payload: &MatchTreePayload) -> Option<DiagnosisLevel> {
    match payload {
        MatchTreePayload::And(children) | MatchTreePayload::Or(children) => {
            children.iter().find_map(diagnosis_level_of)
        }
        MatchTreePayload::Clinical(c) => c.fields.iter().find_map(|(key, value)| {
            if !key.eq_ignore_ascii_case("oncotree_primary_diagnosis") {
                return None;
            }
            let (_, tokens) = value.strip_polarity();
            if tokens.iter().any(|t| t == SOLID_TOKEN || t == LIQUID_TOKEN) {
                Some(if tokens.iter().any(|t| t == LIQUID_TOKEN) {
                    DiagnosisLevel::Liquid
                } else {
                    DiagnosisLevel::Solid
                })
            } else {
                Some(DiagnosisLevel::Specific)
            }
        }),
        MatchTreePayload::Genomic(_) => None,
    }
}

/// One step/arm/dose node that carries a `match` payload, flattened out of the nested trial
/// tree for uniform processing.
struct MatchBearingNode<'a> {
    identity: NodeIdentity,
    raw: &'a RawMatchEntry,
}

fn collect_nodes(trial: &TrialDocument) -> Vec<MatchBearingNode<'_>> {
    let mut nodes = Vec::new();
    for step in &trial.treatment_list.step {
        push_step(step, &mut nodes);
        for arm in &step.arm {
            push_arm(arm, &mut nodes);
            for dose in &arm.dose_level {
                push_dose(dose, &mut nodes);
            }
        }
    }
    nodes
}

fn push_step<'a>(step: &'a Step, nodes: &mut Vec<MatchBearingNode<'a>>) {
    if let Some(entry) = step.r#match.as_ref().and_then(|m| m.sole_entry()) {
        nodes.push(MatchBearingNode {
            identity: NodeIdentity {
                match_level: MatchLevel::Step,
                internal_id: step.step_internal_id.clone().unwrap_or_default(),
                code: step.step_code.clone().unwrap_or_default(),
                suspended: is_suspended(&step.step_suspended),
            },
            raw: entry,
        });
    }
}

fn push_arm<'a>(arm: &'a Arm, nodes: &mut Vec<MatchBearingNode<'a>>) {
    if let Some(entry) = arm.r#match.as_ref().and_then(|m| m.sole_entry()) {
        nodes.push(MatchBearingNode {
            identity: NodeIdentity {
                match_level: MatchLevel::Arm,
                internal_id: arm.arm_internal_id.clone().unwrap_or_default(),
                code: arm.arm_code.clone().unwrap_or_default(),
                suspended: is_suspended(&arm.arm_suspended),
            },
            raw: entry,
        });
    }
}

fn push_dose<'a>(dose: &'a DoseLevel, nodes: &mut Vec<MatchBearingNode<'a>>) {
    if let Some(entry) = dose.r#match.as_ref().and_then(|m| m.sole_entry()) {
        nodes.push(MatchBearingNode {
            identity: NodeIdentity {
                match_level: MatchLevel::Dose,
                internal_id: dose.dose_level_internal_id.clone().unwrap_or_default(),
                code: dose.dose_level_code.clone().unwrap_or_default(),
                suspended: is_suspended(&dose.dose_level_suspended),
            },
            raw: entry,
        });
    }
}

/// Drives one trial document end to end, returning the full set of trial-match records to be
/// written for its `protocol_no`. Does not write to the sink itself — see [`run_batch`].
pub fn drive_trial(
    trial: &TrialDocument,
    store: &(impl StoreFacade + ?Sized),
    config: &EngineConfig,
    today: NaiveDate,
    all_samples: &HashSet<SampleId>,
) -> Result<Vec<TrialMatch>, DriveError> {
    if trial.treatment_list.step.is_empty() {
        return Err(DriveError::Build {
            protocol_no: trial.protocol_no.clone(),
            source: BuildError::EmptyTreatmentList { protocol_no: trial.protocol_no.clone() },
        });
    }

    let trial_open = trial.trial_level_open();
    let coordinating_center = trial
        .coordinating_center
        .clone()
        .unwrap_or_else(|| config.coordinating_center_dfci.to_string());

    let mut out = Vec::new();
    for node in collect_nodes(trial) {
        let payload = MatchTreePayload::from_raw(node.raw.clone());
        let diagnosis_level = diagnosis_level_of(&payload);

        let tree = MatchTree::build(payload).map_err(|source| DriveError::Build {
            protocol_no: trial.protocol_no.clone(),
            source,
        })?;

        let outcome = evaluate(&tree, store, config, today, all_samples).map_err(|source| DriveError::Eval {
            protocol_no: trial.protocol_no.clone(),
            source,
        })?;

        let node_open = trial_open && !node.identity.suspended;
        let accrual_status = if node_open { AccrualStatus::Open } else { AccrualStatus::Closed };

        for evidence in outcome.evidence {
            let clinical = store
                .clinical_by_sample(&evidence.sample_id)
                .map_err(|source| DriveError::Eval {
                    protocol_no: trial.protocol_no.clone(),
                    source: EvalError::Store(source),
                })?;
            let Some(clinical) = clinical else {
                warn!(sample_id = %evidence.sample_id, "matched sample has no clinical record, dropping");
                continue;
            };

            let record = TrialMatchBuilder::default()
                .sample_id(evidence.sample_id.clone())
                .mrn(clinical.mrn.clone())
                .protocol_no(trial.protocol_no.clone())
                .match_level(node.identity.match_level)
                .internal_id(node.identity.internal_id.clone())
                .code(node.identity.code.clone())
                .trial_accrual_status(accrual_status)
                .diagnosis_level(diagnosis_level)
                .coordinating_center(coordinating_center.clone())
                .vital_status(Some(clinical.vital_status))
                .evidence(evidence)
                .build()
                .expect("all required TrialMatch fields are set above");
            out.push(record);
        }
    }

    Ok(out)
}

/// Evaluates every trial in the store and rewrites its sink partition, evaluating
/// independent trials in parallel (§5 "the driver may evaluate independently in parallel").
/// A fatal sink failure aborts the whole batch; any other per-trial error is logged and
/// skipped, leaving that trial's prior sink contents untouched (§7).
///
/// After every trial's partition has been rewritten, runs C9 once over the entire sink.
pub fn run_batch(store: &mut (impl StoreFacade + Send + Sync), config: &EngineConfig, today: NaiveDate) -> Result<(), DriveError> {
    let all_samples = store.all_sample_ids().map_err(|source| DriveError::FatalSink {
        protocol_no: "<batch>".to_string(),
        source,
    })?;
    let trials = store.trials().map_err(|source| DriveError::FatalSink {
        protocol_no: "<batch>".to_string(),
        source,
    })?;

    let drive_all = || -> Vec<(String, Result<Vec<TrialMatch>, DriveError>)> {
        let store_ref = &*store;
        trials
            .par_iter()
            .map(|trial| (trial.protocol_no.clone(), drive_trial(trial, store_ref, config, today, &all_samples)))
            .collect()
    };

    // `batch_concurrency == 0` means "let rayon pick" (the global pool default); a positive
    // value caps how many trials C8 evaluates at once via a scoped pool, per `EngineConfig`.
    let results: Vec<(String, Result<Vec<TrialMatch>, DriveError>)> = if config.batch_concurrency > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.batch_concurrency)
            .build()
            .map_err(|e| DriveError::FatalSink {
                protocol_no: "<batch>".to_string(),
                source: StoreError::Permanent(format!("failed to build batch thread pool: {e}")),
            })?
            .install(drive_all)
    } else {
        drive_all()
    };

    for (protocol_no, outcome) in results {
        match outcome {
            Ok(records) => {
                info!(protocol_no, matches = records.len(), "writing trial-match records");
                store.replace_protocol(&protocol_no, records).map_err(|source| DriveError::FatalSink {
                    protocol_no: protocol_no.clone(),
                    source,
                })?;
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(protocol_no, error = %err, "skipping trial for this batch");
            }
        }
    }

    let mut all = store.all_matches().map_err(|source| DriveError::FatalSink {
        protocol_no: "<batch>".to_string(),
        source,
    })?;
    rank(&mut all);
    let mut ranks = std::collections::HashMap::new();
    for record in &all {
        ranks.insert(
            (record.sample_id.clone(), record.protocol_no.clone(), record.match_level.to_string(), record.internal_id.clone()),
            record.sort_order.unwrap_or(-1),
        );
    }
    store.apply_ranks(&ranks).map_err(|source| DriveError::FatalSink {
        protocol_no: "<batch>".to_string(),
        source,
    })?;

    Ok(())
}
