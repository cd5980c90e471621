//! Sort-Order Ranker (C9): assigns a per-`(sample_id, protocol_no)` rank from the fixed
//! five-key lexicographic comparator of §4.9.

use std::collections::HashMap;

use tracing::warn;

use crate::model::{AccrualStatus, DiagnosisLevel, Evidence, MatchType, SampleId, TrialMatch, VariantCategory, VitalStatus};

/// The five-key vector, lower is better in every position (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct RankVector {
    tier_bucket: u8,
    match_type_level: u8,
    specificity: u8,
    center: u8,
    reverse_protocol: u32,
}

fn tier_bucket(evidence: &Evidence) -> u8 {
    if evidence.signature.is_some() {
        0
    } else if evidence.tier == Some(1) {
        1
    } else if evidence.tier == Some(2) {
        2
    } else if evidence.variant_category == Some(VariantCategory::Cnv) {
        3
    } else if evidence.tier == Some(3) {
        4
    } else if evidence.tier == Some(4) {
        5
    } else if evidence.wildtype == Some(true) {
        6
    } else {
        7
    }
}

fn match_type_level(evidence: &Evidence) -> u8 {
    match evidence.match_type {
        Some(MatchType::Variant) => 0,
        Some(MatchType::Wildcard) => 1,
        Some(MatchType::Exon) => 2,
        Some(MatchType::Gene) => 3,
        _ => 4,
    }
}

fn specificity(diagnosis_level: Option<DiagnosisLevel>) -> u8 {
    match diagnosis_level {
        Some(DiagnosisLevel::Specific) => 0,
        Some(DiagnosisLevel::Solid) | Some(DiagnosisLevel::Liquid) => 1,
        None => 2,
    }
}

fn center_bucket(coordinating_center: &str) -> u8 {
    if coordinating_center.eq_ignore_ascii_case("DFCI") {
        0
    } else {
        1
    }
}

/// The integer prefix of `protocol_no.split("-")[0]`, e.g. `19` for `"19-001"`. Malformed
/// prefixes sort last (treated as `0`) and are logged, per §7's "unknown field" tolerance.
fn protocol_number_prefix(protocol_no: &str) -> u32 {
    let head = protocol_no.split('-').next().unwrap_or(protocol_no);
    head.parse().unwrap_or_else(|_| {
        warn!(protocol_no, "protocol number has no parseable integer prefix, ranking as 0");
        0
    })
}

fn eligible(evidence_list: &[&Evidence], vital_status: Option<VitalStatus>, trial_accrual_status: AccrualStatus) -> bool {
    if vital_status != Some(VitalStatus::Alive) {
        return false;
    }
    if trial_accrual_status != AccrualStatus::Open {
        return false;
    }
    if evidence_list.iter().any(|e| e.variant_category == Some(VariantCategory::Sv)) {
        return false;
    }
    true
}

/// Computes the sort rank for every `(sample_id, protocol_no)` pair present in `records`, and
/// writes it back into `sort_order` on every record sharing that pair. Records whose pair
/// fails the eligibility filter receive `-1` (§4.9).
pub fn rank(records: &mut [TrialMatch]) {
    struct Group<'a> {
        evidence: Vec<&'a Evidence>,
        vital_status: Option<VitalStatus>,
        trial_accrual_status: AccrualStatus,
        diagnosis_level: Option<DiagnosisLevel>,
        coordinating_center: String,
    }

    let mut groups: HashMap<(SampleId, String), Group> = HashMap::new();
    for record in records.iter() {
        let key = (record.sample_id.clone(), record.protocol_no.clone());
        let group = groups.entry(key).or_insert_with(|| Group {
            evidence: Vec::new(),
            vital_status: record.vital_status,
            trial_accrual_status: record.trial_accrual_status,
            diagnosis_level: None,
            coordinating_center: record.coordinating_center.clone(),
        });
        group.evidence.push(&record.evidence);
        // Best (most specific) diagnosis level observed across this pair's evidence.
        group.diagnosis_level = match (group.diagnosis_level, record.diagnosis_level) {
            (None, other) => other,
            (Some(existing), Some(candidate)) if specificity(Some(candidate)) < specificity(Some(existing)) => Some(candidate),
            (existing, _) => existing,
        };
    }

    let mut vectors: HashMap<(SampleId, String), Option<(u8, u8, u8, u8)>> = HashMap::new();
    for (key, group) in &groups {
        if !eligible(&group.evidence, group.vital_status, group.trial_accrual_status) {
            vectors.insert(key.clone(), None);
            continue;
        }
        let tier = group.evidence.iter().map(|e| tier_bucket(e)).min().unwrap_or(7);
        let match_type = group.evidence.iter().map(|e| match_type_level(e)).min().unwrap_or(4);
        let spec = specificity(group.diagnosis_level);
        let center = center_bucket(&group.coordinating_center);
        vectors.insert(key.clone(), Some((tier, match_type, spec, center)));
    }

    // Fifth key: dense descending rank of the protocol-number prefix, scoped per sample.
    let mut prefixes_by_sample: HashMap<SampleId, Vec<u32>> = HashMap::new();
    for (sample_id, protocol_no) in groups.keys() {
        if vectors[&(sample_id.clone(), protocol_no.clone())].is_some() {
            prefixes_by_sample
                .entry(sample_id.clone())
                .or_default()
                .push(protocol_number_prefix(protocol_no));
        }
    }
    let mut reverse_rank_by_sample: HashMap<SampleId, HashMap<u32, u32>> = HashMap::new();
    for (sample_id, prefixes) in prefixes_by_sample.iter_mut() {
        prefixes.sort_unstable();
        prefixes.dedup();
        prefixes.reverse();
        let ranks = prefixes.iter().enumerate().map(|(i, p)| (*p, i as u32)).collect();
        reverse_rank_by_sample.insert(sample_id.clone(), ranks);
    }

    let mut full_vectors: HashMap<(SampleId, String), Option<RankVector>> = HashMap::new();
    for (key, vector) in &vectors {
        let (sample_id, protocol_no) = key;
        let full = vector.map(|(tier_bucket, match_type_level, specificity, center)| RankVector {
            tier_bucket,
            match_type_level,
            specificity,
            center,
            reverse_protocol: reverse_rank_by_sample[sample_id][&protocol_number_prefix(protocol_no)],
        });
        full_vectors.insert(key.clone(), full);
    }

    // Final lexicographic order within each sample, 0-based position.
    let mut by_sample: HashMap<SampleId, Vec<(String, RankVector)>> = HashMap::new();
    for ((sample_id, protocol_no), vector) in &full_vectors {
        if let Some(vector) = vector {
            by_sample.entry(sample_id.clone()).or_default().push((protocol_no.clone(), *vector));
        }
    }
    let mut rank_lookup: HashMap<(SampleId, String), i64> = HashMap::new();
    for (sample_id, mut pairs) in by_sample {
        pairs.sort_by_key(|(_, v)| *v);
        for (position, (protocol_no, _)) in pairs.into_iter().enumerate() {
            rank_lookup.insert((sample_id.clone(), protocol_no), position as i64);
        }
    }

    for record in records.iter_mut() {
        let key = (record.sample_id.clone(), record.protocol_no.clone());
        record.sort_order = Some(*rank_lookup.get(&key).unwrap_or(&-1));
    }
}
