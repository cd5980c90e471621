//! Evidence Formatter (C7): builds the human-readable `genomic_alteration` string and
//! `match_type` tag for a matched genomic row (§4.7), and synthesizes the "why" for exclusion
//! leaves and the empty genomic block for clinical leaves.

use crate::compiler::ReasonLevel;
use crate::model::criteria::GenomicCriterion;
use crate::model::{Evidence, GenomicRecord, SampleId, VariantDetail};

/// Formats the evidence record for one matched genomic row at the given reason level.
pub fn format_genomic_match(record: &GenomicRecord, reason_level: ReasonLevel) -> Evidence {
    let match_type = reason_level.to_match_type();
    let genomic_alteration = genomic_alteration_string(record, reason_level);

    let (protein_change, variant_class, chromosome, position, cdna_change, reference_allele, transcript_exon, canonical_strand) =
        match &record.detail {
            VariantDetail::Mutation(m) => (
                m.protein_change.clone(),
                m.variant_class.clone(),
                m.chromosome.clone(),
                m.position,
                m.cdna_change.clone(),
                m.ref_allele.clone(),
                m.transcript_exon.clone(),
                m.canonical_strand.clone(),
            ),
            _ => (None, None, None, None, None, None, None, None),
        };

    let cnv_call = match &record.detail {
        VariantDetail::Cnv(c) => Some(c.cnv_call),
        _ => None,
    };

    Evidence {
        sample_id: record.sample_id.clone(),
        match_type,
        genomic_alteration,
        hugo_symbol: Some(record.hugo_symbol.clone()),
        protein_change,
        variant_classification: variant_class,
        variant_category: Some(record.variant_category),
        cnv_call,
        wildtype: Some(record.wildtype),
        chromosome,
        position,
        cdna_change,
        reference_allele,
        transcript_exon,
        canonical_strand,
        allele_fraction: record.allele_fraction,
        tier: record.tier,
        genomic_id: Some(record.variant_key.clone()),
        signature: if reason_level == ReasonLevel::Signature {
            record.signature.clone()
        } else {
            None
        },
    }
}

fn genomic_alteration_string(record: &GenomicRecord, reason_level: ReasonLevel) -> Option<String> {
    match &record.detail {
        VariantDetail::Mutation(m) => match reason_level {
            ReasonLevel::Variant => {
                Some(format!("{} {}", record.hugo_symbol, m.protein_change.as_deref().unwrap_or("")))
            }
            ReasonLevel::Wildcard => {
                Some(format!("{} {}...", record.hugo_symbol, m.ref_residue.as_deref().unwrap_or("")))
            }
            ReasonLevel::Exon => match (&m.transcript_exon, &m.variant_class) {
                (Some(exon), Some(class)) => Some(format!("{} exon {} [{}]", record.hugo_symbol, exon, class)),
                (Some(exon), None) => Some(format!("{} exon {}", record.hugo_symbol, exon)),
                (None, Some(class)) => Some(format!("{} [{}]", record.hugo_symbol, class)),
                (None, None) => Some(record.hugo_symbol.clone()),
            },
            ReasonLevel::VariantClass => match &m.variant_class {
                Some(class) => Some(format!("{} [{}]", record.hugo_symbol, class)),
                None => Some(record.hugo_symbol.clone()),
            },
            ReasonLevel::Gene | ReasonLevel::Signature => Some(record.hugo_symbol.clone()),
        },
        VariantDetail::Cnv(c) => Some(format!("{} {}", record.hugo_symbol, c.cnv_call)),
        VariantDetail::Sv(sv) => match &sv.sv_comment {
            Some(comment) => Some(comment.clone()),
            None => Some(record.hugo_symbol.clone()),
        },
    }
}

/// Synthesizes evidence for a sample that survived an exclusion leaf (§4.6 step 2: "no
/// matched row but records the trial criterion as the reason"). The alteration string is the
/// `!`-prefixed reconstruction of the criterion that was negated.
pub fn synthesize_negative_evidence(sample_id: &SampleId, criterion: &GenomicCriterion, reason_level: ReasonLevel) -> Evidence {
    Evidence {
        sample_id: sample_id.clone(),
        match_type: reason_level.to_match_type(),
        genomic_alteration: Some(format!("!{}", reconstruct_criterion(criterion))),
        ..Evidence::default()
    }
}

fn reconstruct_criterion(criterion: &GenomicCriterion) -> String {
    criterion
        .fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value.tokens().join(",")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Evidence for a clinical leaf match: clinical leaves never carry genomic detail (§9's
/// normalization of the source's two divergent codepaths).
pub fn clinical_evidence(sample_id: &SampleId) -> Evidence {
    Evidence {
        sample_id: sample_id.clone(),
        ..Evidence::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MutationDetail, VariantCategory, VariantDetail};

    fn mutation_record(protein_change: Option<&str>, ref_residue: Option<&str>) -> GenomicRecord {
        GenomicRecord {
            sample_id: "S1".into(),
            variant_key: "v1".into(),
            hugo_symbol: "BRAF".into(),
            variant_category: VariantCategory::Mutation,
            wildtype: false,
            tier: Some(1),
            allele_fraction: Some(0.4),
            detail: VariantDetail::Mutation(MutationDetail {
                protein_change: protein_change.map(String::from),
                ref_residue: ref_residue.map(String::from),
                ..Default::default()
            }),
            signature: None,
        }
    }

    #[test]
    fn variant_level_alteration_string() {
        let record = mutation_record(Some("p.V600E"), Some("p.V600"));
        let evidence = format_genomic_match(&record, ReasonLevel::Variant);
        assert_eq!(evidence.genomic_alteration.as_deref(), Some("BRAF p.V600E"));
        assert_eq!(evidence.match_type, Some(crate::model::MatchType::Variant));
    }

    #[test]
    fn wildcard_alteration_string() {
        let record = mutation_record(Some("p.V600E"), Some("p.V600"));
        let evidence = format_genomic_match(&record, ReasonLevel::Wildcard);
        assert_eq!(evidence.genomic_alteration.as_deref(), Some("BRAF p.V600..."));
    }
}
