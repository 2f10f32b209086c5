//! Aggregate counters of the node, reported by `/metrics`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    model::records::MatchType,
    store::{MatchFilter, PatientFilter, Store},
};

/// Node metrics in MME API layout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub number_of_cases: usize,
    pub number_of_submitters: usize,
    pub number_of_genes: usize,
    pub number_of_unique_genes: usize,
    pub number_of_variants: usize,
    pub number_of_unique_variants: usize,
    pub number_of_features: usize,
    pub number_of_unique_features: usize,
    pub number_of_unique_genes_matched: usize,
    pub number_of_cases_with_diagnosis: usize,
    pub number_of_requests_received: usize,
    pub number_of_potential_matches_sent: usize,
    pub date_generated: String,
}

/// Compute the metrics from the store.
///
/// Requests received are the internal match records; genes matched are the genes of the
/// patients returned by them.
pub fn compute(store: &dyn Store) -> Result<Metrics, anyhow::Error> {
    let mut metrics = Metrics {
        date_generated: chrono::Utc::now().date_naive().to_string(),
        ..Default::default()
    };

    let mut submitters = HashSet::new();
    let mut genes = HashSet::new();
    let mut variants = HashSet::new();
    let mut features = HashSet::new();
    for patient in store.find_patients(&PatientFilter::All)? {
        metrics.number_of_cases += 1;
        submitters.insert(patient.contact.href.clone());
        for genomic_feature in patient.genomic_features() {
            if let Some(gene) = genomic_feature.gene() {
                metrics.number_of_genes += 1;
                genes.insert(gene.id.clone());
            }
            if let Some(variant) = genomic_feature.variant.as_ref() {
                metrics.number_of_variants += 1;
                variants.insert(variant.key());
            }
        }
        for feature in patient.features.iter().flatten() {
            metrics.number_of_features += 1;
            features.insert(feature.id.clone());
        }
        if !patient.disorder_ids().is_empty() {
            metrics.number_of_cases_with_diagnosis += 1;
        }
    }
    metrics.number_of_submitters = submitters.len();
    metrics.number_of_unique_genes = genes.len();
    metrics.number_of_unique_variants = variants.len();
    metrics.number_of_unique_features = features.len();

    let internal = store.find_matches(&MatchFilter {
        match_types: vec![MatchType::Internal],
        ..Default::default()
    })?;
    metrics.number_of_requests_received = internal.len();
    metrics.number_of_potential_matches_sent =
        internal.iter().filter(|record| record.has_matches).count();
    metrics.number_of_unique_genes_matched = internal
        .iter()
        .flat_map(|record| record.result_patients())
        .flat_map(|result| result.patient.genomic_features().iter())
        .filter_map(|genomic_feature| genomic_feature.gene())
        .map(|gene| gene.id.as_str())
        .collect::<HashSet<_>>()
        .len();

    Ok(metrics)
}
