//! Genotype matching of a query patient against stored patients.

use std::collections::HashSet;

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::{
    model::{Gene, GenomicFeature, Patient},
    store::{PatientFilter, Store},
};

/// Whether two genes are the same.
///
/// IDs are compared directly; if the ID formats differ the HGNC symbols are compared.
pub fn same_gene(lhs: &Gene, rhs: &Gene) -> bool {
    if lhs.id == rhs.id {
        return true;
    }
    if lhs.id_kind() == rhs.id_kind() {
        return false;
    }
    match (lhs.hgnc_symbol(), rhs.hgnc_symbol()) {
        (Some(lhs), Some(rhs)) => lhs.eq_ignore_ascii_case(rhs),
        _ => false,
    }
}

/// Credit of one query feature against one candidate feature.
///
/// If both features carry a variant only the variants are compared; the gene is compared
/// otherwise.
fn feature_credit(query: &GenomicFeature, candidate: &GenomicFeature, budget: f64) -> f64 {
    if query.variant.is_some() && candidate.variant.is_some() {
        let variant_match = query
            .variants()
            .any(|q| candidate.variants().any(|c| q.same_as(c)));
        return if variant_match { budget } else { 0.0 };
    }
    match (query.gene(), candidate.gene()) {
        (Some(q), Some(c)) if same_gene(q, c) => budget / 4.0,
        _ => 0.0,
    }
}

/// Genotype score of a candidate in `[0, max_score]`.
///
/// Each query feature has a budget of `max_score / n`; an identical variant (also across
/// genome releases) earns the full budget and the same gene a quarter of it.  Each query
/// feature earns the best credit over the candidate's features.
pub fn score(query: &[GenomicFeature], candidate: &Patient, max_score: f64) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let budget = max_score / query.len() as f64;
    let total = query
        .iter()
        .map(|query_feature| {
            candidate
                .genomic_features()
                .iter()
                .map(|candidate_feature| feature_credit(query_feature, candidate_feature, budget))
                .fold(0.0, f64::max)
        })
        .sum::<f64>();
    total.clamp(0.0, max_score)
}

/// Store filter selecting patients that share a gene or a variant with the query.
pub fn filter(query: &[GenomicFeature]) -> PatientFilter {
    let mut gene_ids = HashSet::new();
    let mut gene_symbols = HashSet::new();
    let mut variant_keys = HashSet::new();
    for genomic_feature in query {
        if let Some(gene) = genomic_feature.gene() {
            gene_ids.insert(gene.id.clone());
            if let Some(symbol) = gene.hgnc_symbol() {
                gene_symbols.insert(symbol.to_string());
            }
        }
        variant_keys.extend(genomic_feature.variants().map(|variant| variant.key()));
    }
    PatientFilter::Genomic {
        gene_ids,
        gene_symbols,
        variant_keys,
    }
}

/// A genotype match.
#[derive(Debug, Clone, PartialEq)]
pub struct GenoMatch {
    pub patient: Patient,
    pub score: f64,
}

/// Score all stored patients sharing a gene or variant with the query.
///
/// The result is keyed by patient ID and follows store order; it is empty if the query has
/// no genomic features.  The query patient itself is not part of the result.
pub fn matches(
    store: &dyn Store,
    max_score: f64,
    query: &Patient,
) -> Result<IndexMap<String, GenoMatch>, anyhow::Error> {
    let query_features = query.genomic_features();
    if query_features.is_empty() {
        return Ok(IndexMap::new());
    }

    let candidates = store.find_patients(&filter(query_features))?;
    tracing::debug!(
        "found {} genotype candidates for patient {}",
        candidates.len(),
        &query.id
    );
    let scored = candidates
        .into_par_iter()
        .filter(|candidate| candidate.id != query.id)
        .map(|candidate| {
            let score = score(query_features, &candidate, max_score);
            (
                candidate.id.clone(),
                GenoMatch {
                    patient: candidate,
                    score,
                },
            )
        })
        .collect::<Vec<_>>();

    Ok(scored.into_iter().collect())
}
