//! Phenotype matching of a query patient against stored patients.

use std::collections::HashSet;

use indexmap::IndexMap;
use rayon::prelude::*;

use super::{algos::simgic, diseases::normalize_code, Context};
use crate::{
    model::Patient,
    store::{PatientFilter, Store},
};

/// Phenotypic description of a query patient, prepared once per query.
#[derive(Debug, Clone, Default)]
pub struct PhenoQuery {
    /// Observed term IDs.
    pub term_ids: Vec<String>,
    /// Normalized, deduplicated disorder codes.
    pub disorder_ids: Vec<String>,
}

impl PhenoQuery {
    /// Extract the phenotypic description from a patient.
    pub fn from_patient(patient: &Patient) -> Self {
        Self {
            term_ids: patient
                .observed_term_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
            disorder_ids: normalized_disorders(patient).into_iter().collect(),
        }
    }

    /// Whether the query carries any phenotypic information.
    pub fn is_empty(&self) -> bool {
        self.term_ids.is_empty() && self.disorder_ids.is_empty()
    }

    /// Store filter selecting the candidates of this query.
    pub fn filter(&self) -> PatientFilter {
        PatientFilter::Phenotypic {
            with_features: !self.term_ids.is_empty(),
            disorder_ids: self.disorder_ids.iter().cloned().collect(),
        }
    }
}

/// Normalized disorder codes of a patient, in order of first occurrence.
fn normalized_disorders(patient: &Patient) -> indexmap::IndexSet<String> {
    patient
        .disorder_ids()
        .into_iter()
        .filter_map(normalize_code)
        .collect()
}

/// Fraction of the query codes present in the candidate codes, scaled to `max_score`.
fn disorder_overlap(query: &[String], candidate: &HashSet<String>, max_score: f64) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let shared = query.iter().filter(|id| candidate.contains(*id)).count();
    shared as f64 / query.len() as f64 * max_score
}

/// Phenotype score of a candidate in `[0, max_score]`.
///
/// If both sides have terms, their simGIC similarity claims the full budget, or half of it
/// if both sides also have disorders.  If terms are missing on either side, the disorder
/// overlap may claim only half of the budget.
pub fn score(ctx: &Context, max_score: f64, query: &PhenoQuery, candidate: &Patient) -> f64 {
    let candidate_terms = candidate.observed_term_ids();
    let candidate_disorders = normalized_disorders(candidate)
        .into_iter()
        .collect::<HashSet<_>>();

    let (term_score, max_disorder_score) =
        if !query.term_ids.is_empty() && !candidate_terms.is_empty() {
            let (max_term_score, max_disorder_score) =
                if !query.disorder_ids.is_empty() && !candidate_disorders.is_empty() {
                    (max_score / 2.0, max_score / 2.0)
                } else {
                    (max_score, 0.0)
                };
            let q = ctx
                .ontology
                .ancestors_of_all(query.term_ids.iter().map(String::as_str));
            let d = ctx.ontology.ancestors_of_all(candidate_terms);
            (
                simgic::score(&q, &d, &ctx.ic) * max_term_score,
                max_disorder_score,
            )
        } else {
            (0.0, max_score / 2.0)
        };

    let disorder_score = if max_disorder_score > 0.0 {
        disorder_overlap(&query.disorder_ids, &candidate_disorders, max_disorder_score)
    } else {
        0.0
    };

    (term_score + disorder_score).clamp(0.0, max_score)
}

/// A phenotype match.
#[derive(Debug, Clone, PartialEq)]
pub struct PhenoMatch {
    pub patient: Patient,
    pub score: f64,
}

/// Score all stored patients that have features or share a disorder with the query.
///
/// The result is keyed by patient ID and follows store order.  The query patient itself is
/// not part of the result.
pub fn matches(
    ctx: &Context,
    store: &dyn Store,
    max_score: f64,
    query: &Patient,
) -> Result<IndexMap<String, PhenoMatch>, anyhow::Error> {
    let pheno_query = PhenoQuery::from_patient(query);
    if pheno_query.is_empty() {
        return Ok(IndexMap::new());
    }

    let candidates = store.find_patients(&pheno_query.filter())?;
    tracing::debug!(
        "found {} phenotype candidates for patient {}",
        candidates.len(),
        &query.id
    );
    let scored = candidates
        .into_par_iter()
        .filter(|candidate| candidate.id != query.id)
        .map(|candidate| {
            let score = score(ctx, max_score, &pheno_query, &candidate);
            (
                candidate.id.clone(),
                PhenoMatch {
                    patient: candidate,
                    score,
                },
            )
        })
        .collect::<Vec<_>>();

    Ok(scored.into_iter().collect())
}
