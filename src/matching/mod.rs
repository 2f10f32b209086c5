//! Match orchestration: internal matching against the local store, federation with peer
//! nodes and node metrics.

use indexmap::IndexMap;
use tracing::info;

use crate::{
    conf::Conf,
    geno,
    model::{
        records::{MatchRecord, MatchResult, MatchType, NodeRef, ResultGroup, Score},
        Patient,
    },
    pheno,
    store::Store,
};

pub mod federation;
pub mod metrics;

/// Combine the phenotype and genotype matches into ranked results.
///
/// Returns the results after thresholding and truncation together with the number of
/// results before truncation.
fn rank(
    pheno_matches: IndexMap<String, pheno::matcher::PhenoMatch>,
    geno_matches: IndexMap<String, geno::matcher::GenoMatch>,
    score_threshold: f64,
    max_results: usize,
) -> (Vec<MatchResult>, usize) {
    let mut combined: IndexMap<String, MatchResult> = IndexMap::new();
    for (id, pheno_match) in pheno_matches {
        combined.insert(
            id,
            MatchResult {
                score: Score::new(pheno_match.score, 0.0, pheno_match.score),
                patient: pheno_match.patient,
            },
        );
    }
    for (id, geno_match) in geno_matches {
        combined
            .entry(id)
            .and_modify(|result| result.score.genotype = geno_match.score)
            .or_insert_with(|| MatchResult {
                score: Score::new(0.0, geno_match.score, 0.0),
                patient: geno_match.patient.clone(),
            });
    }

    let mut results = combined
        .into_values()
        .map(|mut result| {
            result.score.combined =
                (result.score.genotype + result.score.phenotype).clamp(0.0, 1.0);
            result.patient = result.patient.to_mme();
            result
        })
        .filter(|result| result.score.combined >= score_threshold)
        .collect::<Vec<_>>();
    // stable, equal scores keep the order in which the candidates were found
    results.sort_by(|lhs, rhs| rhs.score.combined.total_cmp(&lhs.score.combined));

    let count = results.len();
    results.truncate(max_results);
    (results, count)
}

/// Match the query patient against the local patients and persist the match record.
///
/// The record is stored even if there are no results.
pub fn internal_match(
    ctx: &pheno::Context,
    store: &dyn Store,
    conf: &Conf,
    query: &Patient,
) -> Result<MatchRecord, anyhow::Error> {
    info!("Matching patient {} against local patients...", &query.id);
    let before_matching = std::time::Instant::now();

    let (pheno_matches, geno_matches) = rayon::join(
        || pheno::matcher::matches(ctx, store, conf.max_pheno_score, query),
        || geno::matcher::matches(store, conf.max_gt_score, query),
    );
    let (results, count) = rank(
        pheno_matches?,
        geno_matches?,
        conf.score_threshold,
        conf.max_results,
    );

    let mut record = MatchRecord::new(
        MatchType::Internal,
        query.id.clone(),
        Some(query.to_mme()),
        vec![ResultGroup {
            node: NodeRef::new(conf.node_id.clone(), conf.node_label.clone()),
            patients: results,
        }],
        vec![],
    );
    record.has_matches = count > 0;
    store.insert_match(&record)?;

    info!(
        "...done matching in {:?}, returning {} of {} results",
        before_matching.elapsed(),
        record.result_patients().count(),
        count
    );
    Ok(record)
}
