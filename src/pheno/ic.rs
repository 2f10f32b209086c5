//! Information content of the ontology terms derived from disease annotations.

use super::{
    diseases::Diseases,
    ontology::{Ontology, TermIdx},
};

/// Lower bound of probabilities to avoid `log(0)`.
pub const EPS: f64 = 1e-9;

/// Clamp probability to `[EPS, 1 - EPS]`.
fn bound(p: f64) -> f64 {
    p.clamp(EPS, 1.0 - EPS)
}

/// Error type for building the information content table.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(
        "information content of {term} ({ic}) is below the one of its parent {parent} ({parent_ic})"
    )]
    DataIntegrity {
        term: String,
        ic: f64,
        parent: String,
        parent_ic: f64,
    },
}

/// Information content values of one term.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TermIc {
    /// Probability mass of the term's descendant closure.
    pub prior_mass: f64,
    /// Information content `-ln(prior_mass)`.
    pub ic: f64,
    /// Information content gained over the most informative parent.
    pub link_strength: f64,
}

/// The information content table, indexed by term.
#[derive(Debug, Clone, Default)]
pub struct InformationContent {
    terms: Vec<Option<TermIc>>,
    total_raw_mass: f64,
}

impl InformationContent {
    /// Build the table from the ontology and disease annotations.
    ///
    /// Annotations with a frequency are weighted by it, those without count as one.
    pub fn new(ontology: &Ontology, diseases: &Diseases) -> Result<Self, Error> {
        let mut raw_mass = vec![None::<f64>; ontology.len()];
        for disease in diseases.iter() {
            for (term_id, freq) in &disease.phenotype_freqs {
                if let Some(idx) = ontology.lookup(term_id) {
                    *raw_mass[idx.get()].get_or_insert(0.0) += freq.unwrap_or(1.0);
                }
            }
        }
        let total_raw_mass = raw_mass.iter().flatten().sum::<f64>();

        let mut prior_mass = vec![0.0; ontology.len()];
        if total_raw_mass > 0.0 {
            for idx in ontology.iter() {
                let Some(raw) = raw_mass[idx.get()] else {
                    continue;
                };
                if !ontology.is_rooted(idx) {
                    continue;
                }
                let freq = bound(raw / total_raw_mass);
                for ancestor in ontology.ancestors(idx) {
                    prior_mass[ancestor.get()] += freq;
                }
            }
        }

        let ics = prior_mass
            .iter()
            .map(|mass| (*mass > EPS).then(|| -bound(*mass).ln()))
            .collect::<Vec<_>>();
        let terms = ontology
            .iter()
            .map(|idx| {
                let ic = ics[idx.get()]?;
                let max_parent_ic = ontology
                    .term(idx)
                    .parents
                    .iter()
                    .filter_map(|parent| ics[parent.get()])
                    .fold(None, |acc: Option<f64>, parent_ic| {
                        Some(acc.map_or(parent_ic, |acc| acc.max(parent_ic)))
                    });
                Some(TermIc {
                    prior_mass: bound(prior_mass[idx.get()]),
                    ic,
                    link_strength: max_parent_ic
                        .map(|parent_ic| (ic - parent_ic).max(0.0))
                        .unwrap_or(0.0),
                })
            })
            .collect();

        let result = Self {
            terms,
            total_raw_mass,
        };
        result.check_monotonicity(ontology)?;
        Ok(result)
    }

    /// Check that no term is less informative than any of its parents.
    fn check_monotonicity(&self, ontology: &Ontology) -> Result<(), Error> {
        for idx in ontology.iter() {
            let Some(ic) = self.ic(idx) else {
                continue;
            };
            for parent in &ontology.term(idx).parents {
                let parent_ic = self.ic(*parent).unwrap_or(0.0);
                if ic < parent_ic - EPS {
                    return Err(Error::DataIntegrity {
                        term: ontology.term(idx).id.clone(),
                        ic,
                        parent: ontology.term(*parent).id.clone(),
                        parent_ic,
                    });
                }
            }
        }
        Ok(())
    }

    /// Values of the given term, if it has an information content.
    pub fn get(&self, idx: TermIdx) -> Option<&TermIc> {
        self.terms.get(idx.get()).and_then(Option::as_ref)
    }

    /// Information content of the given term.
    pub fn ic(&self, idx: TermIdx) -> Option<f64> {
        self.get(idx).map(|term_ic| term_ic.ic)
    }

    /// Sum of the information content of the given terms; terms without one contribute zero.
    pub fn information_content<'a, I>(&self, terms: I) -> f64
    where
        I: IntoIterator<Item = &'a TermIdx>,
    {
        terms
            .into_iter()
            .filter_map(|idx| self.ic(*idx))
            .sum()
    }

    /// Number of terms with information content.
    pub fn len(&self) -> usize {
        self.terms.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the annotation weights before normalization.
    pub fn total_raw_mass(&self) -> f64 {
        self.total_raw_mass
    }
}
