//! Phenotype ontology, disease annotations, information content and phenotype matching.

use std::{path::Path, time::Instant};

use thousands::Separable;
use tracing::info;

pub mod algos;
pub mod diseases;
pub mod ic;
pub mod matcher;
pub mod ontology;

/// Read-only phenotype context, loaded once at startup and shared by all matching calls.
#[derive(Debug, Clone)]
pub struct Context {
    pub ontology: ontology::Ontology,
    pub diseases: diseases::Diseases,
    pub ic: ic::InformationContent,
}

impl Context {
    /// Load ontology and disease annotations and compute the information content.
    ///
    /// Fails if the information content is not monotone along the ontology edges.
    pub fn load<P, Q>(path_hpo_obo: P, path_phenotype_hpoa: Q) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        info!("Loading ontology from {:?}...", path_hpo_obo.as_ref());
        let before_loading = Instant::now();
        let ontology = ontology::Ontology::load(path_hpo_obo)?;
        info!(
            "...done loading {} terms in {:?}",
            ontology.len().separate_with_commas(),
            before_loading.elapsed()
        );

        info!(
            "Loading disease annotations from {:?}...",
            path_phenotype_hpoa.as_ref()
        );
        let before_loading = Instant::now();
        let diseases = diseases::Diseases::load(path_phenotype_hpoa)?;
        info!(
            "...done loading {} diseases ({} cross-references) in {:?}",
            diseases.len().separate_with_commas(),
            diseases.num_aliases().separate_with_commas(),
            before_loading.elapsed()
        );

        Self::new(ontology, diseases)
    }

    /// Build the context from loaded ontology and disease annotations.
    pub fn new(
        ontology: ontology::Ontology,
        diseases: diseases::Diseases,
    ) -> Result<Self, anyhow::Error> {
        info!("Computing information content...");
        let before_ic = Instant::now();
        let ic = ic::InformationContent::new(&ontology, &diseases)?;
        info!(
            "...done computing information content for {}/{} terms (raw mass {:.2}) in {:?}",
            ic.len().separate_with_commas(),
            ontology.len().separate_with_commas(),
            ic.total_raw_mass(),
            before_ic.elapsed()
        );

        Ok(Self {
            ontology,
            diseases,
            ic,
        })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::Context;

    /// Load the context from the test fixtures.
    pub fn context() -> Result<Context, anyhow::Error> {
        Context::load("tests/data/hpo/hp.obo", "tests/data/hpo/phenotype.hpoa")
    }

    #[tracing_test::traced_test]
    #[test]
    fn load_context() -> Result<(), anyhow::Error> {
        let ctx = context()?;

        assert_eq!(ctx.ontology.len(), 18);
        assert_eq!(ctx.diseases.len(), 5);
        assert_eq!(ctx.ic.len(), 17);
        assert!(logs_contain("skipping term"));

        Ok(())
    }

    #[test]
    fn load_missing_file() {
        assert!(Context::load("tests/data/hpo/missing.obo", "tests/data/hpo/phenotype.hpoa").is_err());
    }
}
