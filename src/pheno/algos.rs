/// Phenotype-related algorithms.

/// Similarity computation using the simGIC method.
pub mod simgic {
    use std::collections::HashSet;

    use crate::pheno::{ic::InformationContent, ontology::TermIdx};

    /// Compute the simGIC score of two ancestor closures.
    ///
    /// The score is the information content of the shared ancestors relative to the one of all
    /// ancestors and is in `[0, 1]`; it is zero if neither side has informative terms.
    pub fn score(q: &HashSet<TermIdx>, d: &HashSet<TermIdx>, ic: &InformationContent) -> f64 {
        let ic_union = ic.information_content(q.union(d));
        if ic_union <= 0.0 {
            return 0.0;
        }
        let ic_common = ic.information_content(q.intersection(d));

        (ic_common / ic_union).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod test {
    use float_cmp::approx_eq;

    use super::simgic;
    use crate::pheno::test::context;

    #[rstest::rstest]
    #[case(&["HP:0001263"], &["HP:0001263"], 1.0)]
    #[case(&["HP:0001263", "HP:0000252"], &["HP:0001263"], 0.3642633812453593)]
    #[case(&["HP:0001263", "HP:0000252"], &["HP:0000505"], 0.018440455806459994)]
    #[case(&["HP:0000252"], &["HP:0000256"], 0.500857961493833)]
    #[case(&["HP:0001263"], &["HP:0000006"], 0.0)]
    #[case(&["HP:1234567"], &["HP:0001263"], 0.0)]
    #[case(&[], &[], 0.0)]
    fn simgic_score(
        #[case] q: &[&str],
        #[case] d: &[&str],
        #[case] expected: f64,
    ) -> Result<(), anyhow::Error> {
        let ctx = context()?;
        let q = ctx.ontology.ancestors_of_all(q.iter().copied());
        let d = ctx.ontology.ancestors_of_all(d.iter().copied());

        let score = simgic::score(&q, &d, &ctx.ic);

        assert!(
            approx_eq!(f64, score, expected, epsilon = 1e-6),
            "score = {}",
            score
        );
        // The score is symmetric.
        assert!(approx_eq!(
            f64,
            score,
            simgic::score(&d, &q, &ctx.ic),
            epsilon = 1e-12
        ));

        Ok(())
    }
}
