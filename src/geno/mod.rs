//! Genotype matching and the genomic reference collaborator.

pub mod matcher;
pub mod reference;
