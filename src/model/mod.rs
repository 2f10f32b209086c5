//! Matchmaker Exchange entities.
//!
//! The patient types follow the MME API JSON layout (camel case keys) and are used both on the
//! wire and as the documents of the `patients` collection.  Optional list fields are kept as
//! `Option<Vec<_>>` since an absent list and an empty list mean different things to the
//! matching code.

use serde::{Deserialize, Serialize};

use crate::common::{canonical_chrom, GenomeRelease};

pub mod records;
pub mod validate;

/// The MIME type of the MME API.
pub const MME_MIME_TYPE: &str = "application/vnd.ga4gh.matchmaker.v1.0+json";

/// The accepted MIME types advertised in the heartbeat.
pub const MME_ACCEPTED: &[&str] = &[
    "application/vnd.ga4gh.matchmaker.v1.0+json",
    "application/vnd.ga4gh.matchmaker.v1.1+json",
];

/// Contact information of a patient submitter.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Contact {
    /// Name of the contact person.
    pub name: String,
    /// Either a `mailto:` URI or an http(s) URL.
    pub href: String,
    /// Optional institution name.
    pub institution: Option<String>,
}

/// A phenotypic feature, identified by an ontology term.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    /// Ontology term ID, e.g., `HP:0001263`.
    pub id: String,
    /// Optional term label.
    pub label: Option<String>,
    /// `"yes"` or `"no"`, defaults to `"yes"` when absent.
    pub observed: Option<String>,
    /// Optional age of onset.
    pub age_of_onset: Option<String>,
}

impl Feature {
    /// Whether the feature was observed in the patient.
    pub fn is_observed(&self) -> bool {
        !matches!(self.observed.as_deref(), Some("no"))
    }
}

/// A diagnosis code, e.g., `MIM:616007` or `ORPHA:1234`.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Disorder {
    pub id: String,
    pub label: Option<String>,
}

/// An ontology term reference, used for the genomic feature type.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct OntologyRef {
    pub id: String,
    pub label: Option<String>,
}

/// Gene of a genomic feature.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Gene {
    /// Gene identifier; an Ensembl gene ID after normalization, otherwise possibly an HGNC
    /// symbol or an Entrez ID.
    pub id: String,
    /// HGNC symbol of the gene, if known.
    pub symbol: Option<String>,
}

/// Kind of a gene identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneIdKind {
    Ensembl,
    Entrez,
    Symbol,
}

impl Gene {
    /// Classify the format of the gene identifier.
    pub fn id_kind(&self) -> GeneIdKind {
        if self.id.starts_with("ENSG") {
            GeneIdKind::Ensembl
        } else if !self.id.is_empty() && self.id.chars().all(|c| c.is_ascii_digit()) {
            GeneIdKind::Entrez
        } else {
            GeneIdKind::Symbol
        }
    }

    /// The HGNC symbol of the gene: the explicit symbol or the ID if it is a symbol.
    pub fn hgnc_symbol(&self) -> Option<&str> {
        match (&self.symbol, self.id_kind()) {
            (Some(symbol), _) if !symbol.is_empty() => Some(symbol.as_str()),
            (_, GeneIdKind::Symbol) if !self.id.is_empty() => Some(self.id.as_str()),
            _ => None,
        }
    }
}

/// A sequence variant.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    /// Assembly name, e.g., `GRCh37`.
    pub assembly: String,
    /// Chromosome name.
    pub reference_name: String,
    /// Start position.
    pub start: u64,
    /// End position.
    pub end: Option<u64>,
    /// Reference bases.
    pub reference_bases: Option<String>,
    /// Alternate bases.
    pub alternate_bases: Option<String>,
}

impl Variant {
    /// The genome release of the variant, if the assembly is known.
    pub fn release(&self) -> Option<GenomeRelease> {
        self.assembly.parse().ok()
    }

    /// Identity key of the variant with normalized assembly, chromosome and alleles.
    pub fn key(&self) -> String {
        let assembly = self
            .release()
            .map(|release| release.to_string())
            .unwrap_or_else(|| self.assembly.clone());
        let chrom = canonical_chrom(&self.reference_name).unwrap_or(&self.reference_name);
        format!(
            "{}-{}-{}-{}-{}",
            assembly,
            chrom,
            self.start,
            self.reference_bases
                .as_deref()
                .unwrap_or_default()
                .to_ascii_uppercase(),
            self.alternate_bases
                .as_deref()
                .unwrap_or_default()
                .to_ascii_uppercase(),
        )
    }

    /// Whether `self` and `other` describe the same variant on the same assembly.
    ///
    /// End positions are compared only if both variants have one.
    pub fn same_as(&self, other: &Variant) -> bool {
        let same_end = match (self.end, other.end) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => true,
        };
        same_end && self.key() == other.key()
    }
}

/// A genomic feature of a patient.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct GenomicFeature {
    pub gene: Option<Gene>,
    pub variant: Option<Variant>,
    pub zygosity: Option<u8>,
    #[serde(rename = "type")]
    pub feature_type: Option<OntologyRef>,
    /// The variant lifted over to the other genome release; filled on submission.
    pub liftover: Option<Variant>,
}

impl GenomicFeature {
    /// The variant and its cross-build equivalent, if any.
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.variant.iter().chain(self.liftover.iter())
    }

    /// The gene, if present with a non-empty ID.
    pub fn gene(&self) -> Option<&Gene> {
        self.gene.as_ref().filter(|gene| !gene.id.is_empty())
    }
}

/// An MME patient.
#[serde_with::skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub label: Option<String>,
    pub contact: Contact,
    pub species: Option<String>,
    pub sex: Option<String>,
    pub age_of_onset: Option<String>,
    pub inheritance_mode: Option<String>,
    pub disorders: Option<Vec<Disorder>>,
    pub features: Option<Vec<Feature>>,
    pub genomic_features: Option<Vec<GenomicFeature>>,
}

impl Patient {
    /// IDs of the observed phenotypic features.
    pub fn observed_term_ids(&self) -> Vec<&str> {
        self.features
            .iter()
            .flatten()
            .filter(|feature| feature.is_observed())
            .map(|feature| feature.id.as_str())
            .collect()
    }

    /// Whether the patient has at least one phenotypic feature.
    pub fn has_features(&self) -> bool {
        self.features
            .as_ref()
            .map(|features| !features.is_empty())
            .unwrap_or(false)
    }

    /// IDs of the diagnoses.
    pub fn disorder_ids(&self) -> Vec<&str> {
        self.disorders
            .iter()
            .flatten()
            .map(|disorder| disorder.id.as_str())
            .collect()
    }

    /// The genomic features, empty if absent.
    pub fn genomic_features(&self) -> &[GenomicFeature] {
        self.genomic_features.as_deref().unwrap_or_default()
    }

    /// Copy of the patient with all fields internal to this node removed.
    pub fn to_mme(&self) -> Patient {
        let mut result = self.clone();
        if let Some(genomic_features) = result.genomic_features.as_mut() {
            for genomic_feature in genomic_features.iter_mut() {
                genomic_feature.liftover = None;
            }
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Build a minimal patient for tests.
    pub fn patient(id: &str, terms: &[&str], genes: &[&str]) -> Patient {
        Patient {
            id: id.to_string(),
            label: Some(format!("label {id}")),
            contact: Contact {
                name: "Contact Person".to_string(),
                href: "mailto:contact@example.com".to_string(),
                institution: None,
            },
            features: if terms.is_empty() {
                None
            } else {
                Some(
                    terms
                        .iter()
                        .map(|term| Feature {
                            id: term.to_string(),
                            observed: Some("yes".to_string()),
                            ..Default::default()
                        })
                        .collect(),
                )
            },
            genomic_features: if genes.is_empty() {
                None
            } else {
                Some(
                    genes
                        .iter()
                        .map(|gene| GenomicFeature {
                            gene: Some(Gene {
                                id: gene.to_string(),
                                symbol: None,
                            }),
                            ..Default::default()
                        })
                        .collect(),
                )
            },
            ..Default::default()
        }
    }

    /// Build a variant for tests.
    pub fn variant(assembly: &str, chrom: &str, start: u64, ref_: &str, alt: &str) -> Variant {
        Variant {
            assembly: assembly.to_string(),
            reference_name: chrom.to_string(),
            start,
            end: Some(start + ref_.len() as u64 - 1),
            reference_bases: Some(ref_.to_string()),
            alternate_bases: Some(alt.to_string()),
        }
    }

    #[test]
    fn deserialize_mme_patient() -> Result<(), anyhow::Error> {
        let json = r#"{
            "id": "P0001",
            "label": "patient 1",
            "contact": {"name": "Jane Doe", "href": "mailto:jane@example.com"},
            "features": [
                {"id": "HP:0001263", "observed": "yes"},
                {"id": "HP:0000252", "observed": "no"}
            ],
            "genomicFeatures": [{
                "gene": {"id": "KARS"},
                "variant": {
                    "assembly": "GRCh37", "referenceName": "16", "start": 75661622,
                    "end": 75661622, "referenceBases": "C", "alternateBases": "T"
                },
                "zygosity": 1,
                "type": {"id": "SO:0001583", "label": "MISSENSE"}
            }]
        }"#;
        let patient: Patient = serde_json::from_str(json)?;

        assert_eq!(patient.id, "P0001");
        assert_eq!(patient.observed_term_ids(), vec!["HP:0001263"]);
        assert!(patient.has_features());
        assert_eq!(patient.disorders, None);
        assert_eq!(patient.disorder_ids(), Vec::<&str>::new());
        let genomic_feature = &patient.genomic_features()[0];
        assert_eq!(genomic_feature.gene().map(|g| g.id.as_str()), Some("KARS"));
        assert_eq!(
            genomic_feature.feature_type.as_ref().map(|t| t.id.as_str()),
            Some("SO:0001583")
        );
        assert_eq!(
            genomic_feature.variant.as_ref().map(|v| v.start),
            Some(75661622)
        );

        Ok(())
    }

    #[test]
    fn serialize_skips_absent_fields() -> Result<(), anyhow::Error> {
        let value = serde_json::to_value(patient("P1", &["HP:0001263"], &[]))?;

        assert_eq!(
            value,
            serde_json::json!({
                "id": "P1",
                "label": "label P1",
                "contact": {"name": "Contact Person", "href": "mailto:contact@example.com"},
                "features": [{"id": "HP:0001263", "observed": "yes"}]
            })
        );

        Ok(())
    }

    #[rstest::rstest]
    #[case("ENSG00000065427", None, GeneIdKind::Ensembl, None)]
    #[case("ENSG00000065427", Some("KARS"), GeneIdKind::Ensembl, Some("KARS"))]
    #[case("3735", None, GeneIdKind::Entrez, None)]
    #[case("KARS", None, GeneIdKind::Symbol, Some("KARS"))]
    fn gene_id_kind_and_symbol(
        #[case] id: &str,
        #[case] symbol: Option<&str>,
        #[case] kind: GeneIdKind,
        #[case] hgnc_symbol: Option<&str>,
    ) {
        let gene = Gene {
            id: id.to_string(),
            symbol: symbol.map(str::to_string),
        };
        assert_eq!(gene.id_kind(), kind);
        assert_eq!(gene.hgnc_symbol(), hgnc_symbol);
    }

    #[rstest::rstest]
    #[case(variant("GRCh37", "1", 100, "A", "T"), variant("GRCh37", "chr1", 100, "a", "t"), true)]
    #[case(variant("GRCh37", "1", 100, "A", "T"), variant("GRCh37.p13", "1", 100, "A", "T"), true)]
    #[case(variant("GRCh37", "1", 100, "A", "T"), variant("GRCh38", "1", 100, "A", "T"), false)]
    #[case(variant("GRCh37", "1", 100, "A", "T"), variant("GRCh37", "1", 101, "A", "T"), false)]
    #[case(variant("GRCh37", "1", 100, "A", "T"), variant("GRCh37", "1", 100, "A", "G"), false)]
    #[case(variant("GRCh37", "M", 100, "A", "T"), variant("GRCh37", "MT", 100, "A", "T"), true)]
    #[case(
        Variant { end: Some(5000), ..variant("GRCh37", "1", 100, "A", "<DEL>") },
        Variant { end: Some(9000), ..variant("GRCh37", "1", 100, "A", "<DEL>") },
        false
    )]
    #[case(
        Variant { end: Some(5000), ..variant("GRCh37", "1", 100, "A", "<DEL>") },
        Variant { end: None, ..variant("GRCh37", "1", 100, "A", "<DEL>") },
        true
    )]
    fn variant_same_as(#[case] lhs: Variant, #[case] rhs: Variant, #[case] expected: bool) {
        assert_eq!(lhs.same_as(&rhs), expected);
        assert_eq!(rhs.same_as(&lhs), expected);
    }

    #[test]
    fn to_mme_strips_liftover() {
        let mut p = patient("P1", &[], &["KARS"]);
        if let Some(genomic_features) = p.genomic_features.as_mut() {
            genomic_features[0].variant = Some(variant("GRCh37", "1", 100, "A", "T"));
            genomic_features[0].liftover = Some(variant("GRCh38", "1", 200, "A", "T"));
        }

        let mme = p.to_mme();

        assert_eq!(mme.genomic_features()[0].liftover, None);
        assert_eq!(mme.genomic_features()[0].variants().count(), 1);
        assert_eq!(p.genomic_features()[0].variants().count(), 2);
    }
}
