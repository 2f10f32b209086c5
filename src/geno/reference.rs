//! Genomic reference collaborator for gene ID conversion and coordinate liftover.

use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    common::GenomeRelease,
    model::{GeneIdKind, Patient, Variant},
};

/// Default Ensembl REST API for GRCh38.
pub const ENSEMBL_REST_URL: &str = "https://rest.ensembl.org";
/// Default Ensembl REST API for GRCh37.
pub const ENSEMBL_REST_URL_37: &str = "https://grch37.rest.ensembl.org";

/// Gene ID conversion and liftover.
///
/// `Ok(None)` means the reference has no answer; errors are for failed requests.
#[async_trait::async_trait]
pub trait GenomicReference: Send + Sync {
    /// Ensembl gene ID of an HGNC symbol.
    async fn symbol_to_ensembl(&self, symbol: &str) -> Result<Option<String>, anyhow::Error>;
    /// HGNC symbol of an Ensembl gene ID.
    async fn ensembl_to_symbol(&self, ensembl_id: &str) -> Result<Option<String>, anyhow::Error>;
    /// HGNC symbol of an Entrez gene ID.
    async fn entrez_to_symbol(&self, entrez_id: &str) -> Result<Option<String>, anyhow::Error>;
    /// The variant on the other genome release.
    async fn liftover(&self, variant: &Variant) -> Result<Option<Variant>, anyhow::Error>;
}

/// Reference that knows nothing; used when conversion and liftover are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReference;

#[async_trait::async_trait]
impl GenomicReference for NoReference {
    async fn symbol_to_ensembl(&self, _symbol: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(None)
    }

    async fn ensembl_to_symbol(&self, _ensembl_id: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(None)
    }

    async fn entrez_to_symbol(&self, _entrez_id: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(None)
    }

    async fn liftover(&self, _variant: &Variant) -> Result<Option<Variant>, anyhow::Error> {
        Ok(None)
    }
}

/// Cross reference returned by the Ensembl `xrefs` endpoints.
#[derive(Debug, Clone, Deserialize)]
struct Xref {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_id: Option<String>,
}

/// Gene returned by the Ensembl `lookup/id` endpoint.
#[derive(Debug, Clone, Deserialize)]
struct Lookup {
    #[serde(default)]
    display_name: Option<String>,
}

/// Region returned by the Ensembl `map` endpoint.
#[derive(Debug, Clone, Deserialize)]
struct MappedRegion {
    assembly: String,
    seq_region_name: String,
    start: u64,
    end: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct Mapping {
    mapped: MappedRegion,
}

#[derive(Debug, Clone, Deserialize)]
struct Mappings {
    #[serde(default)]
    mappings: Vec<Mapping>,
}

/// Client for the Ensembl REST API.
#[derive(Debug, Clone)]
pub struct EnsemblClient {
    client: reqwest::Client,
    url_38: String,
    url_37: String,
}

impl EnsemblClient {
    /// Create a new client with the given base URLs and request timeout.
    pub fn new(
        url_38: &str,
        url_37: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("could not build HTTP client: {}", e))?;
        Ok(Self {
            client,
            url_38: url_38.trim_end_matches('/').to_string(),
            url_37: url_37.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL of the server for the given release.
    fn server(&self, release: GenomeRelease) -> &str {
        match release {
            GenomeRelease::Grch37 => &self.url_37,
            GenomeRelease::Grch38 => &self.url_38,
        }
    }

    fn symbol_url(&self, symbol: &str) -> String {
        format!(
            "{}/xrefs/symbol/homo_sapiens/{}?external_db=HGNC",
            self.url_38, symbol
        )
    }

    fn lookup_url(&self, ensembl_id: &str) -> String {
        format!("{}/lookup/id/{}", self.url_38, ensembl_id)
    }

    fn entrez_url(&self, entrez_id: &str) -> String {
        format!(
            "{}/xrefs/name/human/{}?external_db=EntrezGene",
            self.url_38, entrez_id
        )
    }

    fn liftover_url(&self, release: GenomeRelease, variant: &Variant) -> String {
        let chrom = crate::common::canonical_chrom(&variant.reference_name)
            .unwrap_or(&variant.reference_name);
        let end = variant.end.unwrap_or_else(|| {
            let len = variant
                .reference_bases
                .as_ref()
                .map(|bases| bases.len() as u64)
                .unwrap_or(1)
                .max(1);
            variant.start + len - 1
        });
        format!(
            "{}/map/human/{}/{}:{}..{}/{}?content-type=application/json",
            self.server(release),
            release,
            chrom,
            variant.start,
            end,
            release.other()
        )
    }

    /// Send a GET request and decode the JSON response.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, anyhow::Error> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("request to {} failed: {}", url, e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("request to {} failed: {}", url, e))?;
        response
            .json::<T>()
            .await
            .map_err(|e| anyhow::anyhow!("invalid response from {}: {}", url, e))
    }
}

#[async_trait::async_trait]
impl GenomicReference for EnsemblClient {
    async fn symbol_to_ensembl(&self, symbol: &str) -> Result<Option<String>, anyhow::Error> {
        let xrefs: Vec<Xref> = self.get_json(&self.symbol_url(symbol)).await?;
        Ok(xrefs
            .into_iter()
            .filter_map(|xref| xref.id)
            .find(|id| id.starts_with("ENSG")))
    }

    async fn ensembl_to_symbol(&self, ensembl_id: &str) -> Result<Option<String>, anyhow::Error> {
        let lookup: Lookup = self.get_json(&self.lookup_url(ensembl_id)).await?;
        Ok(lookup.display_name)
    }

    async fn entrez_to_symbol(&self, entrez_id: &str) -> Result<Option<String>, anyhow::Error> {
        let xrefs: Vec<Xref> = self.get_json(&self.entrez_url(entrez_id)).await?;
        Ok(xrefs.into_iter().find_map(|xref| xref.display_id))
    }

    async fn liftover(&self, variant: &Variant) -> Result<Option<Variant>, anyhow::Error> {
        let Some(release) = variant.release() else {
            return Ok(None);
        };
        let mappings: Mappings = self.get_json(&self.liftover_url(release, variant)).await?;
        Ok(mappings.mappings.into_iter().next().map(|mapping| Variant {
            assembly: mapping.mapped.assembly,
            reference_name: mapping.mapped.seq_region_name,
            start: mapping.mapped.start,
            end: Some(mapping.mapped.end),
            reference_bases: variant.reference_bases.clone(),
            alternate_bases: variant.alternate_bases.clone(),
        }))
    }
}

/// Lookup tables as genomic reference, e.g., for offline operation and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticReference {
    /// HGNC symbol to Ensembl gene ID.
    pub symbol_to_ensembl: HashMap<String, String>,
    /// Entrez gene ID to HGNC symbol.
    pub entrez_to_symbol: HashMap<String, String>,
    /// Variant key to lifted variant.
    pub liftover: HashMap<String, Variant>,
}

#[async_trait::async_trait]
impl GenomicReference for StaticReference {
    async fn symbol_to_ensembl(&self, symbol: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self.symbol_to_ensembl.get(symbol).cloned())
    }

    async fn ensembl_to_symbol(&self, ensembl_id: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self
            .symbol_to_ensembl
            .iter()
            .find(|(_, id)| id.as_str() == ensembl_id)
            .map(|(symbol, _)| symbol.clone()))
    }

    async fn entrez_to_symbol(&self, entrez_id: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self.entrez_to_symbol.get(entrez_id).cloned())
    }

    async fn liftover(&self, variant: &Variant) -> Result<Option<Variant>, anyhow::Error> {
        Ok(self.liftover.get(&variant.key()).cloned())
    }
}

/// Which normalizations to apply to submitted patients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalizeOptions {
    /// Convert gene identifiers to Ensembl gene IDs.
    pub resolve_genes: bool,
    /// Attach the variant on the other genome release.
    pub liftover: bool,
}

/// Normalize the genomic features of a submitted patient.
///
/// Failures of the reference leave the affected feature unchanged.
pub async fn normalize_patient(
    reference: &dyn GenomicReference,
    patient: &mut Patient,
    options: NormalizeOptions,
) {
    let Some(genomic_features) = patient.genomic_features.as_mut() else {
        return;
    };
    for genomic_feature in genomic_features.iter_mut() {
        if options.resolve_genes {
            if let Some(gene) = genomic_feature.gene.as_mut() {
                if let Err(e) = resolve_gene(reference, gene).await {
                    tracing::warn!("could not convert gene {}: {}", &gene.id, e);
                }
            }
        }
        if options.liftover {
            if let Some(variant) = genomic_feature.variant.as_ref() {
                match reference.liftover(variant).await {
                    Ok(lifted) => genomic_feature.liftover = lifted,
                    Err(e) => tracing::warn!("could not lift over {}: {}", variant.key(), e),
                }
            }
        }
    }
}

/// Convert the gene ID to an Ensembl gene ID, keeping the HGNC symbol.
async fn resolve_gene(
    reference: &dyn GenomicReference,
    gene: &mut crate::model::Gene,
) -> Result<(), anyhow::Error> {
    match gene.id_kind() {
        GeneIdKind::Ensembl => {
            if gene.symbol.is_none() {
                gene.symbol = reference.ensembl_to_symbol(&gene.id).await?;
            }
        }
        GeneIdKind::Entrez => {
            if let Some(symbol) = reference.entrez_to_symbol(&gene.id).await? {
                if let Some(ensembl_id) = reference.symbol_to_ensembl(&symbol).await? {
                    gene.id = ensembl_id;
                }
                gene.symbol = Some(symbol);
            }
        }
        GeneIdKind::Symbol => {
            if let Some(ensembl_id) = reference.symbol_to_ensembl(&gene.id).await? {
                let symbol = std::mem::replace(&mut gene.id, ensembl_id);
                gene.symbol.get_or_insert(symbol);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::test::{patient, variant};

    pub fn static_reference() -> StaticReference {
        let mut result = StaticReference::default();
        result
            .symbol_to_ensembl
            .insert("KARS".into(), "ENSG00000065427".into());
        result.entrez_to_symbol.insert("3735".into(), "KARS".into());
        result.liftover.insert(
            variant("GRCh37", "16", 75661622, "C", "T").key(),
            variant("GRCh38", "16", 75627724, "C", "T"),
        );
        result
    }

    #[test]
    fn ensembl_urls() -> Result<(), anyhow::Error> {
        let client = EnsemblClient::new(
            "https://rest.ensembl.org/",
            ENSEMBL_REST_URL_37,
            std::time::Duration::from_secs(1),
        )?;

        assert_eq!(
            client.symbol_url("KARS"),
            "https://rest.ensembl.org/xrefs/symbol/homo_sapiens/KARS?external_db=HGNC"
        );
        assert_eq!(
            client.lookup_url("ENSG00000065427"),
            "https://rest.ensembl.org/lookup/id/ENSG00000065427"
        );
        assert_eq!(
            client.entrez_url("3735"),
            "https://rest.ensembl.org/xrefs/name/human/3735?external_db=EntrezGene"
        );
        let mut v = variant("GRCh37", "chr16", 75661622, "CA", "T");
        v.end = None;
        assert_eq!(
            client.liftover_url(GenomeRelease::Grch37, &v),
            "https://grch37.rest.ensembl.org/map/human/GRCh37/16:75661622..75661623/GRCh38\
             ?content-type=application/json"
        );

        Ok(())
    }

    #[test]
    fn decode_mappings() -> Result<(), anyhow::Error> {
        let json = r#"{"mappings": [{
            "original": {"assembly": "GRCh37", "seq_region_name": "16", "start": 1, "end": 1},
            "mapped": {"assembly": "GRCh38", "seq_region_name": "16", "start": 75627724,
                       "end": 75627724, "strand": 1, "coord_system": "chromosome"}
        }]}"#;
        let mappings: Mappings = serde_json::from_str(json)?;

        assert_eq!(mappings.mappings.len(), 1);
        assert_eq!(mappings.mappings[0].mapped.start, 75627724);

        Ok(())
    }

    #[rstest::rstest]
    #[case("KARS", None, "ENSG00000065427", Some("KARS"))]
    #[case("3735", None, "ENSG00000065427", Some("KARS"))]
    #[case("ENSG00000065427", None, "ENSG00000065427", Some("KARS"))]
    #[case("ENSG00000065427", Some("LYSRS"), "ENSG00000065427", Some("LYSRS"))]
    #[case("UNKNOWN1", None, "UNKNOWN1", None)]
    #[tokio::test]
    async fn normalize_genes(
        #[case] id: &str,
        #[case] symbol: Option<&str>,
        #[case] expected_id: &str,
        #[case] expected_symbol: Option<&str>,
    ) {
        let mut p = patient("P1", &[], &[id]);
        if let Some(genomic_features) = p.genomic_features.as_mut() {
            if let Some(gene) = genomic_features[0].gene.as_mut() {
                gene.symbol = symbol.map(str::to_string);
            }
        }
        let options = NormalizeOptions {
            resolve_genes: true,
            liftover: false,
        };

        normalize_patient(&static_reference(), &mut p, options).await;

        let gene = p.genomic_features()[0].gene().cloned().expect("has gene");
        assert_eq!(gene.id, expected_id);
        assert_eq!(gene.symbol.as_deref(), expected_symbol);
    }

    #[tokio::test]
    async fn normalize_attaches_liftover() {
        let mut p = patient("P1", &[], &["KARS"]);
        if let Some(genomic_features) = p.genomic_features.as_mut() {
            genomic_features[0].variant = Some(variant("GRCh37", "16", 75661622, "C", "T"));
        }
        let options = NormalizeOptions {
            resolve_genes: false,
            liftover: true,
        };

        normalize_patient(&static_reference(), &mut p, options).await;

        assert_eq!(
            p.genomic_features()[0].liftover,
            Some(variant("GRCh38", "16", 75627724, "C", "T"))
        );
        assert_eq!(p.genomic_features()[0].gene().map(|g| g.id.as_str()), Some("KARS"));
    }

    #[tokio::test]
    async fn no_reference_leaves_patient_unchanged() {
        let mut p = patient("P1", &[], &["KARS"]);
        let before = p.clone();
        let options = NormalizeOptions {
            resolve_genes: true,
            liftover: true,
        };

        normalize_patient(&NoReference, &mut p, options).await;

        assert_eq!(p, before);
    }
}
