//! Configuration of the node, read from a TOML file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::geno::reference::{ENSEMBL_REST_URL, ENSEMBL_REST_URL_37};

/// Default disclaimer returned with heartbeat, metrics and match responses.
pub const DEFAULT_DISCLAIMER: &str = "This software is provided as is and no warranty is given \
    about the correctness of the matching results. Data obtained from this node is for research \
    use only and should not be used for clinical decisions.";

fn default_node_id() -> String {
    "mme-matcher".to_string()
}

fn default_node_label() -> String {
    "MME matcher node".to_string()
}

fn default_disclaimer() -> String {
    DEFAULT_DISCLAIMER.to_string()
}

fn default_max_score() -> f64 {
    0.5
}

fn default_max_results() -> usize {
    5
}

fn default_peer_timeout_secs() -> u64 {
    20
}

fn default_max_peer_concurrency() -> usize {
    8
}

fn default_ensembl_rest_url() -> String {
    ENSEMBL_REST_URL.to_string()
}

fn default_ensembl_rest_url_37() -> String {
    ENSEMBL_REST_URL_37.to_string()
}

fn default_true() -> bool {
    true
}

/// Node configuration.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Conf {
    /// ID of this node, used in result groups.
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Label of this node, used in result groups.
    #[serde(default = "default_node_label")]
    pub node_label: String,
    /// Whether this is a production instance (reported by the heartbeat).
    #[serde(default)]
    pub production: bool,
    /// Disclaimer text.
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,

    /// Maximal genotype score; together with `max_pheno_score` must sum to 1.
    #[serde(default = "default_max_score")]
    pub max_gt_score: f64,
    /// Maximal phenotype score.
    #[serde(default = "default_max_score")]
    pub max_pheno_score: f64,
    /// Maximal number of results returned by internal matching.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Minimal combined score of returned results.
    #[serde(default)]
    pub score_threshold: f64,

    /// Path to the phenotype ontology OBO file.
    pub path_hpo_obo: String,
    /// Path to the disease annotation file.
    pub path_phenotype_hpoa: String,
    /// Path to the RocksDB directory; an in-memory store is used if absent.
    #[serde(default)]
    pub path_db: Option<String>,

    /// Timeout of requests to peers and the genomic reference.
    #[serde(default = "default_peer_timeout_secs")]
    pub peer_timeout_secs: u64,
    /// Maximal number of concurrent requests to peers.
    #[serde(default = "default_max_peer_concurrency")]
    pub max_peer_concurrency: usize,

    /// Ensembl REST API for GRCh38.
    #[serde(default = "default_ensembl_rest_url")]
    pub ensembl_rest_url: String,
    /// Ensembl REST API for GRCh37.
    #[serde(default = "default_ensembl_rest_url_37")]
    pub ensembl_rest_url_37: String,
    /// Convert gene IDs of submitted patients to Ensembl gene IDs.
    #[serde(default = "default_true")]
    pub resolve_genes: bool,
    /// Lift over variants of submitted patients to the other genome release.
    #[serde(default = "default_true")]
    pub liftover: bool,
}

impl Conf {
    /// Load and validate the configuration.
    ///
    /// Relative resource paths are interpreted relative to the configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let toml_str = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not read configuration {:?}: {}", path.as_ref(), e)
        })?;
        let mut conf: Conf = toml::from_str(&toml_str)?;
        if let Some(base) = path.as_ref().parent() {
            let resolve = |p: &str| {
                if Path::new(p).is_absolute() {
                    p.to_string()
                } else {
                    base.join(p).to_string_lossy().to_string()
                }
            };
            conf.path_hpo_obo = resolve(&conf.path_hpo_obo);
            conf.path_phenotype_hpoa = resolve(&conf.path_phenotype_hpoa);
            conf.path_db = conf.path_db.as_deref().map(resolve);
        }
        conf.validate()?;
        Ok(conf)
    }

    /// Check the invariants of the configuration.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_gt_score < 0.0 || self.max_pheno_score < 0.0 {
            anyhow::bail!("max_gt_score and max_pheno_score must not be negative");
        }
        if (self.max_gt_score + self.max_pheno_score - 1.0).abs() > 1e-6 {
            anyhow::bail!(
                "max_gt_score ({}) and max_pheno_score ({}) must sum to 1",
                self.max_gt_score,
                self.max_pheno_score
            );
        }
        if self.max_results < 1 {
            anyhow::bail!("max_results must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            anyhow::bail!(
                "score_threshold ({}) must be in [0, 1]",
                self.score_threshold
            );
        }
        if self.peer_timeout_secs == 0 {
            anyhow::bail!("peer_timeout_secs must be positive");
        }
        if self.max_peer_concurrency == 0 {
            anyhow::bail!("max_peer_concurrency must be positive");
        }
        Ok(())
    }

    /// Timeout of outbound requests.
    pub fn peer_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.peer_timeout_secs)
    }
}
