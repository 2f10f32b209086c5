//! Administration of the node's store from the command line.

use clap::Parser;

use crate::{
    conf::Conf,
    store::{rocks::RocksStore, Store},
};

pub mod clients;
pub mod patients;

/// Selection of the store to administer.
#[derive(clap::Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct StoreArgs {
    /// Path to the configuration TOML file of the node; its `path_db` is used.
    #[arg(long)]
    pub path_config: Option<String>,
    /// Path to the RocksDB directory.
    #[arg(long)]
    pub path_db: Option<String>,
}

impl StoreArgs {
    /// Open the selected store.
    pub fn open(&self) -> Result<Box<dyn Store>, anyhow::Error> {
        let path_db = match (self.path_db.as_ref(), self.path_config.as_ref()) {
            (Some(path_db), _) => path_db.clone(),
            (None, Some(path_config)) => match Conf::load(path_config)?.path_db {
                Some(path_db) => path_db,
                None => anyhow::bail!("configuration {} has no path_db", path_config),
            },
            (None, None) => anyhow::bail!("one of --path-config and --path-db is required"),
        };
        Ok(Box::new(RocksStore::open(path_db)?))
    }
}

/// Command line arguments for `admin add-node` sub command.
#[derive(Parser, Debug)]
#[command(about = "Register or update a peer node", long_about = None)]
pub struct AddNodeArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// ID of the node.
    #[arg(long)]
    pub id: String,
    /// Human-readable label of the node.
    #[arg(long)]
    pub label: String,
    /// Token sent to the node.
    #[arg(long)]
    pub token: String,
    /// URL of the `/match` endpoint of the node.
    #[arg(long)]
    pub matching_url: String,
    /// Content type accepted by the node.
    #[arg(long, default_value = crate::model::MME_MIME_TYPE)]
    pub accepted_content: String,
    /// Contact of the node's administrator.
    #[arg(long)]
    pub contact: Option<String>,
}

/// Command line arguments for `admin add-client` sub command.
#[derive(Parser, Debug)]
#[command(about = "Register or update a client", long_about = None)]
pub struct AddClientArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// ID of the client.
    #[arg(long)]
    pub id: String,
    /// Token the client authenticates with.
    #[arg(long)]
    pub token: String,
    /// Base URL of the client.
    #[arg(long)]
    pub url: Option<String>,
    /// Contact of the client's administrator.
    #[arg(long)]
    pub contact: Option<String>,
}

/// Command line arguments for `admin remove-patient` sub command.
#[derive(Parser, Debug)]
#[command(about = "Remove patients and the matches they triggered", long_about = None)]
pub struct RemovePatientArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// ID of the patient.
    #[arg(long, required_unless_present = "label")]
    pub id: Option<String>,
    /// Label of the patient.
    #[arg(long)]
    pub label: Option<String>,
}

/// Command line arguments for `admin load-patients` sub command.
#[derive(Parser, Debug)]
#[command(about = "Load MME patients from a JSON array file", long_about = None)]
pub struct LoadPatientsArgs {
    #[command(flatten)]
    pub store: StoreArgs,
    /// Path to the JSON file, may be gzip-compressed.
    #[arg(long, required = true)]
    pub path_input: String,
}
