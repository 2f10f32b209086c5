//! Code supporting the `server run` sub command.

use std::time::Instant;

use actix_web::web::Data;
use clap::Parser;
use thousands::Separable;
use tracing::info;

use crate::{
    common::trace_rss_now,
    conf::Conf,
    geno::reference::{EnsemblClient, GenomicReference, NoReference, NormalizeOptions},
    matching::federation::{HttpPeerClient, PeerClient},
    pheno,
    store::{self, PatientFilter, Store},
};

pub mod actix_server;

/// Data to keep in the web server.
pub struct WebServerData {
    pub conf: Conf,
    pub ctx: pheno::Context,
    pub store: Box<dyn Store>,
    pub reference: Box<dyn GenomicReference>,
    pub peers: Box<dyn PeerClient>,
}

impl WebServerData {
    /// Normalizations applied to submitted patients.
    pub fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            resolve_genes: self.conf.resolve_genes,
            liftover: self.conf.liftover,
        }
    }
}

/// Command line arguments for `server run` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run MME node server", long_about = None)]
pub struct Args {
    /// Path to the configuration TOML file.
    #[arg(long, required = true)]
    pub path_config: String,
    /// IP to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub listen_host: String,
    /// Port to listen on.
    #[arg(long, default_value_t = 9020)]
    pub listen_port: u16,
}

/// Main entry point for `server run` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    if let Some(level) = args_common.verbose.log_level() {
        match level {
            log::Level::Trace | log::Level::Debug => {
                std::env::set_var("RUST_LOG", "debug");
                env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
            }
            _ => (),
        }
    }

    info!("Loading configuration...");
    let conf = Conf::load(&args.path_config)?;
    info!("conf = {:?}", &conf);

    let ctx = pheno::Context::load(&conf.path_hpo_obo, &conf.path_phenotype_hpoa)?;

    let before_opening = Instant::now();
    let store = store::open(conf.path_db.as_deref())?;
    info!(
        "...store holds {} patients and {} peer nodes ({:?})",
        store
            .find_patients(&PatientFilter::All)?
            .len()
            .separate_with_commas(),
        store.nodes()?.len(),
        before_opening.elapsed()
    );

    let reference: Box<dyn GenomicReference> = if conf.resolve_genes || conf.liftover {
        Box::new(EnsemblClient::new(
            &conf.ensembl_rest_url,
            &conf.ensembl_rest_url_37,
            conf.peer_timeout(),
        )?)
    } else {
        Box::new(NoReference)
    };
    let peers = Box::new(HttpPeerClient::new(conf.peer_timeout())?);

    let data = Data::new(WebServerData {
        conf,
        ctx,
        store,
        reference,
        peers,
    });

    trace_rss_now();

    info!(
        "Launching server on http://{}:{} ...",
        &args.listen_host, args.listen_port
    );
    actix_server::main(args, data)?;

    info!("All done. Have a nice day!");
    Ok(())
}
