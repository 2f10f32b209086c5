//! Registration of peer nodes and clients.

use chrono::Utc;
use tracing::info;

use super::{AddClientArgs, AddNodeArgs};
use crate::model::records::{Client, PeerNode};

/// Main entry point for `admin add-node` sub command.
pub fn run_add_node(common_args: &crate::common::Args, args: &AddNodeArgs) -> Result<(), anyhow::Error> {
    info!("Starting `admin add-node`");
    info!("  common_args = {:?}", &common_args);
    info!("  args = {:?}", &args);

    let store = args.store.open()?;
    let outcome = store.upsert_node(&PeerNode {
        id: args.id.clone(),
        label: args.label.clone(),
        auth_token: args.token.clone(),
        matching_url: args.matching_url.clone(),
        accepted_content: args.accepted_content.clone(),
        contact: args.contact.clone(),
        created: Utc::now(),
    })?;
    info!("node {}: {}", &args.id, outcome);

    Ok(())
}

/// Main entry point for `admin add-client` sub command.
pub fn run_add_client(
    common_args: &crate::common::Args,
    args: &AddClientArgs,
) -> Result<(), anyhow::Error> {
    info!("Starting `admin add-client`");
    info!("  common_args = {:?}", &common_args);
    info!("  args = {:?}", &args);

    let store = args.store.open()?;
    if let Some(other) = store
        .client_by_token(&args.token)?
        .filter(|other| other.id != args.id)
    {
        anyhow::bail!("token is already used by client {}", &other.id);
    }
    let outcome = store.upsert_client(&Client {
        id: args.id.clone(),
        auth_token: args.token.clone(),
        base_url: args.url.clone(),
        contact: args.contact.clone(),
        created: Utc::now(),
    })?;
    info!("client {}: {}", &args.id, outcome);

    Ok(())
}
