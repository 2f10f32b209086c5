//! MME matcher main executable

pub mod admin;
pub mod common;
pub mod conf;
pub mod err;
pub mod geno;
pub mod matching;
pub mod model;
pub mod pheno;
pub mod server;
pub mod store;

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Matchmaker Exchange node",
    long_about = "This tool runs a GA4GH Matchmaker Exchange node and administers its database"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum Commands {
    /// Server related commands.
    Server(Server),
    /// Database administration commands.
    Admin(Admin),
}

/// Parsing of "server *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Server {
    /// The sub command to run
    #[command(subcommand)]
    command: ServerCommands,
}

/// Enum supporting the parsing of "server *" sub commands.
#[derive(Debug, Subcommand)]
enum ServerCommands {
    Run(server::Args),
}

/// Parsing of "admin *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Admin {
    /// The sub command to run
    #[command(subcommand)]
    command: AdminCommands,
}

/// Enum supporting the parsing of "admin *" sub commands.
#[derive(Debug, Subcommand)]
enum AdminCommands {
    AddNode(admin::AddNodeArgs),
    AddClient(admin::AddClientArgs),
    RemovePatient(admin::RemovePatientArgs),
    LoadPatients(admin::LoadPatientsArgs),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Server(server) => match &server.command {
                ServerCommands::Run(args) => server::run(&cli.common, args)?,
            },
            Commands::Admin(admin) => match &admin.command {
                AdminCommands::AddNode(args) => admin::clients::run_add_node(&cli.common, args)?,
                AdminCommands::AddClient(args) => {
                    admin::clients::run_add_client(&cli.common, args)?
                }
                AdminCommands::RemovePatient(args) => {
                    admin::patients::run_remove_patient(&cli.common, args)?
                }
                AdminCommands::LoadPatients(args) => {
                    admin::patients::run_load_patients(&cli.common, args)?
                }
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}

#[cfg(test)]
mod test {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[rstest::rstest]
    #[case(&["mme-matcher", "server", "run", "--path-config", "conf.toml"], true)]
    #[case(&["mme-matcher", "server", "run"], false)]
    #[case(&["mme-matcher", "admin", "remove-patient", "--path-db", "db", "--label", "x"], true)]
    #[case(&["mme-matcher", "admin", "remove-patient", "--path-db", "db"], false)]
    #[case(&["mme-matcher", "admin", "add-client", "--id", "c", "--token", "t"], false)]
    #[case(
        &["mme-matcher", "admin", "add-client", "--path-db", "db", "--path-config", "c.toml", "--id", "c", "--token", "t"],
        false
    )]
    fn parse_cli(#[case] argv: &[&str], #[case] ok: bool) {
        assert_eq!(Cli::try_parse_from(argv).is_ok(), ok);
    }
}
