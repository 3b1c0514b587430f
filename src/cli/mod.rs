use anyhow::Result;
use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

// CLI Commands (cmd_ prefix)
mod cmd_check_versions;
mod cmd_fetch;
mod cmd_ingest;
mod cmd_ls;
mod cmd_next_id;
mod cmd_purge;
mod cmd_recover;
mod cmd_resolve;
mod cmd_stage;
mod cmd_sync;

// Helper modules (no cmd_ prefix)
mod logger;
mod progress;
mod utils;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Format custom help template with grouped commands
fn format_help_template() -> &'static str {
    concat!(
        "{about-with-newline}\n\n",
        "{usage-heading}\n  {usage}\n\n",
        "Options:\n{options}\n\n",
        "Records:\n",
        "  ingest          Load incoming record versions\n",
        "  resolve         Collapse versions to one active record per tender\n",
        "  check-versions  Recover missing ids and repair obsolete chains\n",
        "  next-id         Print the next free id of a partition\n",
        "\n",
        "Documents:\n",
        "  fetch           Download the documents linked by records\n",
        "  ls              List stored documents\n",
        "  stage           Copy a Swift folder to local disk\n",
        "\n",
        "Maintenance:\n",
        "  purge           Move documents of obsolete records to backup\n",
        "  recover         Restore purged documents from backup\n",
        "  sync            Reconcile two document stores\n",
        "\n",
        "See 'tenderlake <COMMAND> --help' for more information on a specific command.\n"
    )
}

#[derive(Parser)]
#[command(bin_name = "tenderlake")]
#[command(version = VERSION)]
#[command(about = concat!("tenderlake v", env!("CARGO_PKG_VERSION"), " - tender record versions and documents"))]
#[command(long_about = concat!(
    "tenderlake v", env!("CARGO_PKG_VERSION"), " - tender record versions and documents\n\n",
    "Keeps one active record per public tender, archives the documents\n",
    "each record links to, and maintains the document stores: disk,\n",
    "content-addressed blobs or OpenStack Swift."
))]
#[command(author)]
#[command(propagate_version = true)]
#[command(help_template = format_help_template())]
pub struct Cli {
    /// Configuration file (defaults apply when tenderlake.yml is absent)
    #[arg(short = 'c', long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Ingest(cmd_ingest::IngestCommand),
    Resolve(cmd_resolve::ResolveCommand),
    CheckVersions(cmd_check_versions::CheckVersionsCommand),
    NextId(cmd_next_id::NextIdCommand),
    Fetch(cmd_fetch::FetchCommand),
    Ls(cmd_ls::LsCommand),
    Stage(cmd_stage::StageCommand),
    Purge(cmd_purge::PurgeCommand),
    Recover(cmd_recover::RecoverCommand),
    Sync(cmd_sync::SyncCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger based on verbosity flags
    logger::init_logger(cli.verbose, cli.quiet);

    let config = utils::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest(cmd) => cmd_ingest::run(cmd, &config)?,
        Commands::Resolve(cmd) => cmd_resolve::run(cmd, &config)?,
        Commands::CheckVersions(cmd) => cmd_check_versions::run(cmd, &config)?,
        Commands::NextId(cmd) => cmd_next_id::run(cmd, &config)?,
        Commands::Fetch(cmd) => cmd_fetch::run(cmd, &config, cli.quiet)?,
        Commands::Ls(cmd) => cmd_ls::run(cmd, &config)?,
        Commands::Stage(cmd) => cmd_stage::run(cmd, &config)?,
        Commands::Purge(cmd) => cmd_purge::run(cmd, &config)?,
        Commands::Recover(cmd) => cmd_recover::run(cmd, &config)?,
        Commands::Sync(cmd) => cmd_sync::run(cmd, &config, cli.quiet)?,
    }

    Ok(())
}

/// Macro to create clap help templates with examples
/// This works around the limitation that {bin} doesn't work in after_help
/// Uses env! macro to get binary name at compile time
#[macro_export]
macro_rules! clap_help {
    (examples: $examples:literal) => {{
        const BIN: &str = env!("CARGO_PKG_NAME");
        concat!(
            "{about-with-newline}\n",
            "{usage-heading} {usage}\n\n",
            "{all-args}\n\n",
            "Examples:\n",
            $examples
        ).replace("{bin}", BIN)
    }};
}
