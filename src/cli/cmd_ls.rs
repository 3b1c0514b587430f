use super::utils::{self, RangeArgs, StorageArgs};
use anyhow::Result;
use clap::Args;
use std::io::{self, Write};
use tenderlake::Config;

#[derive(Args)]
#[command(
    about = "List stored documents",
    long_about = "Print the object names of a document store, one per line and sorted, limited
to the selected id range. Output is meant for pipes.",
    help_template = crate::clap_help!(
        examples: "  # Everything in the disk store\n  \
                   {bin} ls\n\n  \
                   # Documents of one record in Swift\n  \
                   {bin} ls --where swift --id ntp00012345\n\n  \
                   # Count blob objects in a range\n  \
                   {bin} ls --where blob --ini ntp00000001 --fin ntp00001000 --count"
    )
)]
pub struct LsCommand {
    #[command(flatten)]
    pub range: RangeArgs,

    #[command(flatten)]
    pub storage: StorageArgs,

    /// Print only the number of objects
    #[arg(long)]
    pub count: bool,
}

pub fn run(cmd: LsCommand, config: &Config) -> Result<()> {
    let range = cmd.range.range()?;
    let names = utils::runtime()?.block_on(async {
        let storage = utils::open_storage(&cmd.storage.selector(), config).await?;
        anyhow::Ok(storage.list(&range).await?)
    })?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cmd.count {
        writeln!(out, "{}", names.len())?;
    } else {
        for name in &names {
            writeln!(out, "{}", name)?;
        }
    }
    Ok(())
}
