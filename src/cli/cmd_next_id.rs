use super::utils;
use anyhow::Result;
use clap::Args;
use tenderlake::store::next_id;
use tenderlake::{Config, Partition};

#[derive(Args)]
#[command(
    about = "Print the next free id of a partition",
    help_template = crate::clap_help!(
        examples: "  {bin} next-id\n  \
                   {bin} next-id --group minor"
    )
)]
pub struct NextIdCommand {
    /// Record family: standard or minor
    #[arg(long, default_value = "standard")]
    pub group: Partition,
}

pub fn run(cmd: NextIdCommand, config: &Config) -> Result<()> {
    let store = utils::open_records(config)?;
    println!("{}", next_id(&store, cmd.group)?);
    Ok(())
}
