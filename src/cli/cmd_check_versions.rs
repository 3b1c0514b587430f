use super::utils::{self, RangeArgs};
use anyhow::Result;
use clap::Args;
use tenderlake::{Config, IdRange, Partition, VersionResolver};

#[derive(Args)]
#[command(
    about = "Recover missing ids and repair obsolete chains",
    long_about = "Walk every id of a partition up to its highest stored id. Ids missing from
the record store are looked up in the legacy store (store.legacy); when the
legacy record's tender still has an active record, the id is recreated as an
obsolete stub pointing at it. Then every obsolete chain of the partition is
collapsed onto its terminal record.",
    help_template = crate::clap_help!(
        examples: "  # Check regular tenders\n  \
                   {bin} check-versions\n\n  \
                   # Check minor contracts from a given id\n  \
                   {bin} check-versions --group minor --ini ntp10050000"
    )
)]
pub struct CheckVersionsCommand {
    /// Record family: standard or minor
    #[arg(long, default_value = "standard")]
    pub group: Partition,

    #[command(flatten)]
    pub range: RangeArgs,
}

pub fn run(cmd: CheckVersionsCommand, config: &Config) -> Result<()> {
    let range = match cmd.range.range()? {
        IdRange::All => IdRange::partition(cmd.group),
        other => other,
    };
    let mut store = utils::open_records(config)?;
    let Some(legacy) = utils::open_legacy(config)? else {
        anyhow::bail!("check-versions needs store.legacy in the configuration");
    };

    let mut resolver = VersionResolver::new(&mut store)
        .with_legacy(&legacy)
        .page_size(config.store.page_size)
        .bulk_size(config.store.bulk_size)
        .max_chain_hops(config.resolver.max_chain_hops);

    let gaps = resolver.recover_gaps(cmd.group, &range)?;
    let chains = resolver.collapse_chains(&range)?;

    println!("Missing ids:     {}", gaps.missing);
    println!("Recovered stubs: {}", gaps.recovered);
    println!("Not in legacy:   {}", gaps.not_in_legacy);
    println!("Unresolved:      {}", gaps.unresolved);
    println!("Repointed:       {}", chains.repointed);
    if chains.broken_chains > 0 {
        println!("Broken chains:   {}", chains.broken_chains);
    }
    eprintln!("\n✓ Checked {} records in {}", cmd.group, range);
    Ok(())
}
