use super::utils::{self, RangeArgs};
use anyhow::{Context, Result};
use clap::{Args, ValueHint};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tenderlake::resolver::JsonlPatchSink;
use tenderlake::{Config, VersionResolver};

#[derive(Args)]
#[command(
    about = "Collapse versions to one active record per tender",
    long_about = "Group the records of the selected range by natural key (the last path
segment of the source URI), elect the canonical version (latest
update, lowest id on ties) and rewrite every other version as an obsolete
stub pointing at it. Afterwards every obsolete chain is followed to its
terminal record and repointed, so each stub points straight at an active
record.

With --patches, the field-level differences between each superseded version
and its canonical record are written as JSON lines before the version is
stubbed.",
    help_template = crate::clap_help!(
        examples: "  # Resolve the whole store\n  \
                   {bin} resolve\n\n  \
                   # Resolve a range and keep the superseded fields\n  \
                   {bin} resolve --ini ntp00000001 --fin ntp00099999 --patches patches.jsonl\n\n  \
                   # Only repair obsolete chains\n  \
                   {bin} resolve --chains-only"
    )
)]
pub struct ResolveCommand {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Write the diff of every superseded version to this JSON-lines file
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub patches: Option<PathBuf>,

    /// Skip election, only repoint obsolete chains
    #[arg(long)]
    pub chains_only: bool,
}

pub fn run(cmd: ResolveCommand, config: &Config) -> Result<()> {
    let range = cmd.range.range()?;
    let mut store = utils::open_records(config)?;
    let legacy = utils::open_legacy(config)?;
    let mut sink = cmd
        .patches
        .as_ref()
        .map(|path| {
            File::create(path)
                .map(|file| JsonlPatchSink::new(BufWriter::new(file)))
                .with_context(|| format!("Failed to create {}", path.display()))
        })
        .transpose()?;

    let mut resolver = VersionResolver::new(&mut store)
        .page_size(config.store.page_size)
        .bulk_size(config.store.bulk_size)
        .max_chain_hops(config.resolver.max_chain_hops);
    if let Some(legacy) = &legacy {
        resolver = resolver.with_legacy(legacy);
    }
    if let Some(sink) = sink.as_mut() {
        resolver = resolver.with_patches(sink);
    }

    let summary = if cmd.chains_only {
        resolver.collapse_chains(&range)?
    } else {
        resolver.resolve(&range)?
    };
    drop(resolver);

    if let Some(sink) = sink {
        use std::io::Write;
        sink.into_inner().flush().context("Failed to write patches")?;
    }

    println!("Natural keys:   {}", summary.groups);
    println!("Elected:        {}", summary.elected);
    println!("Stubbed:        {}", summary.stubbed);
    println!("Merged updates: {}", summary.merged);
    println!("Repointed:      {}", summary.repointed);
    println!(
        "Writes:         {} matched, {} upserted, {} failed",
        summary.writes.matched,
        summary.writes.upserted,
        summary.writes.failed.len()
    );
    if summary.broken_chains > 0 {
        println!("Broken chains:  {}", summary.broken_chains);
    }
    eprintln!("\n✓ Resolved {}", range);
    Ok(())
}
