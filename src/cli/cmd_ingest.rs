use super::utils;
use anyhow::{Context, Result};
use clap::{Args, ValueHint};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tenderlake::store::next_id;
use tenderlake::{Config, IngestOutcome, Partition, Record, RecordId, RecordStore, VersionResolver};

#[derive(Args)]
#[command(
    about = "Load incoming record versions",
    long_about = "Read one record per line from a JSON-lines file and add it to the record
store. Lines without an _id get the next free id of --group. A record whose
update timestamp is already carried by an active version of the same tender
is merged into it instead of creating a new version.

A line whose _id is already stored is reported as a conflict and skipped.

Run 'resolve' afterwards to collapse the new versions.",
    help_template = crate::clap_help!(
        examples: "  # Load a daily feed of regular tenders\n  \
                   {bin} ingest feed.jsonl\n\n  \
                   # Load minor contracts\n  \
                   {bin} ingest minors.jsonl --group minor"
    )
)]
pub struct IngestCommand {
    /// JSON-lines file with one record per line
    #[arg(value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Partition for records without an _id
    #[arg(long, default_value = "standard")]
    pub group: Partition,
}

pub fn run(cmd: IngestCommand, config: &Config) -> Result<()> {
    let file = File::open(&cmd.file)
        .with_context(|| format!("Failed to open {}", cmd.file.display()))?;
    let mut store = utils::open_or_create_records(config)?;
    let mut free = next_id(&store, cmd.group)?.number();

    let mut inserted = 0usize;
    let mut merged = 0usize;
    let mut conflicts = 0usize;
    let mut resolver = VersionResolver::new(&mut store);

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", cmd.file.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut value: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid JSON", cmd.file.display(), idx + 1))?;

        let assigned = value.get("_id").is_none();
        if assigned {
            let id = RecordId::from_number(free);
            if let Some(object) = value.as_object_mut() {
                object.insert("_id".into(), serde_json::Value::String(id.to_string()));
            }
        }
        let record: Record = serde_json::from_value(value)
            .with_context(|| format!("{}:{}: invalid record", cmd.file.display(), idx + 1))?;
        if !assigned && record.id.partition() == cmd.group {
            free = free.max(record.id.number() + 1);
        }

        match resolver.ingest(record)? {
            IngestOutcome::Inserted(id) => {
                log::info!("Inserted {}", id);
                inserted += 1;
                if assigned {
                    free += 1;
                }
            }
            IngestOutcome::Merged(id) => {
                log::info!("Merged into {}", id);
                merged += 1;
            }
            IngestOutcome::Conflict(_) => conflicts += 1,
        }
    }
    drop(resolver);
    store.flush()?;

    println!("Inserted: {}", inserted);
    println!("Merged:   {}", merged);
    if conflicts > 0 {
        println!("Conflicts: {} (id already stored, skipped)", conflicts);
    }
    eprintln!("\n✓ Ingested {}", utils::display_path(&cmd.file).display());
    Ok(())
}
