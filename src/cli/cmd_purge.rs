use super::utils::{self, RangeArgs, StorageArgs};
use anyhow::Result;
use clap::Args;
use tenderlake::storage::{ensure_distinct, BackendKind, BackendSelector};
use tenderlake::{Config, PurgeOptions, RetentionManager};

/// Where purged documents are kept
#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    /// Backup store: disk, blob or swift
    #[arg(long = "backup-where", default_value = "blob", value_parser = utils::parse_kind)]
    pub backup_kind: BackendKind,

    /// Backup directory, root or prefix (defaults to storage.backup_blob_root for blob)
    #[arg(long)]
    pub backup_folder: Option<String>,
}

impl BackupArgs {
    pub fn selector(&self) -> BackendSelector {
        let mut selector = BackendSelector::backup().folder(self.backup_folder.clone());
        selector.kind = self.backup_kind;
        selector
    }
}

#[derive(Args)]
#[command(
    about = "Move documents of obsolete records to backup",
    long_about = "For every obsolete record in the selected range, copy its stored documents
to the backup store and delete them from the primary store. Records that are
still active are reported and left alone. A document whose backup copy fails
stays in the primary store.

--check-only lists what would be purged. --no-backup deletes without copying.",
    help_template = crate::clap_help!(
        examples: "  # Preview the purge of the disk store\n  \
                   {bin} purge --check-only\n\n  \
                   # Purge a range of the Swift store into the blob backup\n  \
                   {bin} purge --where swift --ini ntp00000001 --fin ntp00500000\n\n  \
                   # Purge one record for good\n  \
                   {bin} purge --id ntp00012345 --no-backup"
    )
)]
pub struct PurgeCommand {
    #[command(flatten)]
    pub range: RangeArgs,

    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(flatten)]
    pub backup: BackupArgs,

    /// Delete without keeping a backup copy
    #[arg(long)]
    pub no_backup: bool,

    /// Only list the documents that would be purged
    #[arg(long)]
    pub check_only: bool,
}

pub fn run(cmd: PurgeCommand, config: &Config) -> Result<()> {
    let range = cmd.range.range()?;
    let options = PurgeOptions {
        no_backup: cmd.no_backup,
        check_only: cmd.check_only,
    };
    let store = utils::open_records(config)?;

    let summary = utils::runtime()?.block_on(async {
        let primary = utils::open_storage(&cmd.storage.selector(), config).await?;
        let backup = utils::open_storage(&cmd.backup.selector(), config).await?;
        ensure_distinct(primary.as_ref(), backup.as_ref())?;

        RetentionManager::new(primary.as_ref(), backup.as_ref(), config.store.page_size)
            .purge(&store, &range, &options)
            .await
    })?;

    for name in &summary.planned {
        println!("DEL {}", name);
    }
    println!("Examined:  {}", summary.examined);
    println!("Purged:    {}", summary.purged);
    println!("Skipped:   {}", summary.skipped);
    println!("Backed up: {}", summary.backed_up);
    println!("Deleted:   {}", summary.deleted);
    if summary.failures > 0 {
        println!("Failures:  {}", summary.failures);
    }
    if cmd.check_only {
        eprintln!("\n✓ Check only, {} documents would be purged", summary.planned.len());
    } else {
        eprintln!("\n✓ Purge finished");
    }
    Ok(())
}
