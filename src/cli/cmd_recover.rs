use super::cmd_purge::BackupArgs;
use super::utils::{self, RangeArgs, StorageArgs};
use anyhow::Result;
use clap::Args;
use tenderlake::storage::ensure_distinct;
use tenderlake::{Config, RetentionManager};

#[derive(Args)]
#[command(
    about = "Restore purged documents from backup",
    long_about = "Copy every backup object of the selected range back into the primary store,
overwriting objects with the same name. The backup copies are kept.",
    help_template = crate::clap_help!(
        examples: "  # Restore one record into the disk store\n  \
                   {bin} recover --id ntp00012345\n\n  \
                   # Restore a range into Swift\n  \
                   {bin} recover --where swift --ini ntp00000001 --fin ntp00001000"
    )
)]
pub struct RecoverCommand {
    #[command(flatten)]
    pub range: RangeArgs,

    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(flatten)]
    pub backup: BackupArgs,
}

pub fn run(cmd: RecoverCommand, config: &Config) -> Result<()> {
    let range = cmd.range.range()?;

    let summary = utils::runtime()?.block_on(async {
        let primary = utils::open_storage(&cmd.storage.selector(), config).await?;
        let backup = utils::open_storage(&cmd.backup.selector(), config).await?;
        ensure_distinct(primary.as_ref(), backup.as_ref())?;

        RetentionManager::new(primary.as_ref(), backup.as_ref(), config.store.page_size)
            .recover(&range)
            .await
    })?;

    println!("Examined:  {}", summary.examined);
    println!("Recovered: {}", summary.recovered);
    if summary.failures > 0 {
        println!("Failures:  {}", summary.failures);
    }
    eprintln!("\n✓ Recovery finished");
    Ok(())
}
