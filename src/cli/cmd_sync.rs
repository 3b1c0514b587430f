use super::progress::ProgressBar;
use super::utils::{self, RangeArgs};
use anyhow::Result;
use clap::Args;
use tenderlake::format::format_number;
use tenderlake::storage::{BackendKind, BackendSelector};
use tenderlake::{Config, SyncMode, SyncReconciler};

#[derive(Args)]
#[command(
    about = "Reconcile two document stores",
    long_about = "Compare the objects of the selected id range in two document stores and copy
what the destination lacks. With --replace, objects present at both sides are
copied again; with --delete, destination objects missing at the origin are
removed. A store cannot be synced onto itself.

The plan is computed before any change; --check-only prints it and stops.",
    help_template = crate::clap_help!(
        examples: "  # Copy the disk store into Swift\n  \
                   {bin} sync --from disk --to swift\n\n  \
                   # Mirror two disk folders exactly\n  \
                   {bin} sync --from disk --from-folder /data/a --to disk --to-folder /data/b --delete\n\n  \
                   # Show what would change\n  \
                   {bin} sync --from swift --to blob --check-only"
    )
)]
pub struct SyncCommand {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Origin store: disk, blob or swift
    #[arg(long, value_parser = utils::parse_kind)]
    pub from: BackendKind,

    /// Destination store: disk, blob or swift
    #[arg(long, value_parser = utils::parse_kind)]
    pub to: BackendKind,

    /// Origin directory, root or prefix
    #[arg(long)]
    pub from_folder: Option<String>,

    /// Destination directory, root or prefix
    #[arg(long)]
    pub to_folder: Option<String>,

    /// Swift container, for whichever side is swift
    #[arg(long)]
    pub container: Option<String>,

    /// Remove destination objects missing at the origin
    #[arg(long)]
    pub delete: bool,

    /// Copy objects present at both sides again
    #[arg(long)]
    pub replace: bool,

    /// Print the plan without changing anything
    #[arg(long)]
    pub check_only: bool,
}

pub fn run(cmd: SyncCommand, config: &Config, quiet: bool) -> Result<()> {
    let range = cmd.range.range()?;
    let mode = SyncMode {
        delete: cmd.delete,
        replace: cmd.replace,
    };
    let from = BackendSelector::new(cmd.from)
        .folder(cmd.from_folder.clone())
        .container(cmd.container.clone());
    let to = BackendSelector::new(cmd.to)
        .folder(cmd.to_folder.clone())
        .container(cmd.container.clone());

    utils::runtime()?.block_on(async {
        let origin = utils::open_storage(&from, config).await?;
        let destination = utils::open_storage(&to, config).await?;
        let reconciler = SyncReconciler::new(origin.as_ref(), destination.as_ref())?;

        let plan = reconciler.plan(&range, mode).await?;
        println!("Origin:      {}", plan.origin);
        println!("Destination: {}", plan.destination);
        println!("To add:      {}", format_number(plan.to_add.len()));
        println!("To update:   {}", format_number(plan.to_update.len()));
        println!("To delete:   {}", format_number(plan.to_delete.len()));
        println!("Unchanged:   {}", format_number(plan.unchanged.len()));

        if cmd.check_only {
            print!("{}", plan.render());
            eprintln!("\n✓ Check only, nothing changed");
            return Ok(());
        }
        if plan.is_empty() {
            eprintln!("\n✓ Already in sync");
            return Ok(());
        }

        let steps = plan.to_delete.len() + plan.transfers().count();
        let progress = ProgressBar::new(steps, quiet);
        let summary = reconciler.apply(&plan, |done| progress.set(done)).await;
        progress.finish();

        println!("Transferred: {}", format_number(summary.transferred));
        println!("Deleted:     {}", format_number(summary.deleted));
        if summary.failed > 0 {
            println!("Failed:      {}", format_number(summary.failed));
            anyhow::bail!("{} sync actions failed", summary.failed);
        }
        eprintln!("\n✓ Sync finished");
        anyhow::Ok(())
    })
}
