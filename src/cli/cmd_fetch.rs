use super::progress::ProgressBar;
use super::utils::{self, RangeArgs, StorageArgs};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Instant;
use tenderlake::format::{format_duration, format_number};
use tenderlake::{Config, DocumentFetcher, FetchOptions, Harvester};

#[derive(Args)]
#[command(
    about = "Download the documents linked by records",
    long_about = "Walk the active records of the selected id range and download every
document URL they carry into the chosen document store. Obsolete records are
skipped. Redirects and HTML meta-refresh pages are followed; documents whose
type is not in fetch.accepted_extensions are not stored.

Existing objects are kept unless --replace is given. --skip-early checks the
store before any network request, and --scan-only resolves document types
without storing anything.",
    help_template = crate::clap_help!(
        examples: "  # Fetch every record into the default disk folder\n  \
                   {bin} fetch\n\n  \
                   # Fetch one record into the blob store\n  \
                   {bin} fetch --id ntp00012345 --where blob\n\n  \
                   # Refetch a range into Swift, replacing existing objects\n  \
                   {bin} fetch --ini ntp00010000 --fin ntp00019999 --where swift --replace\n\n  \
                   # Only report document types\n  \
                   {bin} fetch --scan-only -v"
    )
)]
pub struct FetchCommand {
    #[command(flatten)]
    pub range: RangeArgs,

    #[command(flatten)]
    pub storage: StorageArgs,

    /// Overwrite documents already present in the store
    #[arg(long, conflicts_with = "skip_early")]
    pub replace: bool,

    /// Resolve document types without storing anything
    #[arg(long)]
    pub scan_only: bool,

    /// Skip fields with a stored object before any network request
    #[arg(long)]
    pub skip_early: bool,
}

pub fn run(cmd: FetchCommand, config: &Config, quiet: bool) -> Result<()> {
    let range = cmd.range.range()?;
    let options = FetchOptions {
        replace: cmd.replace,
        scan_only: cmd.scan_only,
        skip_early: cmd.skip_early,
    };
    let store = utils::open_records(config)?;
    let fetcher = DocumentFetcher::new(Arc::new(config.fetch.clone()))?;

    let started = Instant::now();
    let summary = utils::runtime()?.block_on(async {
        let storage = utils::open_storage(&cmd.storage.selector(), config).await?;
        log::info!("Storing documents at {}", storage.location());

        let progress = ProgressBar::spinner(quiet);
        let mut harvester =
            Harvester::new(fetcher, storage.as_ref(), options, config.store.page_size);
        let summary = harvester
            .run(&store, &range, |running| {
                progress.set_message(format!(
                    "{} records, {} stored, {} network errors",
                    format_number(running.records),
                    format_number(running.stored),
                    format_number(running.network_errors())
                ));
            })
            .await;
        progress.finish();
        summary
    })?;

    println!("Records:        {}", format_number(summary.records));
    println!("Obsolete:       {}", format_number(summary.obsolete));
    println!("Fields:         {}", format_number(summary.fields));
    println!("Stored:         {}", format_number(summary.stored));
    println!("Skipped:        {}", format_number(summary.skipped));
    println!("Unwanted type:  {}", format_number(summary.unwanted));
    println!(
        "Network errors: {} (http {}, ssl {}, timeout {}, other {})",
        format_number(summary.network_errors()),
        summary.http_errors,
        summary.ssl_errors,
        summary.timeouts,
        summary.unknown_errors
    );
    if summary.storage_failures > 0 {
        println!("Storage errors: {}", format_number(summary.storage_failures));
    }
    if let Some(last) = &summary.last_id {
        println!("Last id:        {}", last);
    }
    eprintln!("\n✓ Fetch finished in {}", format_duration(started.elapsed()));
    Ok(())
}
