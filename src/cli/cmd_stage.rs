use super::utils;
use anyhow::{Context, Result};
use clap::{Args, ValueHint};
use std::path::PathBuf;
use tenderlake::storage::SwiftBackend;
use tenderlake::Config;

#[derive(Args)]
#[command(
    about = "Copy a Swift folder to local disk",
    long_about = "Download every object under a folder of the Swift container into a local
directory, flattening names to their last path segment. The directory is
created when missing. Useful to stage documents for offline processing.",
    help_template = crate::clap_help!(
        examples: "  {bin} stage pliegos/2024 --to /tmp/pliegos\n  \
                   {bin} stage documentos --container ESPROC_OLD --to ./staged"
    )
)]
pub struct StageCommand {
    /// Remote folder (object name prefix) to download
    pub folder: String,

    /// Local destination directory
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub to: PathBuf,

    /// Swift container (defaults to storage.swift.container)
    #[arg(long)]
    pub container: Option<String>,
}

pub fn run(cmd: StageCommand, config: &Config) -> Result<()> {
    let mut swift = config
        .storage
        .swift
        .clone()
        .context("storage.swift is not configured")?;
    if let Some(container) = &cmd.container {
        swift.container = container.clone();
    }

    let (ok, failed) = utils::runtime()?.block_on(async {
        let backend = SwiftBackend::connect(&swift).await?;
        anyhow::Ok(backend.fetch_to_local(&cmd.folder, &cmd.to).await?)
    })?;

    println!("Downloaded: {}", ok);
    if failed > 0 {
        println!("Failed:     {}", failed);
    }
    eprintln!("\n✓ Staged into {}", utils::display_path(&cmd.to).display());
    Ok(())
}
