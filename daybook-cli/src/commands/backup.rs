//! Backup export and restore.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::ValueEnum;
use daybook::backup::ImportMode;
use daybook_client::ApiClient;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Add to the existing workspace
    Merge,
    /// Delete the existing workspace first
    Replace,
}

impl From<Mode> for ImportMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Merge => ImportMode::Merge,
            Mode::Replace => ImportMode::Replace,
        }
    }
}

pub async fn run_export(client: &ApiClient, output: &Path) -> Result<()> {
    let archive = client.export_backup().await.context("Backup export failed")?;
    tokio::fs::write(output, &archive)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Exported {} bytes to {}", archive.len(), output.display());
    Ok(())
}

pub async fn run_restore(client: &ApiClient, input: &Path, mode: Mode) -> Result<()> {
    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let file_name = super::migrate::file_name(input);
    println!("Restoring {} ({:?})", input.display(), mode);

    let report = client
        .import_backup(&file_name, Bytes::from(data), mode.into())
        .await?;
    println!("Imported items: {}", report.imported_items);
    println!("Imported files: {}", report.imported_files);
    if !report.errors.is_empty() {
        println!("Errors:");
        for error in &report.errors {
            println!("  - {}", error);
        }
    }
    Ok(())
}
