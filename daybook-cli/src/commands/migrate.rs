//! Third-party export import.

use anyhow::{Context, Result};
use bytes::Bytes;
use daybook_client::ApiClient;
use std::path::Path;

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.zip".to_string())
}

pub async fn run_migrate(client: &ApiClient, input: &Path) -> Result<()> {
    let data = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    println!("Uploading {} ({} bytes)", input.display(), data.len());

    let report = client
        .import_migration(&file_name(input), Bytes::from(data))
        .await?;

    println!();
    println!("Migration completed:");
    println!("  Items:    {}", report.persisted_items);
    println!("  Files:    {}", report.persisted_files);
    println!("  Detected: {}", report.detected_patterns.len());
    for pattern in &report.detected_patterns {
        println!("    {}", pattern);
    }
    if !report.failures.is_empty() {
        println!("  Failures: {}", report.failures.len());
        for failure in &report.failures {
            println!("    - {}", failure);
        }
    }
    if !report.manual_fix_hints.is_empty() {
        println!("  Hints:");
        for hint in &report.manual_fix_hints {
            println!("    - {}", hint);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("/tmp/export/notion.zip")), "notion.zip");
        assert_eq!(file_name(Path::new("/")), "upload.zip");
    }
}
