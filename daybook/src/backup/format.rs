//! Backup archive layout: `backup.json`, `files/<storedName>` and `manifest.json`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::model::DayNote;
use crate::{Error, Result};

pub const BACKUP_VERSION: u32 = 1;
pub const BACKUP_JSON: &str = "backup.json";
pub const MANIFEST_JSON: &str = "manifest.json";
pub const FILES_PREFIX: &str = "files/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub items: Vec<BackupItem>,
    #[serde(default)]
    pub day_notes: Vec<DayNote>,
}

/// One exported item. Every field has a default so that partially valid
/// entries from older or hand-edited archives can still be restored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupItem {
    pub id: Option<uuid::Uuid>,
    pub parent_id: Option<uuid::Uuid>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub template_type: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub updated_at: Option<DateTime<Utc>>,
    pub tag_names: Vec<String>,
    pub blocks: Vec<BackupBlock>,
    pub files: Vec<BackupFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupBlock {
    pub sort_order: Option<i32>,
    #[serde(rename = "type")]
    pub block_type: Option<String>,
    /// Usually the stored JSON string; objects are accepted and re-serialized.
    pub content: Value,
}

impl BackupBlock {
    pub fn content_string(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => "{}".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupFile {
    pub stored_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub item_count: usize,
    pub file_count: usize,
    pub sha256: String,
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Build the archive. `blobs` are `(storedName, bytes)` pairs.
pub fn write_archive(document: &BackupDocument, blobs: &[(String, Vec<u8>)]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec_pretty(document)?;
    let manifest = Manifest {
        version: BACKUP_VERSION,
        exported_at: document.exported_at,
        item_count: document.items.len(),
        file_count: blobs.len(),
        sha256: sha256_hex(&json),
    };

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(BACKUP_JSON, options)?;
    zip.write_all(&json)?;

    for (name, data) in blobs {
        zip.start_file(format!("{}{}", FILES_PREFIX, name), options)?;
        zip.write_all(data)?;
    }

    zip.start_file(MANIFEST_JSON, options)?;
    zip.write_all(&serde_json::to_vec_pretty(&manifest)?)?;

    Ok(zip.finish()?.into_inner())
}

/// Raw contents of an uploaded backup archive.
#[derive(Debug, Default)]
pub struct ArchiveContents {
    pub backup_json: Option<Vec<u8>>,
    pub manifest_json: Option<Vec<u8>>,
    /// Keyed by stored name (the part after `files/`).
    pub files: HashMap<String, Vec<u8>>,
}

impl ArchiveContents {
    /// Verify `backup.json` against the manifest checksum when a manifest is present.
    pub fn verify(&self) -> Result<()> {
        let (Some(json), Some(manifest)) = (&self.backup_json, &self.manifest_json) else {
            return Ok(());
        };
        let manifest: Manifest = serde_json::from_slice(manifest)
            .map_err(|e| Error::Validation(format!("manifest.json is invalid: {}", e)))?;
        if !manifest.sha256.eq_ignore_ascii_case(&sha256_hex(json)) {
            return Err(Error::Validation(
                "backup.json does not match the manifest checksum".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read the relevant members. Anything outside the layout is ignored.
pub fn read_archive(data: &[u8], max_entry_bytes: u64, max_total_bytes: u64) -> Result<ArchiveContents> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut contents = ArchiveContents::default();
    let mut total = 0u64;

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().replace('\\', "/");
        let wanted = name == BACKUP_JSON
            || name == MANIFEST_JSON
            || (name.starts_with(FILES_PREFIX) && name.len() > FILES_PREFIX.len());
        if !wanted {
            continue;
        }
        if entry.size() > max_entry_bytes {
            return Err(Error::Archive(format!("{} exceeds the member size limit", name)));
        }
        total += entry.size();
        if total > max_total_bytes {
            return Err(Error::Archive("archive exceeds the total size limit".to_string()));
        }

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.take(max_entry_bytes + 1).read_to_end(&mut buf)?;
        if buf.len() as u64 > max_entry_bytes {
            return Err(Error::Archive(format!("{} exceeds the member size limit", name)));
        }

        match name.as_str() {
            BACKUP_JSON => contents.backup_json = Some(buf),
            MANIFEST_JSON => contents.manifest_json = Some(buf),
            _ => {
                contents
                    .files
                    .insert(name[FILES_PREFIX.len()..].to_string(), buf);
            }
        }
    }
    Ok(contents)
}
