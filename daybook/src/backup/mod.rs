//! Whole-workspace backup export and restore.

pub mod format;

use bytes::Bytes;
use chrono::Utc;
use daybook_storage::{BlobStorage, StoredName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::MigrationConfig;
use crate::imports::ImportLocks;
use crate::model::{BlockPayload, FileAsset, ItemStatus, TemplateType, WorkspaceItem};
use crate::store::{self, blocks, day_notes, files, items, tags, Store};
use crate::{Error, Result};

use format::{ArchiveContents, BackupBlock, BackupDocument, BackupFile, BackupItem, BACKUP_VERSION};

const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Merge,
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupImportReport {
    pub imported_items: usize,
    pub imported_files: usize,
    pub errors: Vec<String>,
}

impl BackupImportReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Default::default()
        }
    }
}

/// Parse `backup.json` leniently: entries that are not objects or have
/// fields of the wrong type are reported and skipped.
fn parse_items(raw: &[u8]) -> std::result::Result<(Vec<BackupItem>, Vec<Value>, Vec<String>), String> {
    let root: Value = serde_json::from_slice(raw).map_err(|e| format!("backup.json is not valid JSON: {}", e))?;
    let Some(entries) = root.get("items").and_then(Value::as_array) else {
        return Err("backup.json has no items array".to_string());
    };
    let mut parsed = Vec::new();
    let mut errors = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        if !entry.is_object() {
            errors.push(format!("item #{} skipped: not an object", index + 1));
            continue;
        }
        match serde_json::from_value::<BackupItem>(entry.clone()) {
            Ok(item) => parsed.push(item),
            Err(e) => errors.push(format!("item #{} skipped: {}", index + 1, e)),
        }
    }
    let notes = root
        .get("dayNotes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok((parsed, notes, errors))
}

/// Replace every `/files/<old>` reference with `/files/<new>`.
fn remap_file_links(content: &str, renames: &HashMap<String, StoredName>) -> String {
    renames.iter().fold(content.to_string(), |acc, (old, new)| {
        acc.replace(&format!("/files/{}", old), &format!("/files/{}", new))
    })
}

pub struct BackupService {
    store: Arc<Store>,
    storage: Arc<dyn BlobStorage>,
    locks: ImportLocks,
    limits: MigrationConfig,
}

impl BackupService {
    pub fn new(store: Arc<Store>, storage: Arc<dyn BlobStorage>, locks: ImportLocks, limits: MigrationConfig) -> Self {
        Self { store, storage, locks, limits }
    }

    /// Snapshot the caller's workspace into a ZIP archive.
    pub async fn export(&self, user_id: Uuid) -> Result<Bytes> {
        let (document, assets) = self
            .store
            .read(|c| {
                let mut exported = Vec::new();
                let mut assets = Vec::new();
                for item in items::list_by_user(c, user_id)? {
                    let item_files = files::list_by_item(c, item.id)?;
                    exported.push(BackupItem {
                        id: Some(item.id),
                        parent_id: item.parent_id,
                        title: Some(item.title.clone()),
                        status: Some(item.status.as_str().to_string()),
                        template_type: Some(item.template_type.as_str().to_string()),
                        due_date: item.due_date,
                        updated_at: Some(item.updated_at),
                        tag_names: tags::names_for_item(c, item.id)?,
                        blocks: blocks::list(c, item.id)?
                            .into_iter()
                            .map(|b| BackupBlock {
                                sort_order: Some(b.sort_order),
                                block_type: Some(b.block_type),
                                content: Value::String(b.content),
                            })
                            .collect(),
                        files: item_files
                            .iter()
                            .map(|f| BackupFile {
                                stored_name: f.stored_name.to_string(),
                                original_name: f.original_name.clone(),
                                mime_type: f.mime_type.clone(),
                                size_bytes: f.size_bytes,
                            })
                            .collect(),
                    });
                    assets.extend(item_files);
                }
                let document = BackupDocument {
                    version: BACKUP_VERSION,
                    exported_at: Utc::now(),
                    items: exported,
                    day_notes: day_notes::list_all(c, user_id)?,
                };
                Ok((document, assets))
            })
            .await?;

        let mut blobs = Vec::with_capacity(assets.len());
        for asset in &assets {
            match self.storage.read(&asset.stored_name).await {
                Ok(data) => blobs.push((asset.stored_name.to_string(), data.to_vec())),
                Err(e) => warn!(name = %asset.stored_name, error = %e, "Skipping missing attachment in backup"),
            }
        }

        let item_count = document.items.len();
        let file_count = blobs.len();
        let archive = tokio::task::spawn_blocking(move || format::write_archive(&document, &blobs)).await??;
        metrics::counter!("daybook_backup_exports_total").increment(1);
        info!(user = %user_id, items = item_count, files = file_count, bytes = archive.len(), "Exported backup");
        Ok(Bytes::from(archive))
    }

    /// Restore an archive produced by [`BackupService::export`].
    ///
    /// Archive-level problems come back as a report with zero counts. A
    /// database failure rolls everything back and removes the blobs written
    /// for this import.
    pub async fn import(&self, user_id: Uuid, data: Bytes, mode: ImportMode) -> Result<BackupImportReport> {
        let _guard = self.locks.acquire(user_id)?;

        let (max_entry, max_total) = (self.limits.max_entry_bytes, self.limits.max_total_bytes);
        let read = tokio::task::spawn_blocking(move || format::read_archive(&data, max_entry, max_total)).await?;
        let contents: ArchiveContents = match read {
            Ok(contents) => contents,
            Err(e) => return Ok(BackupImportReport::failed(format!("invalid backup archive: {}", e))),
        };
        let Some(raw_json) = &contents.backup_json else {
            return Ok(BackupImportReport::failed("backup.json not found in archive"));
        };
        if let Err(e) = contents.verify() {
            return Ok(BackupImportReport::failed(e.to_string()));
        }
        let (entries, raw_notes, mut errors) = match parse_items(raw_json) {
            Ok(parsed) => parsed,
            Err(message) => return Ok(BackupImportReport::failed(message)),
        };

        // Blobs first, so block links can be rewritten before the transaction.
        let mut renames: HashMap<String, StoredName> = HashMap::new();
        let mut written: Vec<StoredName> = Vec::new();
        let mut pending_files: Vec<(usize, BackupFile, StoredName)> = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            for file in &entry.files {
                let Some(data) = contents.files.get(&file.stored_name) else {
                    errors.push(format!("attachment {} is missing from the archive", file.stored_name));
                    continue;
                };
                let old = match StoredName::parse(&file.stored_name) {
                    Ok(old) => old,
                    Err(e) => {
                        errors.push(format!("attachment skipped: {}", e));
                        continue;
                    }
                };
                let new = StoredName::generate(old.extension().as_deref());
                if let Err(e) = self.storage.write(&new, Bytes::from(data.clone())).await {
                    self.storage.delete_many(&written).await;
                    return Err(e.into());
                }
                written.push(new.clone());
                renames.insert(old.to_string(), new.clone());
                pending_files.push((index, file.clone(), new));
            }
        }

        let notes: Vec<crate::model::DayNote> = raw_notes
            .into_iter()
            .filter_map(|v| match serde_json::from_value(v) {
                Ok(note) => Some(note),
                Err(e) => {
                    errors.push(format!("day note skipped: {}", e));
                    None
                }
            })
            .collect();

        let outcome = self
            .store
            .write(|tx| {
                let mut replaced = Vec::new();
                if mode == ImportMode::Replace {
                    replaced = files::stored_names_for_user(tx, user_id)?;
                    items::delete_all_for_user(tx, user_id)?;
                    day_notes::delete_all_for_user(tx, user_id)?;
                }

                let new_ids: Vec<Uuid> = entries.iter().map(|_| Uuid::new_v4()).collect();
                let id_map: HashMap<Uuid, Uuid> = entries
                    .iter()
                    .zip(&new_ids)
                    .filter_map(|(e, new)| e.id.map(|old| (old, *new)))
                    .collect();

                for (entry, new_id) in entries.iter().zip(&new_ids) {
                    let title = entry
                        .title
                        .as_deref()
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .unwrap_or(UNTITLED);
                    let mut item = WorkspaceItem::new(user_id, title);
                    item.id = *new_id;
                    item.parent_id = entry.parent_id.and_then(|p| id_map.get(&p).copied());
                    item.status = entry
                        .status
                        .as_deref()
                        .and_then(ItemStatus::parse)
                        .unwrap_or_default();
                    item.template_type = TemplateType::normalize(entry.template_type.as_deref());
                    item.due_date = entry.due_date;
                    if let Some(updated_at) = entry.updated_at {
                        item.updated_at = updated_at;
                    }
                    items::insert(tx, &item)?;

                    for (order, block) in entry.blocks.iter().enumerate() {
                        let payload = BlockPayload {
                            id: None,
                            sort_order: block.sort_order.unwrap_or(order as i32),
                            block_type: block.block_type.clone().unwrap_or_default(),
                            content: remap_file_links(&block.content_string(), &renames),
                        };
                        blocks::insert(tx, item.id, &payload)?;
                    }

                    if !entry.tag_names.is_empty() {
                        let mut tag_ids = Vec::new();
                        for name in entry.tag_names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                            tag_ids.push(tags::ensure(tx, user_id, name)?.id);
                        }
                        tags::set_item_tags(tx, user_id, item.id, &tag_ids)?;
                    }
                }

                for (index, file, stored_name) in &pending_files {
                    files::insert(
                        tx,
                        &FileAsset {
                            id: Uuid::new_v4(),
                            user_id,
                            item_id: new_ids[*index],
                            original_name: file.original_name.clone(),
                            stored_name: stored_name.clone(),
                            mime_type: file.mime_type.clone(),
                            size_bytes: file.size_bytes,
                            created_at: store::now(),
                        },
                    )?;
                }

                for note in &notes {
                    day_notes::upsert(tx, user_id, note)?;
                }
                Ok(replaced)
            })
            .await;

        let replaced = match outcome {
            Ok(replaced) => replaced,
            Err(e) => {
                error!(user = %user_id, error = %e, "Backup restore failed, removing written attachments");
                self.storage.delete_many(&written).await;
                return Err(e);
            }
        };
        self.storage.delete_many(&replaced).await;

        let report = BackupImportReport {
            imported_items: entries.len(),
            imported_files: pending_files.len(),
            errors,
        };
        info!(
            user = %user_id,
            mode = ?mode,
            items = report.imported_items,
            files = report.imported_files,
            errors = report.errors.len(),
            "Restored backup"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DayNote;
    use crate::store::test_support;
    use chrono::NaiveDate;
    use daybook_storage::MemoryStorage;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    struct Fixture {
        service: BackupService,
        store: Arc<Store>,
        storage: Arc<MemoryStorage>,
        alice: Uuid,
        bob: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(Store::in_memory().unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let (alice, bob) = store
            .write(|tx| {
                Ok((
                    test_support::user(tx, "alice@example.com").id,
                    test_support::user(tx, "bob@example.com").id,
                ))
            })
            .await
            .unwrap();
        let service = BackupService::new(store.clone(), storage.clone(), ImportLocks::new(), MigrationConfig::default());
        Fixture { service, store, storage, alice, bob }
    }

    /// Parent + child with one image referenced from the child's block.
    async fn seed(f: &Fixture) -> StoredName {
        let name = StoredName::generate(Some("png"));
        f.storage.write(&name, Bytes::from_static(b"image-bytes")).await.unwrap();
        let user = f.alice;
        let stored = name.clone();
        f.store
            .write(move |tx| {
                let mut parent = WorkspaceItem::new(user, "Parent");
                parent.due_date = NaiveDate::from_ymd_opt(2024, 4, 1);
                items::insert(tx, &parent)?;
                let mut child = WorkspaceItem::new(user, "Child");
                child.parent_id = Some(parent.id);
                child.status = ItemStatus::Done;
                items::insert(tx, &child)?;
                let html = format!(r#"<p><img src="/files/{}" /></p>"#, stored);
                blocks::insert(tx, child.id, &BlockPayload::html(0, &html))?;
                let tag = tags::ensure(tx, user, "work")?;
                tags::set_item_tags(tx, user, child.id, &[tag.id])?;
                files::insert(
                    tx,
                    &FileAsset {
                        id: Uuid::new_v4(),
                        user_id: user,
                        item_id: child.id,
                        original_name: "shot.png".into(),
                        stored_name: stored.clone(),
                        mime_type: "image/png".into(),
                        size_bytes: 11,
                        created_at: store::now(),
                    },
                )?;
                day_notes::upsert(
                    tx,
                    user,
                    &DayNote {
                        due_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
                        issue: "issue".into(),
                        memo: "memo".into(),
                    },
                )
            })
            .await
            .unwrap();
        name
    }

    #[test]
    fn test_remap_file_links() {
        let mut renames = HashMap::new();
        renames.insert("old.png".to_string(), StoredName::parse("new.png").unwrap());
        let out = remap_file_links(r#"{"html":"<img src=\"/files/old.png\">"}"#, &renames);
        assert_eq!(out, r#"{"html":"<img src=\"/files/new.png\">"}"#);
    }

    #[tokio::test]
    async fn test_export_then_import_into_other_account() {
        let f = fixture().await;
        let original = seed(&f).await;
        let archive = f.service.export(f.alice).await.unwrap();

        let report = f.service.import(f.bob, archive, ImportMode::Merge).await.unwrap();
        assert_eq!(report.imported_items, 2, "{:?}", report.errors);
        assert_eq!(report.imported_files, 1);
        assert!(report.errors.is_empty(), "{:?}", report.errors);

        let bob = f.bob;
        let (restored, child_blocks, child_files, note, tag_names) = f
            .store
            .read(move |c| {
                let restored = items::list_by_user(c, bob)?;
                let child = restored.iter().find(|i| i.title == "Child").cloned().unwrap();
                Ok((
                    restored,
                    blocks::list(c, child.id)?,
                    files::list_by_item(c, child.id)?,
                    day_notes::get(c, bob, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap())?,
                    tags::names_for_item(c, child.id)?,
                ))
            })
            .await
            .unwrap();

        let parent = restored.iter().find(|i| i.title == "Parent").unwrap();
        let child = restored.iter().find(|i| i.title == "Child").unwrap();
        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(child.status, ItemStatus::Done);
        assert_eq!(tag_names, vec!["work"]);
        assert_eq!(note.unwrap().memo, "memo");

        let new_name = &child_files[0].stored_name;
        assert_ne!(new_name, &original);
        assert!(child_blocks[0].content.contains(&format!("/files/{}", new_name)));
        assert!(!child_blocks[0].content.contains(original.as_str()));
        assert_eq!(&f.storage.read(new_name).await.unwrap()[..], b"image-bytes");
    }

    #[tokio::test]
    async fn test_replace_mode_clears_existing() {
        let f = fixture().await;
        let original = seed(&f).await;
        let archive = f.service.export(f.alice).await.unwrap();

        let report = f.service.import(f.alice, archive, ImportMode::Replace).await.unwrap();
        assert_eq!(report.imported_items, 2);
        let alice = f.alice;
        let count = f.store.read(move |c| Ok(items::list_by_user(c, alice)?.len())).await.unwrap();
        assert_eq!(count, 2);
        // The old blob is gone, the restored copy lives under a new name
        assert!(f.storage.read(&original).await.unwrap_err().is_not_found());
        assert_eq!(f.storage.len(), 1);
    }

    fn zip_with(entries: &[(&str, &[u8])]) -> Bytes {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        Bytes::from(zip.finish().unwrap().into_inner())
    }

    #[tokio::test]
    async fn test_archive_problems_are_reported() {
        let f = fixture().await;

        let report = f.service.import(f.bob, Bytes::from_static(b"nope"), ImportMode::Merge).await.unwrap();
        assert_eq!(report.imported_items, 0);
        assert_eq!(report.errors.len(), 1);

        let report = f.service.import(f.bob, zip_with(&[("other.txt", b"x")]), ImportMode::Merge).await.unwrap();
        assert!(report.errors[0].contains("backup.json"));

        let report = f.service.import(f.bob, zip_with(&[("backup.json", b"{oops")]), ImportMode::Merge).await.unwrap();
        assert_eq!(report.imported_items, 0);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_lenient_items() {
        let f = fixture().await;
        let json = br#"{"items": [
            {"title": "  ", "status": "bogus", "templateType": "meeting"},
            42,
            {"title": "Typed wrong", "blocks": "not-a-list"},
            {"title": "Missing file", "files": [{"storedName": "gone.png"}]}
        ]}"#;
        let report = f.service.import(f.bob, zip_with(&[("backup.json", json)]), ImportMode::Merge).await.unwrap();
        assert_eq!(report.imported_items, 2);
        assert_eq!(report.imported_files, 0);
        assert_eq!(report.errors.len(), 3, "{:?}", report.errors);

        let bob = f.bob;
        let restored = f.store.read(move |c| items::list_by_user(c, bob)).await.unwrap();
        let untitled = restored.iter().find(|i| i.title == UNTITLED).unwrap();
        assert_eq!(untitled.status, ItemStatus::Todo);
        assert_eq!(untitled.template_type, TemplateType::Meeting);
    }

    #[tokio::test]
    async fn test_concurrent_import_conflicts() {
        let f = fixture().await;
        let _held = f.service.locks.acquire(f.bob).unwrap();
        let err = f
            .service
            .import(f.bob, zip_with(&[("backup.json", b"{\"items\":[]}")]), ImportMode::Merge)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
