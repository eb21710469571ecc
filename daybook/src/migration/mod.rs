//! Import of third-party workspace exports (Notion-style ZIP archives).
//!
//! Best effort: member problems end up in the report, only a database
//! failure fails the whole import.

pub mod archive;
pub mod markdown;
pub mod plan;
pub mod sheet;
pub mod text;

use bytes::Bytes;
use daybook_storage::{BlobStorage, StoredName};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::MigrationConfig;
use crate::files::extension_of;
use crate::html;
use crate::imports::ImportLocks;
use crate::model::{file_url, BlockPayload, DayNote, FileAsset};
use crate::store::{self, blocks, day_notes, files, items, Store};
use crate::Result;

use plan::{Append, Plan};

pub const DEFAULT_SOURCE_NAME: &str = "upload.zip";

const BLOB_WRITES_IN_FLIGHT: usize = 8;

const STANDING_HINTS: [&str; 3] = [
    "Date or status columns with non-standard names may need manual mapping",
    "Some non-standard checklist syntax may be converted to plain paragraphs",
    "Nested ZIP archives are detected automatically, but encrypted ZIPs are not supported",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub detected_patterns: Vec<String>,
    pub persisted_items: usize,
    pub persisted_files: usize,
    pub failures: Vec<String>,
    pub manual_fix_hints: Vec<String>,
}

/// A stored member waiting for its row and link rewrites.
struct StoredAsset {
    item_id: Uuid,
    path: String,
    original_name: String,
    stored_name: StoredName,
    mime_type: String,
    size_bytes: i64,
}

impl StoredAsset {
    /// Link values that refer to this asset from inside an exported page.
    fn link_keys(&self) -> [String; 3] {
        [
            self.path.clone(),
            self.original_name.clone(),
            format!("./{}", self.original_name),
        ]
    }
}

/// Resolve an `img[src]` / `a[href]` value against an item's rewrites.
fn lookup_rewrite(rewrites: &HashMap<String, String>, value: &str) -> Option<String> {
    let normalized = value.replace('\\', "/");
    let decoded = html::percent_decode(&normalized);
    let name = text::file_name(&decoded);
    [normalized.as_str(), decoded.as_str(), name]
        .iter()
        .find_map(|key| rewrites.get(*key))
        .or_else(|| rewrites.get(&format!("./{}", name)))
        .cloned()
}

/// Append to the first block of an existing item, creating one if needed.
fn apply_append(conn: &rusqlite::Connection, append: &Append) -> std::result::Result<(), String> {
    let first = blocks::first(conn, append.item_id).map_err(|e| e.to_string())?;
    match first {
        None => {
            blocks::insert(conn, append.item_id, &BlockPayload::html(0, &append.html)).map_err(|e| e.to_string())?;
        }
        Some(block) => {
            let mut object: Map<String, Value> =
                serde_json::from_str(&block.content).map_err(|e| format!("block content is not an object: {}", e))?;
            let current = object.get("html").and_then(Value::as_str).unwrap_or_default();
            let merged = format!("{}{}", current, append.html);
            object.insert("html".to_string(), Value::String(merged));
            blocks::update_content(conn, block.id, &Value::Object(object).to_string()).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

/// Rewrite asset links in every block of `item_id`.
fn rewrite_item_links(
    conn: &rusqlite::Connection,
    item_id: Uuid,
    rewrites: &HashMap<String, String>,
) -> Result<usize> {
    let mut total = 0;
    for block in blocks::list(conn, item_id)? {
        let Ok(mut object) = serde_json::from_str::<Map<String, Value>>(&block.content) else {
            continue;
        };
        let Some(current) = object.get("html").and_then(Value::as_str) else {
            continue;
        };
        let (rewritten, count) = html::rewrite_links(current, |value| lookup_rewrite(rewrites, value));
        if count > 0 {
            object.insert("html".to_string(), Value::String(rewritten));
            blocks::update_content(conn, block.id, &Value::Object(object).to_string())?;
            total += count;
        }
    }
    Ok(total)
}

pub struct MigrationService {
    store: Arc<Store>,
    storage: Arc<dyn BlobStorage>,
    locks: ImportLocks,
    limits: MigrationConfig,
}

impl MigrationService {
    pub fn new(store: Arc<Store>, storage: Arc<dyn BlobStorage>, locks: ImportLocks, limits: MigrationConfig) -> Self {
        Self {
            store,
            storage,
            locks,
            limits,
        }
    }

    /// Import an uploaded archive into the caller's workspace.
    pub async fn import(&self, user_id: Uuid, source_name: Option<&str>, data: Bytes) -> Result<MigrationReport> {
        let _guard = self.locks.acquire(user_id)?;

        let source = source_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SOURCE_NAME)
            .replace('\\', "/");

        let anchors = self
            .store
            .read(move |c| items::latest_by_due_date(c, user_id))
            .await?;
        let limits = self.limits.clone();
        let planning_source = source.clone();
        let plan = tokio::task::spawn_blocking(move || {
            plan::build(user_id, &planning_source, &data, &limits, anchors)
        })
        .await?;

        let report = self.apply(user_id, plan).await?;

        metrics::counter!("daybook_migration_items_total").increment(report.persisted_items as u64);
        metrics::counter!("daybook_migration_failures_total").increment(report.failures.len() as u64);
        info!(
            user = %user_id,
            source = %source,
            items = report.persisted_items,
            files = report.persisted_files,
            failures = report.failures.len(),
            "Migration import finished"
        );
        Ok(report)
    }

    async fn apply(&self, user_id: Uuid, plan: Plan) -> Result<MigrationReport> {
        let Plan {
            detected,
            mut failures,
            hints,
            items: planned,
            appends,
            day_notes: notes,
            assets,
        } = plan;

        // Blobs first; a failed write only loses that asset.
        let storage = &self.storage;
        let writes: Vec<std::result::Result<StoredAsset, String>> = stream::iter(assets)
            .map(|asset| async move {
                let stored_name = StoredName::generate(extension_of(&asset.original_name).as_deref());
                let size_bytes = asset.data.len() as i64;
                match storage.write(&stored_name, Bytes::from(asset.data)).await {
                    Ok(()) => Ok(StoredAsset {
                        item_id: asset.item_id,
                        path: asset.path,
                        original_name: asset.original_name,
                        stored_name,
                        mime_type: asset.mime_type,
                        size_bytes,
                    }),
                    Err(e) => {
                        warn!(path = %asset.path, error = %e, "Failed to store migrated file");
                        Err(format!("file store failed ({}): {}", asset.path, e))
                    }
                }
            })
            .buffered(BLOB_WRITES_IN_FLIGHT)
            .collect()
            .await;
        let mut stored = Vec::with_capacity(writes.len());
        for write in writes {
            match write {
                Ok(asset) => stored.push(asset),
                Err(failure) => failures.push(failure),
            }
        }

        let mut rewrites: HashMap<Uuid, HashMap<String, String>> = HashMap::new();
        for asset in &stored {
            let url = file_url(&asset.stored_name);
            let entry = rewrites.entry(asset.item_id).or_default();
            for key in asset.link_keys() {
                entry.insert(key, url.clone());
            }
        }

        let outcome = self
            .store
            .write(|tx| {
                let mut apply_failures = Vec::new();

                for planned_item in &planned {
                    items::insert(tx, &planned_item.item)?;
                    if let Some(content) = &planned_item.content {
                        let payload = BlockPayload {
                            id: None,
                            sort_order: 0,
                            block_type: "paragraph".to_string(),
                            content: content.clone(),
                        };
                        blocks::insert(tx, planned_item.item.id, &payload)?;
                    }
                }

                for append in &appends {
                    if let Err(e) = apply_append(tx, append) {
                        apply_failures.push(format!("parent merge failed ({}): {}", append.source, e));
                    }
                }

                for (date, (issue, memo)) in &notes {
                    if issue.is_empty() && memo.is_empty() {
                        continue;
                    }
                    let mut note = day_notes::get(tx, user_id, *date)?.unwrap_or_else(|| DayNote::empty(*date));
                    if !issue.trim().is_empty() {
                        note.issue = issue.clone();
                    }
                    if !memo.trim().is_empty() {
                        note.memo = memo.clone();
                    }
                    day_notes::upsert(tx, user_id, &note)?;
                }

                for asset in &stored {
                    files::insert(
                        tx,
                        &FileAsset {
                            id: Uuid::new_v4(),
                            user_id,
                            item_id: asset.item_id,
                            original_name: asset.original_name.clone(),
                            stored_name: asset.stored_name.clone(),
                            mime_type: asset.mime_type.clone(),
                            size_bytes: asset.size_bytes,
                            created_at: store::now(),
                        },
                    )?;
                }

                for (item_id, item_rewrites) in &rewrites {
                    rewrite_item_links(tx, *item_id, item_rewrites)?;
                }
                Ok(apply_failures)
            })
            .await;

        let apply_failures = match outcome {
            Ok(apply_failures) => apply_failures,
            Err(e) => {
                error!(user = %user_id, error = %e, "Migration import failed, removing stored files");
                let names: Vec<StoredName> = stored.into_iter().map(|a| a.stored_name).collect();
                self.storage.delete_many(&names).await;
                return Err(e);
            }
        };
        failures.extend(apply_failures);

        let mut manual_fix_hints: Vec<String> = STANDING_HINTS.iter().map(|h| h.to_string()).collect();
        manual_fix_hints.extend(hints);

        Ok(MigrationReport {
            detected_patterns: detected,
            persisted_items: planned.len(),
            persisted_files: stored.len(),
            failures,
            manual_fix_hints,
        })
    }
}
