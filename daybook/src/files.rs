//! Attachments: image upload validation, listing and public serving of any stored file.

use bytes::Bytes;
use daybook_storage::{BlobStorage, StoredName};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::FileAsset;
use crate::store::{self, files, items, Store};
use crate::{Error, Result};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];
pub const IMAGE_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];
const FALLBACK_MIME: &str = "application/octet-stream";

/// Lower-cased extension of a file name or path.
pub fn extension_of(name: &str) -> Option<String> {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    file.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn is_image_name(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type guessed from the extension.
pub fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: Uuid,
    pub url: String,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

impl From<&FileAsset> for UploadedFile {
    fn from(asset: &FileAsset) -> Self {
        Self {
            id: asset.id,
            url: asset.url(),
            original_name: asset.original_name.clone(),
            mime_type: asset.mime_type.clone(),
            size_bytes: asset.size_bytes,
        }
    }
}

/// Bytes and content type for `GET /files/:storedName`.
#[derive(Debug, Clone)]
pub struct ServedFile {
    pub data: Bytes,
    pub mime_type: String,
}

pub struct FileService {
    store: Arc<Store>,
    storage: Arc<dyn BlobStorage>,
}

impl FileService {
    pub fn new(store: Arc<Store>, storage: Arc<dyn BlobStorage>) -> Self {
        Self { store, storage }
    }

    fn validate(original_name: &str, content_type: Option<&str>, size: usize) -> Result<(String, String)> {
        if size == 0 {
            return Err(Error::Validation("file is empty".to_string()));
        }
        let ext = extension_of(original_name)
            .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unsupported file extension, allowed: {}",
                    IMAGE_EXTENSIONS.join(", ")
                ))
            })?;
        let mime = content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty() && ct != FALLBACK_MIME)
            .unwrap_or_else(|| guess_mime(original_name));
        if !IMAGE_MIME_TYPES.contains(&mime.as_str()) {
            return Err(Error::Validation(format!("unsupported content type '{}'", mime)));
        }
        Ok((ext, mime))
    }

    pub async fn upload(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        original_name: &str,
        content_type: Option<&str>,
        data: Bytes,
    ) -> Result<UploadedFile> {
        self.store
            .read(|c| items::find_owned(c, user_id, item_id))
            .await?;
        let (ext, mime_type) = Self::validate(original_name, content_type, data.len())?;

        let stored_name = StoredName::generate(Some(&ext));
        let size_bytes = data.len() as i64;
        self.storage.write(&stored_name, data).await?;

        let asset = FileAsset {
            id: Uuid::new_v4(),
            user_id,
            item_id,
            original_name: original_name.to_string(),
            stored_name,
            mime_type,
            size_bytes,
            created_at: store::now(),
        };
        if let Err(e) = self.store.write(|tx| files::insert(tx, &asset)).await {
            if let Err(cleanup) = self.storage.delete(&asset.stored_name).await {
                warn!(name = %asset.stored_name, error = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(e);
        }
        debug!(item = %item_id, name = %asset.stored_name, size = size_bytes, "Stored upload");
        Ok(UploadedFile::from(&asset))
    }

    pub async fn list_by_item(&self, user_id: Uuid, item_id: Uuid) -> Result<Vec<FileAsset>> {
        self.store
            .read(|c| {
                items::find_owned(c, user_id, item_id)?;
                files::list_by_item(c, item_id)
            })
            .await
    }

    /// Public lookup by stored name. The recorded MIME type wins over the extension guess.
    pub async fn serve(&self, raw_name: &str) -> Result<ServedFile> {
        let name = StoredName::parse(raw_name)
            .map_err(|_| Error::BadRequest(format!("invalid file name '{}'", raw_name)))?;
        let asset = self
            .store
            .read(|c| files::find_by_stored_name(c, &name))
            .await?;
        let data = self.storage.read(&name).await.map_err(|e| {
            if e.is_not_found() {
                Error::NotFound(format!("file {}", name))
            } else {
                Error::Storage(e)
            }
        })?;
        let mime_type = asset
            .map(|a| a.mime_type)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| guess_mime(name.as_str()));
        Ok(ServedFile { data, mime_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkspaceItem;
    use crate::store::test_support;
    use daybook_storage::MemoryStorage;

    async fn setup() -> (FileService, Arc<MemoryStorage>, Uuid, Uuid) {
        let store = Arc::new(Store::in_memory().unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let (user, item) = store
            .write(|tx| {
                let user = test_support::user(tx, "files@example.com");
                let item = WorkspaceItem::new(user.id, "Photos");
                items::insert(tx, &item)?;
                Ok((user.id, item.id))
            })
            .await
            .unwrap();
        (FileService::new(store, storage.clone()), storage, user, item)
    }

    #[test]
    fn test_extension_helpers() {
        assert_eq!(extension_of("dir\\Photo.JPG").as_deref(), Some("jpg"));
        assert_eq!(extension_of("noext"), None);
        assert!(is_image_name("a/b/c.webp"));
        assert!(!is_image_name("notes.pdf"));
        assert_eq!(guess_mime("x.png"), "image/png");
        assert_eq!(guess_mime("x.unknownext"), FALLBACK_MIME);
    }

    #[tokio::test]
    async fn test_upload_and_serve() {
        let (service, storage, user, item) = setup().await;
        let uploaded = service
            .upload(user, item, "shot.png", Some("image/png"), Bytes::from_static(b"\x89PNG"))
            .await
            .unwrap();
        assert!(uploaded.url.starts_with("/files/"));
        assert!(uploaded.url.ends_with(".png"));
        assert_eq!(uploaded.size_bytes, 4);
        assert_eq!(storage.len(), 1);

        let name = uploaded.url.trim_start_matches("/files/");
        let served = service.serve(name).await.unwrap();
        assert_eq!(served.mime_type, "image/png");
        assert_eq!(&served.data[..], b"\x89PNG");

        let listed = service.list_by_item(user, item).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].original_name, "shot.png");
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let (service, storage, user, item) = setup().await;
        let empty = service.upload(user, item, "a.png", None, Bytes::new()).await;
        assert!(matches!(empty, Err(Error::Validation(_))));

        let pdf = service
            .upload(user, item, "a.pdf", Some("application/pdf"), Bytes::from_static(b"%PDF"))
            .await;
        assert!(matches!(pdf, Err(Error::Validation(_))));

        let lying = service
            .upload(user, item, "a.png", Some("text/html"), Bytes::from_static(b"<html>"))
            .await;
        assert!(matches!(lying, Err(Error::Validation(_))));

        let missing_item = service
            .upload(user, Uuid::new_v4(), "a.png", None, Bytes::from_static(b"x"))
            .await;
        assert!(matches!(missing_item, Err(Error::NotFound(_))));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_serve_rejects_traversal_and_unknown() {
        let (service, _, _, _) = setup().await;
        assert!(matches!(service.serve("../etc/passwd").await, Err(Error::BadRequest(_))));
        assert!(matches!(service.serve("a/b.png").await, Err(Error::BadRequest(_))));
        assert!(matches!(
            service.serve(&format!("{}.png", Uuid::new_v4())).await,
            Err(Error::NotFound(_))
        ));
    }
}
