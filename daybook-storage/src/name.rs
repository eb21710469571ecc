//! Flat, validated names for stored blobs.
//!
//! Every blob lives directly under the storage root as `<uuid>.<ext>`.
//! Names coming back from URLs (`/files/<name>`) are parsed through
//! [`StoredName::parse`], which rejects anything that could escape the root.
//!
//! ```
//! use daybook_storage::StoredName;
//!
//! let name = StoredName::generate(Some("PNG"));
//! assert!(name.as_str().ends_with(".png"));
//! assert!(StoredName::parse("../secret").is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};

/// A single path segment naming a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoredName(String);

impl StoredName {
    /// Create a fresh unique name, keeping a sanitized lowercase extension.
    pub fn generate(extension: Option<&str>) -> Self {
        let id = uuid::Uuid::new_v4();
        match extension.map(sanitize_extension).filter(|e| !e.is_empty()) {
            Some(ext) => Self(format!("{}.{}", id, ext)),
            None => Self(id.to_string()),
        }
    }

    /// Validate an externally supplied name.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 255
            && raw != "."
            && raw != ".."
            && !raw.starts_with('.')
            && !raw.contains(['/', '\\', '\0'])
            && !raw.contains("..");
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(StorageError::InvalidName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }

    /// Resolve against a base directory.
    pub fn to_path_buf(&self, base: &Path) -> PathBuf {
        base.join(&self.0)
    }
}

fn sanitize_extension(ext: &str) -> String {
    ext.trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(10)
        .collect::<String>()
        .to_ascii_lowercase()
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoredName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StoredName {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<StoredName> for String {
    fn from(name: StoredName) -> Self {
        name.0
    }
}
