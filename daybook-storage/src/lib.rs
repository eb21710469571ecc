//! Blob storage for Daybook file attachments.
//!
//! Uploaded images, migrated assets and restored backup files all end up as
//! flat blobs addressed by a [`StoredName`] (`<uuid>.<ext>`). The server
//! exposes them at `/files/<storedName>`.
//!
//! ```text
//!   upload / migration / backup restore
//!                  │
//!                  ▼
//!          ┌──────────────┐
//!          │ BlobStorage  │
//!          └──────┬───────┘
//!          ┌──────┴───────┐
//!          ▼              ▼
//!    LocalStorage   MemoryStorage
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use daybook_storage::{BlobStorage, Bytes, LocalStorage, StoredName};
//!
//! # async fn example() -> daybook_storage::Result<()> {
//! let storage = LocalStorage::new("./uploads");
//! let name = StoredName::generate(Some("png"));
//! storage.write(&name, Bytes::from_static(b"\x89PNG")).await?;
//! let data = storage.read(&name).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod local;
mod memory;
mod name;
mod traits;

pub use error::{Result, StorageError};
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use name::StoredName;
pub use traits::BlobStorage;

// Re-export bytes for convenience
pub use bytes::Bytes;
