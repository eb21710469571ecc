//! Daybook: a personal worklog workspace.
//!
//! Items with rich-text blocks, a monthly board, per-day notes, image
//! attachments, whole-workspace backups and best-effort import of
//! third-party exports. The HTTP surface lives in [`api`]; everything below
//! it is usable directly through [`Daybook`].

pub mod admin;
pub mod api;
pub mod app;
pub mod auth;
pub mod backup;
pub mod config;
pub mod content;
pub mod error;
pub mod files;
pub mod html;
pub mod imports;
pub mod migration;
pub mod model;
pub mod store;
pub mod workspace;

pub use api::ApiServer;
pub use app::Daybook;
pub use config::Config;
pub use error::{Error, Result};
