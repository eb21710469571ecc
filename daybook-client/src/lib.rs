//! Typed client for the Daybook REST API.
//!
//! [`ApiClient`] keeps the access token in a shared [`Session`] and refreshes
//! it at most once per expiry, no matter how many requests hit a 401 at the
//! same time. [`FileLinks`] and [`ItemDocument`] convert stored item HTML to
//! and from its display form.

pub mod client;
pub mod document;
pub mod error;
pub mod links;
pub mod session;

pub use client::ApiClient;
pub use document::ItemDocument;
pub use error::{ClientError, Result};
pub use links::FileLinks;
pub use session::Session;
