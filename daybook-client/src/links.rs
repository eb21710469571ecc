//! Attachment links: stored HTML uses relative `/files/...`, rendered HTML
//! points at the API host.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static RELATIVE_FILE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(src|href)=(["'])/files/"#).expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLinks {
    api_base: String,
}

impl FileLinks {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Absolute URL for a `/files/...` path returned by the upload endpoint.
    pub fn absolute(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.api_base, url)
        } else {
            url.to_string()
        }
    }

    /// Point `src`/`href` attributes at the API host.
    pub fn to_display(&self, html: &str) -> String {
        RELATIVE_FILE_ATTR
            .replace_all(html, |caps: &Captures| {
                format!("{}={}{}/files/", &caps[1], &caps[2], self.api_base)
            })
            .into_owned()
    }

    /// Strip the API host from every `<apiBase>/files/` occurrence.
    pub fn to_storage(&self, html: &str) -> String {
        let absolute = format!("{}/files/", self.api_base);
        let mut current = html.to_string();
        // A removal can splice a new occurrence together, so run to a fixpoint.
        while current.contains(&absolute) {
            current = current.replace(&absolute, "/files/");
        }
        current
    }
}
