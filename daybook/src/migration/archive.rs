//! Bounded, recursive ZIP extraction.
//!
//! Member paths are `<archive>/<entry>`; members of a nested archive are
//! prefixed with the nested archive's own path, so `upload.zip/inner.zip/a.md`.

use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::config::MigrationConfig;

#[derive(Debug, Clone)]
pub struct Member {
    pub path: String,
    pub data: Vec<u8>,
}

/// Walks an uploaded archive and everything nested inside it.
pub struct Extractor<'a> {
    limits: &'a MigrationConfig,
    members: Vec<Member>,
    failures: Vec<String>,
    entries: usize,
    total_bytes: u64,
    exhausted: bool,
}

impl<'a> Extractor<'a> {
    pub fn new(limits: &'a MigrationConfig) -> Self {
        Self {
            limits,
            members: Vec::new(),
            failures: Vec::new(),
            entries: 0,
            total_bytes: 0,
            exhausted: false,
        }
    }

    /// Extract `data` (named `source`) and return `(members, failures)`.
    pub fn run(mut self, source: &str, data: &[u8]) -> (Vec<Member>, Vec<String>) {
        self.extract(source, data, 0);
        (self.members, self.failures)
    }

    fn extract(&mut self, source: &str, data: &[u8], depth: usize) {
        let mut archive = match ZipArchive::new(Cursor::new(data)) {
            Ok(archive) => archive,
            Err(e) => {
                self.failures.push(format!("ZIP read failed ({}): {}", source, e));
                return;
            }
        };

        let encrypted = (0..archive.len())
            .any(|i| archive.by_index_raw(i).map(|f| f.encrypted()).unwrap_or(false));
        if encrypted {
            self.failures
                .push(format!("ZIP read failed ({}): encrypted archives are not supported", source));
            return;
        }

        for i in 0..archive.len() {
            if self.exhausted {
                return;
            }
            let mut entry = match archive.by_index(i) {
                Ok(entry) => entry,
                Err(e) => {
                    self.failures
                        .push(format!("ZIP entry read failed ({} #{}): {}", source, i + 1, e));
                    continue;
                }
            };
            if entry.is_dir() {
                continue;
            }
            let path = format!("{}/{}", source, entry.name().replace('\\', "/"));

            self.entries += 1;
            if self.entries > self.limits.max_entries {
                self.failures.push(format!(
                    "ZIP entry limit of {} reached at {}",
                    self.limits.max_entries, path
                ));
                self.exhausted = true;
                return;
            }
            if entry.size() > self.limits.max_entry_bytes {
                self.failures.push(format!("{} exceeds the member size limit", path));
                continue;
            }
            if self.total_bytes + entry.size() > self.limits.max_total_bytes {
                self.failures.push(format!("{} exceeds the total extraction limit", path));
                continue;
            }

            let mut buf = Vec::with_capacity(entry.size() as usize);
            if let Err(e) = (&mut entry)
                .take(self.limits.max_entry_bytes + 1)
                .read_to_end(&mut buf)
            {
                self.failures.push(format!("ZIP entry read failed ({}): {}", path, e));
                continue;
            }
            // Sizes in the central directory are not trusted.
            if buf.len() as u64 > self.limits.max_entry_bytes {
                self.failures.push(format!("{} exceeds the member size limit", path));
                continue;
            }
            self.total_bytes += buf.len() as u64;
            drop(entry);

            if path.to_ascii_lowercase().ends_with(".zip") {
                if depth + 1 > self.limits.max_depth {
                    self.failures
                        .push(format!("{} is nested deeper than {} archives", path, self.limits.max_depth));
                    continue;
                }
                self.extract(&path, &buf, depth + 1);
            } else {
                self.members.push(Member { path, data: buf });
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;

    pub fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::zip_with;
    use super::*;

    fn paths(members: &[Member]) -> Vec<&str> {
        members.iter().map(|m| m.path.as_str()).collect()
    }

    #[test]
    fn test_flat_archive() {
        let limits = MigrationConfig::default();
        let data = zip_with(&[("a.md", b"# A"), ("dir\\b.csv", b"x")]);
        let (members, failures) = Extractor::new(&limits).run("upload.zip", &data);
        assert!(failures.is_empty());
        assert_eq!(paths(&members), vec!["upload.zip/a.md", "upload.zip/dir/b.csv"]);
        assert_eq!(members[0].data, b"# A");
    }

    #[test]
    fn test_nested_archives_recurse() {
        let limits = MigrationConfig::default();
        let inner = zip_with(&[("page.md", b"hello")]);
        let middle = zip_with(&[("inner.zip", &inner)]);
        let outer = zip_with(&[("middle.zip", &middle), ("top.md", b"top")]);
        let (members, failures) = Extractor::new(&limits).run("upload.zip", &outer);
        assert!(failures.is_empty(), "{:?}", failures);
        assert_eq!(
            paths(&members),
            vec!["upload.zip/middle.zip/inner.zip/page.md", "upload.zip/top.md"]
        );
    }

    #[test]
    fn test_depth_limit() {
        let limits = MigrationConfig {
            max_depth: 1,
            ..Default::default()
        };
        let inner = zip_with(&[("page.md", b"hello")]);
        let middle = zip_with(&[("inner.zip", &inner), ("kept.md", b"k")]);
        let outer = zip_with(&[("middle.zip", &middle)]);
        let (members, failures) = Extractor::new(&limits).run("upload.zip", &outer);
        assert_eq!(paths(&members), vec!["upload.zip/middle.zip/kept.md"]);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("inner.zip"));
    }

    #[test]
    fn test_corrupt_nested_archive_is_one_failure() {
        let limits = MigrationConfig::default();
        let outer = zip_with(&[("broken.zip", b"not a zip"), ("ok.md", b"ok")]);
        let (members, failures) = Extractor::new(&limits).run("upload.zip", &outer);
        assert_eq!(paths(&members), vec!["upload.zip/ok.md"]);
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("upload.zip/broken.zip"));
    }

    #[test]
    fn test_size_and_entry_limits() {
        let limits = MigrationConfig {
            max_entry_bytes: 4,
            ..Default::default()
        };
        let data = zip_with(&[("big.md", b"too large"), ("small.md", b"ok")]);
        let (members, failures) = Extractor::new(&limits).run("upload.zip", &data);
        assert_eq!(paths(&members), vec!["upload.zip/small.md"]);
        assert_eq!(failures.len(), 1);

        let limits = MigrationConfig {
            max_entries: 2,
            ..Default::default()
        };
        let data = zip_with(&[("1.md", b"1"), ("2.md", b"2"), ("3.md", b"3"), ("4.md", b"4")]);
        let (members, failures) = Extractor::new(&limits).run("upload.zip", &data);
        assert_eq!(members.len(), 2);
        assert_eq!(failures.len(), 1);

        let limits = MigrationConfig {
            max_total_bytes: 5,
            ..Default::default()
        };
        let data = zip_with(&[("1.md", b"123"), ("2.md", b"456"), ("3.md", b"7")]);
        let (members, failures) = Extractor::new(&limits).run("upload.zip", &data);
        assert_eq!(paths(&members), vec!["upload.zip/1.md", "upload.zip/3.md"]);
        assert_eq!(failures.len(), 1);
    }

    /// Set general purpose flag bit 0 in every local and central header.
    fn mark_encrypted(mut data: Vec<u8>) -> Vec<u8> {
        let mut patched = 0;
        let mut i = 0;
        while i + 4 <= data.len() {
            let flag_at = match &data[i..i + 4] {
                b"PK\x03\x04" => Some(i + 6),
                b"PK\x01\x02" => Some(i + 8),
                _ => None,
            };
            if let Some(at) = flag_at {
                data[at] |= 0x01;
                patched += 1;
            }
            i += 1;
        }
        assert_eq!(patched, 4, "expected two local and two central headers");
        data
    }

    #[test]
    fn test_encrypted_archive_is_one_failure() {
        let limits = MigrationConfig::default();
        let data = mark_encrypted(zip_with(&[("a.md", b"secret"), ("b.md", b"more")]));
        let (members, failures) = Extractor::new(&limits).run("upload.zip", &data);
        assert!(members.is_empty());
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("encrypted"), "{}", failures[0]);
    }

    #[test]
    fn test_not_a_zip() {
        let limits = MigrationConfig::default();
        let (members, failures) = Extractor::new(&limits).run("upload.zip", b"plain");
        assert!(members.is_empty());
        assert_eq!(failures.len(), 1);
    }
}
