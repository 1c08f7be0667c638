//! Zip archive traversal.
//!
//! The reader walks the central directory in order and materializes one
//! entry's bytes at a time, so memory stays bounded by the largest accepted
//! entry rather than the inflated archive.

use bytes::Bytes;
use std::io::{Cursor, Read};
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

/// Errors raised while reading an uploaded archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Upload is not a readable zip archive: {0}")]
    Format(#[from] ZipError),

    #[error("Failed to read archive entry {path}: {source}")]
    Entry {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive entry {path} is {size} bytes, above the {limit} byte limit")]
    EntryTooLarge { path: String, size: u64, limit: u64 },
}

/// A regular file inside an archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path relative to the archive root, `/` separated
    pub path: String,
    pub content: Bytes,
}

impl ArchiveEntry {
    /// Final path component; archive folders are flattened on upload
    pub fn file_name(&self) -> &str {
        base_name(&self.path)
    }
}

/// Opened archive over an in-memory buffer
pub struct ArchiveReader {
    archive: ZipArchive<Cursor<Bytes>>,
    max_entry_bytes: u64,
}

impl ArchiveReader {
    /// Parse the central directory of `buffer`
    pub fn open(buffer: Bytes, max_entry_bytes: u64) -> Result<Self, ArchiveError> {
        let archive = ZipArchive::new(Cursor::new(buffer))?;
        Ok(Self {
            archive,
            max_entry_bytes,
        })
    }

    /// Number of central directory records, directories included
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Single pass over the file entries, in archive order
    pub fn entries(&mut self) -> Entries<'_> {
        Entries {
            archive: &mut self.archive,
            max_entry_bytes: self.max_entry_bytes,
            index: 0,
        }
    }
}

/// Lazy iterator returned by [`ArchiveReader::entries`]
pub struct Entries<'a> {
    archive: &'a mut ZipArchive<Cursor<Bytes>>,
    max_entry_bytes: u64,
    index: usize,
}

impl Iterator for Entries<'_> {
    type Item = Result<ArchiveEntry, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.archive.len() {
            let index = self.index;
            self.index += 1;

            let mut file = match self.archive.by_index(index) {
                Ok(file) => file,
                Err(e) => return Some(Err(e.into())),
            };

            if file.is_dir() {
                continue;
            }

            let path = file.name().to_string();
            let size = file.size();
            if size > self.max_entry_bytes {
                return Some(Err(ArchiveError::EntryTooLarge {
                    path,
                    size,
                    limit: self.max_entry_bytes,
                }));
            }

            let mut buffer = Vec::with_capacity(size as usize);
            if let Err(source) = file.read_to_end(&mut buffer) {
                return Some(Err(ArchiveError::Entry { path, source }));
            }

            return Some(Ok(ArchiveEntry {
                path,
                content: Bytes::from(buffer),
            }));
        }

        None
    }
}

/// Last component of a `/` or `\` separated path
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}


#[cfg(test)]
mod tests {
    use super::test_support::build_zip;
    use super::*;

    #[test]
    fn test_entries_skip_directories_and_keep_order() {
        let zip = build_zip(&[
            ("model/", ""),
            ("model/statue.obj", "o statue"),
            ("model/statue.mtl", "newmtl stone"),
            ("readme.txt", "hello"),
        ]);

        let mut reader = ArchiveReader::open(Bytes::from(zip), 1024).unwrap();
        let entries: Vec<ArchiveEntry> = reader.entries().map(|e| e.unwrap()).collect();

        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["model/statue.obj", "model/statue.mtl", "readme.txt"]);
        assert_eq!(entries[0].file_name(), "statue.obj");
        assert_eq!(entries[0].content, Bytes::from_static(b"o statue"));
    }

    #[test]
    fn test_open_rejects_non_archive() {
        let result = ArchiveReader::open(Bytes::from_static(b"definitely not a zip"), 1024);
        assert!(matches!(result, Err(ArchiveError::Format(_))));
    }

    #[test]
    fn test_entry_above_limit_is_reported() {
        let content = "x".repeat(64);
        let zip = build_zip(&[("big.png", content.as_str())]);
        let mut reader = ArchiveReader::open(Bytes::from(zip), 16).unwrap();

        match reader.entries().next() {
            Some(Err(ArchiveError::EntryTooLarge { path, size, limit })) => {
                assert_eq!(path, "big.png");
                assert_eq!(size, 64);
                assert_eq!(limit, 16);
            }
            other => panic!("expected EntryTooLarge, got {:?}", other.map(|r| r.is_ok())),
        }
    }

    #[test]
    fn test_empty_archive_yields_nothing() {
        let zip = build_zip(&[]);
        let mut reader = ArchiveReader::open(Bytes::from(zip), 1024).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.entries().count(), 0);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/b/c.png"), "c.png");
        assert_eq!(base_name("win\\dir\\m.obj"), "m.obj");
        assert_eq!(base_name("flat.glb"), "flat.glb");
    }
}
