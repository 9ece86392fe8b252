use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::hash::hash_file;
use crate::ignore::IgnoreSet;

/// A work item describing one file sighting: identity, cheap stat fields,
/// and the content hash used as the change key.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    /// Last modification time, milliseconds since the Unix epoch.
    pub mtime_ms: i64,
    /// Lower-hex SHA-256 of the file bytes; empty when the file could not
    /// be read.
    pub hash: String,
}

/// Recursive directory scanner feeding the indexing pipeline.
///
/// Symlinks are not followed (loop safety), unreadable entries are skipped
/// with a diagnostic, and ignored directories are pruned before descent.
pub struct Scanner {
    ignore: IgnoreSet,
}

impl Scanner {
    /// Builds a scanner with the default ignore set plus any patterns found
    /// in `<root>/.kestr_ignore`.
    pub fn new(root: &Path) -> Self {
        let mut ignore = IgnoreSet::new();
        ignore.add_defaults();
        ignore.load(&root.join(".kestr_ignore"));
        Self { ignore }
    }

    pub fn with_ignore(ignore: IgnoreSet) -> Self {
        Self { ignore }
    }

    /// Walks `root` and invokes `callback` with a `FileInfo` for every
    /// eligible regular file.
    pub fn scan<F: FnMut(FileInfo)>(&self, root: &Path, mut callback: F) {
        if !root.is_dir() {
            log::warn!("scan root is not a directory: {}", root.display());
            return;
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.ignore.check(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("scan: skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match file_info(entry.path()) {
                Some(info) => callback(info),
                None => log::debug!("scan: failed to stat {}", entry.path().display()),
            }
        }
    }

    /// Collects all eligible files into a vector. Convenience wrapper used
    /// by the bootstrap scan and the `reindex` request.
    pub fn scan_all(&self, root: &Path) -> Vec<FileInfo> {
        let mut files = Vec::new();
        self.scan(root, |info| files.push(info));
        files
    }
}

/// Stats and hashes a single path into a `FileInfo`. Returns `None` when
/// the file vanished or cannot be stat'ed; a read failure during hashing
/// still produces an item, with an empty ("unknown") hash.
pub fn file_info(path: &Path) -> Option<FileInfo> {
    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }

    let mtime_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Some(FileInfo {
        path: path.to_path_buf(),
        size: metadata.len(),
        mtime_ms,
        hash: hash_file(path),
    })
}
