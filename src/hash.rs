//! Content hashing for change detection.
//!
//! Files are identified by the SHA-256 digest of their full byte stream.
//! The scanner compares this digest against the one stored in the database
//! to decide whether a file needs re-indexing, so a restored file with
//! identical bytes is never re-processed even if its mtime changed.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Streaming SHA-256 hasher producing lower-hex digests.
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Consumes the hasher and returns the 64-character lower-hex digest.
    pub fn finalize(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a file's contents, streaming in 64 KiB blocks.
///
/// Returns an empty string if the file cannot be read; callers treat an
/// empty digest as "unknown", which always compares unequal to a stored
/// hash and therefore forces re-indexing on the next successful read.
pub fn hash_file(path: &Path) -> String {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("hash_file: cannot open {}: {}", path.display(), e);
            return String::new();
        }
    };

    let mut hasher = ContentHasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) => {
                log::debug!("hash_file: read error on {}: {}", path.display(), e);
                return String::new();
            }
        }
    }
    hasher.finalize()
}
