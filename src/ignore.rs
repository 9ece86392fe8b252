//! Glob-based ignore matching for the scanner and watcher.
//!
//! Patterns match against path *basenames*, so `.git` prunes any `.git`
//! directory regardless of depth and `*.o` skips object files anywhere in
//! the tree. When a directory matches, the scanner prunes its entire
//! subtree before descent.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Built-in ignores: VCS metadata, build outputs, common binaries, OS junk,
/// and the daemon's own state files.
const DEFAULT_PATTERNS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "build",
    "dist",
    "node_modules",
    "target",
    "*.o",
    "*.obj",
    "*.exe",
    "*.dll",
    "*.so",
    "*.dylib",
    ".DS_Store",
    "Thumbs.db",
    "kestr.db",
    "kestr.db-journal",
    "kestr.db-wal",
    "kestr.db-shm",
    "kestrd.log",
    "config.json",
];

/// A compiled set of ignore globs.
pub struct IgnoreSet {
    globs: Vec<Glob>,
    set: GlobSet,
}

impl IgnoreSet {
    pub fn new() -> Self {
        Self {
            globs: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// Appends the built-in pattern list.
    pub fn add_defaults(&mut self) {
        for pattern in DEFAULT_PATTERNS {
            self.add_pattern(pattern);
        }
        self.rebuild();
    }

    /// Appends patterns from an ignore file, one glob per line.
    ///
    /// Blank lines and lines starting with `#` are skipped; surrounding
    /// ASCII whitespace is trimmed. A missing file is not an error.
    pub fn load(&mut self, path: &Path) {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };

        for line in content.lines() {
            let line = line.trim_matches(|c| c == ' ' || c == '\t');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.add_pattern(line);
        }
        self.rebuild();
    }

    /// Returns true if the path's basename matches any pattern.
    pub fn check(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => self.set.is_match(Path::new(name)),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.globs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    fn add_pattern(&mut self, pattern: &str) {
        match Glob::new(pattern) {
            Ok(glob) => self.globs.push(glob),
            Err(e) => log::warn!("ignoring invalid glob pattern {:?}: {}", pattern, e),
        }
    }

    fn rebuild(&mut self) {
        let mut builder = GlobSetBuilder::new();
        for glob in &self.globs {
            builder.add(glob.clone());
        }
        match builder.build() {
            Ok(set) => self.set = set,
            Err(e) => log::warn!("failed to compile ignore set: {}", e),
        }
    }
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn defaults() -> IgnoreSet {
        let mut set = IgnoreSet::new();
        set.add_defaults();
        set
    }

    #[test]
    fn star_glob_is_anchored() {
        let set = defaults();
        assert!(set.check(Path::new("foo.o")));
        assert!(!set.check(Path::new("foo.ocaml")));
    }

    #[test]
    fn literal_names_match_exactly() {
        let set = defaults();
        assert!(set.check(Path::new(".git")));
        assert!(!set.check(Path::new("git")));
        assert!(set.check(Path::new("node_modules")));
    }

    #[test]
    fn matches_basename_at_any_depth() {
        let set = defaults();
        assert!(set.check(&PathBuf::from("/repo/deep/nested/.git")));
        assert!(set.check(&PathBuf::from("src/out/main.o")));
        assert!(!set.check(&PathBuf::from("/repo/src/main.rs")));
    }

    #[test]
    fn own_state_files_are_ignored() {
        let set = defaults();
        assert!(set.check(Path::new("kestr.db")));
        assert!(set.check(Path::new("kestr.db-journal")));
    }

    #[test]
    fn load_skips_comments_and_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".kestr_ignore");
        std::fs::write(&file, "# generated artifacts\n\n  *.tmp  \nsecrets\n").unwrap();

        let mut set = IgnoreSet::new();
        set.load(&file);

        assert_eq!(set.len(), 2);
        assert!(set.check(Path::new("scratch.tmp")));
        assert!(set.check(Path::new("secrets")));
        assert!(!set.check(Path::new("# generated artifacts")));
    }

    #[test]
    fn missing_ignore_file_is_not_an_error() {
        let mut set = IgnoreSet::new();
        set.load(Path::new("/nonexistent/.kestr_ignore"));
        assert!(set.is_empty());
    }

    #[test]
    fn question_mark_matches_single_character() {
        let mut set = IgnoreSet::new();
        set.add_pattern("?.log");
        set.rebuild();
        assert!(set.check(Path::new("a.log")));
        assert!(!set.check(Path::new("ab.log")));
    }
}
