//! Line-window chunker.
//!
//! Splits file content into overlapping windows of whole lines. Line-based
//! windows keep chunk boundaries stable across unrelated edits and give
//! every chunk an exact `[start, end]` line range for result display.
//!
//! Windows advance by `chunk_size - overlap` lines, so consecutive chunks
//! share `overlap` lines of context. The final window may be shorter.

/// A contiguous line window of a source file; the unit of indexing and
/// retrieval. Line numbers are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub start_line: i64,
    pub end_line: i64,
}

/// Splits `content` into line windows of at most `chunk_size` lines with
/// `overlap` shared lines between consecutive windows.
///
/// Empty input yields no chunks. A file with fewer lines than `chunk_size`
/// yields exactly one chunk covering all lines. Each chunk's text is its
/// lines joined with `\n` plus a trailing `\n`.
///
/// Callers must uphold `overlap < chunk_size`; the config layer validates
/// this before the chunker ever runs.
pub fn chunk_lines(content: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    debug_assert!(chunk_size > 0 && overlap < chunk_size);

    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(lines.len());

        let mut text = String::new();
        for line in &lines[start..end] {
            text.push_str(line);
            text.push('\n');
        }

        chunks.push(Chunk {
            content: text,
            start_line: (start + 1) as i64,
            end_line: end as i64,
        });

        if end == lines.len() {
            break;
        }
        start += chunk_size - overlap;
    }

    chunks
}
