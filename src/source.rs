//! Source positions and the line-offset index for workflow documents.
//!
//! Every diagnostic in the compile pipeline carries a [`SourceLocation`] so
//! errors can point at the exact span in the original document. The
//! [`SourceMap`] owns the source text and a precomputed table of line start
//! offsets, making offset → (line, column) lookups O(log n).
//!
//! # Examples
//!
//! ```rust
//! use flowscript::source::SourceMap;
//!
//! let map = SourceMap::new("ab\ncd\n".to_string(), "demo.flow.md".to_string());
//! let pos = map.position_at(3);
//! assert_eq!(pos.line, 2);
//! assert_eq!(pos.column, 0);
//! assert_eq!(map.offset_at(pos.line, pos.column), 3);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position within a source document.
///
/// Lines are 1-indexed, columns are 0-indexed, and `offset` is the absolute
/// byte offset from the start of the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 1-indexed line number.
    pub line: u32,
    /// 0-indexed column (bytes from the start of the line).
    pub column: u32,
    /// Absolute byte offset from the start of the document.
    pub offset: usize,
}

impl Position {
    #[must_use]
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// The position at the very start of a document.
    #[must_use]
    pub fn start() -> Self {
        Self::new(1, 0, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open span `[start, end)` within a source document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub start: Position,
    pub end: Position,
}

impl SourceLocation {
    #[must_use]
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-width location at a single position.
    #[must_use]
    pub fn at(pos: Position) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// Source text plus the index of line start offsets.
///
/// Built once per document by the parser and shared (immutably) with every
/// later stage that needs to attach locations to diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    source: String,
    file_path: String,
    line_offsets: Vec<usize>,
}

impl SourceMap {
    /// Index `source`, recording the byte offset where each line begins.
    ///
    /// Both LF and CRLF line endings are handled; a CR that is part of CRLF
    /// belongs to the line it terminates.
    #[must_use]
    pub fn new(source: String, file_path: String) -> Self {
        let mut line_offsets = vec![0];
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_offsets.push(idx + 1);
            }
        }
        Self {
            source,
            file_path,
            line_offsets,
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_offsets.len()
    }

    /// Convert a byte offset into a [`Position`].
    ///
    /// Offsets past the end of the document clamp to the final position.
    /// Lookup is O(log n) over the line-offset table.
    #[must_use]
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.source.len());
        // partition_point yields the count of line starts <= offset; the
        // containing line is the last of those.
        let line_idx = self.line_offsets.partition_point(|&start| start <= offset) - 1;
        let column = offset - self.line_offsets[line_idx];
        Position {
            line: (line_idx + 1) as u32,
            column: column as u32,
            offset,
        }
    }

    /// Convert a (line, column) pair back into a byte offset.
    ///
    /// Out-of-range lines clamp to the last line; columns clamp to the line
    /// length, so `offset_at(position_at(o)) == o` holds for any in-range
    /// offset.
    #[must_use]
    pub fn offset_at(&self, line: u32, column: u32) -> usize {
        if line == 0 {
            return 0;
        }
        let line_idx = ((line - 1) as usize).min(self.line_offsets.len() - 1);
        let line_start = self.line_offsets[line_idx];
        let line_end = self
            .line_offsets
            .get(line_idx + 1)
            .copied()
            .unwrap_or(self.source.len());
        (line_start + column as usize).min(line_end)
    }

    /// A zero-width [`SourceLocation`] at the given byte offset.
    #[must_use]
    pub fn location_at(&self, offset: usize) -> SourceLocation {
        SourceLocation::at(self.position_at(offset))
    }

    /// A [`SourceLocation`] spanning `[start, end)` byte offsets.
    #[must_use]
    pub fn span(&self, start: usize, end: usize) -> SourceLocation {
        SourceLocation::new(self.position_at(start), self.position_at(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_has_one_line() {
        let map = SourceMap::new(String::new(), "x".into());
        assert_eq!(map.line_count(), 1);
        assert_eq!(map.position_at(0), Position::start());
    }

    #[test]
    fn position_round_trip() {
        let src = "first\nsecond line\r\nthird";
        let map = SourceMap::new(src.to_string(), "x".into());
        for offset in 0..=src.len() {
            let pos = map.position_at(offset);
            assert_eq!(map.offset_at(pos.line, pos.column), offset, "offset {offset}");
        }
    }

    #[test]
    fn clamps_past_end() {
        let map = SourceMap::new("ab".to_string(), "x".into());
        assert_eq!(map.position_at(100).offset, 2);
    }

    #[test]
    fn crlf_column_counts_cr() {
        let map = SourceMap::new("a\r\nb".to_string(), "x".into());
        // The CR at offset 1 is still on line 1.
        assert_eq!(map.position_at(1).line, 1);
        assert_eq!(map.position_at(3).line, 2);
        assert_eq!(map.position_at(3).column, 0);
    }
}
