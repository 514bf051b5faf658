//! Position and Range types for LSP integration
//!
//! This module provides wrapper types for LSP positions and ranges. Columns are
//! counted in UTF-16 code units, which is what LSP clients expect by default.

use tower_lsp::lsp_types::{Position as LspPosition, Range as LspRange};

/// A position in a document (line, column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position(pub LspPosition);

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Position(LspPosition::new(line, character))
    }

    pub fn line(&self) -> u32 {
        self.0.line
    }

    pub fn character(&self) -> u32 {
        self.0.character
    }
}

impl From<LspPosition> for Position {
    fn from(pos: LspPosition) -> Self {
        Position(pos)
    }
}

impl From<Position> for LspPosition {
    fn from(pos: Position) -> Self {
        pos.0
    }
}

/// A range in a document (start and end positions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range(pub LspRange);

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Range(LspRange::new(start.0, end.0))
    }

    /// Range on a single line between two UTF-16 columns
    pub fn on_line(line: u32, start: u32, end: u32) -> Self {
        Range::new(Position::new(line, start), Position::new(line, end))
    }

    pub fn start(&self) -> Position {
        Position(self.0.start)
    }

    pub fn end(&self) -> Position {
        Position(self.0.end)
    }

    /// Check if a position lies strictly between the bounds
    pub fn strictly_contains(&self, pos: Position) -> bool {
        pos > self.start() && pos < self.end()
    }

    /// True when `other` lies entirely inside this range
    pub fn encloses(&self, other: &Range) -> bool {
        other.start() >= self.start() && other.end() <= self.end()
    }
}

impl From<Range> for LspRange {
    fn from(range: Range) -> Self {
        range.0
    }
}

impl From<LspRange> for Range {
    fn from(range: LspRange) -> Self {
        Range(range)
    }
}

/// Convert a byte offset within `line` to a UTF-16 column
pub fn utf16_column(line: &str, byte_offset: usize) -> u32 {
    let end = byte_offset.min(line.len());
    line[..end].encode_utf16().count() as u32
}

/// Convert a UTF-16 column back to a byte offset within `line`
///
/// Columns past the end of the line clamp to the line length.
pub fn byte_offset(line: &str, column: u32) -> usize {
    let mut units = 0u32;
    for (idx, ch) in line.char_indices() {
        if units >= column {
            return idx;
        }
        units += ch.len_utf16() as u32;
    }
    line.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_line_then_column() {
        assert!(Position::new(1, 0) > Position::new(0, 40));
        assert!(Position::new(2, 3) < Position::new(2, 4));
    }

    #[test]
    fn containment() {
        let range = Range::on_line(3, 4, 10);
        assert!(!range.strictly_contains(Position::new(3, 4)));
        assert!(range.strictly_contains(Position::new(3, 5)));
        assert!(!range.strictly_contains(Position::new(2, 5)));
        assert!(!range.strictly_contains(Position::new(3, 10)));
        assert!(Range::on_line(3, 0, 20).encloses(&range));
        assert!(!range.encloses(&Range::on_line(3, 0, 20)));
    }

    #[test]
    fn utf16_columns_round_trip_through_multibyte_text() {
        let line = "set {é} to foo(1)";
        let byte = line.find("foo").unwrap();
        let col = utf16_column(line, byte);
        assert_eq!(col, 11);
        assert_eq!(byte_offset(line, col), byte);
        assert_eq!(byte_offset(line, 500), line.len());
    }
}
