//! Source location tracking

use std::fmt;

/// Source position (line and column)
///
/// Both coordinates are 1-indexed, the way an editor shows them. Source
/// maps store 0-indexed coordinates; use [`Position::to_zero_based`] and
/// [`Position::from_zero_based`] at that boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl Position {
    /// Create a new position
    #[inline]
    pub fn new(
        line: usize,
        column: usize,
    ) -> Self {
        Self { line, column }
    }

    /// Position of the first character of a source
    #[inline]
    pub fn start() -> Self {
        Self { line: 1, column: 1 }
    }

    /// Convert to 0-indexed `(line, column)`
    #[inline]
    pub fn to_zero_based(self) -> (u32, u32) {
        (
            self.line.saturating_sub(1) as u32,
            self.column.saturating_sub(1) as u32,
        )
    }

    /// Build from 0-indexed coordinates
    #[inline]
    pub fn from_zero_based(
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            line: line as usize + 1,
            column: column as usize + 1,
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Position {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
