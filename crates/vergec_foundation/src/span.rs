//! Source locations ("text regions") shared by every compiler pass.

use std::sync::Arc;

/// A half-open byte range in the expanded source, plus the line/column of its
/// first byte and the file it originated from.
///
/// Every AST node and token carries one. Spans are cheap to clone: the file
/// name is reference-counted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// Byte offset of the first byte covered by this span.
    pub start: usize,
    /// Byte offset one past the last byte covered by this span.
    pub end: usize,
    /// 1-indexed line of `start`.
    pub line: u32,
    /// 1-indexed column of `start`.
    pub column: u32,
    /// Originating file, as resolved through the file resolution map.
    pub file: Arc<str>,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub fn new(start: usize, end: usize, line: u32, column: u32, file: impl Into<Arc<str>>) -> Self {
        Self {
            start,
            end,
            line,
            column,
            file: file.into(),
        }
    }

    /// A zero-length span at the start of `file`, used as a placeholder.
    #[must_use]
    pub fn at_start(file: impl Into<Arc<str>>) -> Self {
        Self::new(0, 0, 1, 1, file)
    }

    /// Merges this span with another, producing a span that covers both.
    ///
    /// The line/column/file of `self` are kept; `other` is assumed to come
    /// later in the same file.
    #[must_use]
    pub fn to(&self, other: &Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
            line: self.line,
            column: self.column,
            file: self.file.clone(),
        }
    }

    /// The number of bytes this span covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// True if this span covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the text this span covers in `source`.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    /// True if `other` is wholly contained within `self` (used to check the
    /// "child region is a subrange of parent region" invariant).
    #[must_use]
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_new() {
        let span = Span::new(0, 3, 1, 1, "a.vg");
        assert_eq!(span.len(), 3);
        assert!(!span.is_empty());
    }

    #[test]
    fn span_to_merges() {
        let a = Span::new(0, 3, 1, 1, "a.vg");
        let b = Span::new(10, 14, 2, 1, "a.vg");
        let merged = a.to(&b);
        assert_eq!(merged.start, 0);
        assert_eq!(merged.end, 14);
        assert_eq!(merged.line, 1);
    }

    #[test]
    fn span_text() {
        let source = "let x = 1;";
        let span = Span::new(4, 5, 1, 5, "a.vg");
        assert_eq!(span.text(source), "x");
    }

    #[test]
    fn span_contains() {
        let parent = Span::new(0, 10, 1, 1, "a.vg");
        let child = Span::new(2, 5, 1, 3, "a.vg");
        let outside = Span::new(8, 12, 1, 9, "a.vg");
        assert!(parent.contains(&child));
        assert!(!parent.contains(&outside));
    }

    #[test]
    fn span_is_empty() {
        let span = Span::at_start("a.vg");
        assert!(span.is_empty());
    }
}
