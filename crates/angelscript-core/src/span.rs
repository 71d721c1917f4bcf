//! Source positions attached to tokens, AST nodes and diagnostics.

use std::fmt;

/// Position of a piece of source text.
///
/// Lines and columns are 1-based. `len` is the byte length of the covered
/// text on its first line, which is enough to underline a token in a
/// diagnostic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
    pub len: u32,
}

impl Span {
    #[inline]
    pub fn new(line: u32, col: u32, len: u32) -> Self {
        Self { line, col, len }
    }

    /// A zero-length span, used for end of input and synthesized nodes.
    #[inline]
    pub fn point(line: u32, col: u32) -> Self {
        Self { line, col, len: 0 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Span from the start of `self` to the end of `end`.
    ///
    /// When `end` is on a later line the result keeps `self`'s line and
    /// only grows by `end`'s length.
    pub fn to(self, end: Span) -> Span {
        if self.line == end.line {
            let start = self.col.min(end.col);
            let stop = (end.col + end.len).max(self.col + self.len);
            Span::new(self.line, start, stop - start)
        } else {
            Span::new(self.line, self.col, self.len + end.len)
        }
    }

    /// Shift the span by the line offset a script section was added with.
    #[inline]
    pub fn offset_lines(self, line_offset: i32) -> Span {
        let line = (self.line as i64 + line_offset as i64).max(1) as u32;
        Span { line, ..self }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_is_empty() {
        assert!(Span::point(4, 2).is_empty());
        assert!(!Span::new(4, 2, 3).is_empty());
    }

    #[test]
    fn to_covers_both_on_one_line() {
        let a = Span::new(1, 5, 3);
        let b = Span::new(1, 10, 3);
        let merged = a.to(b);
        assert_eq!(merged, Span::new(1, 5, 8));
        assert_eq!(b.to(a), Span::new(1, 5, 8));
    }

    #[test]
    fn to_across_lines_keeps_start() {
        let merged = Span::new(2, 7, 4).to(Span::new(5, 1, 2));
        assert_eq!(merged.line, 2);
        assert_eq!(merged.col, 7);
        assert_eq!(merged.len, 6);
    }

    #[test]
    fn line_offset_never_goes_below_one() {
        assert_eq!(Span::new(3, 1, 1).offset_lines(10).line, 13);
        assert_eq!(Span::new(3, 1, 1).offset_lines(-10).line, 1);
    }

    #[test]
    fn display_is_line_colon_col() {
        assert_eq!(Span::new(3, 15, 5).to_string(), "3:15");
    }
}
