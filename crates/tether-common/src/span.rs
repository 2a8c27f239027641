use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Byte range into the source text the binder was run over.
///
/// Bound programs arrive without syntax trees, so a span is the only link
/// from a lowered construct back to what the user wrote. Programs assembled
/// in memory (tests, generated code) use [`Span::DUMMY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const DUMMY: Span = Span { start: 0, end: 0 };

    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Self { start, end }
    }

    /// Range clamped into a source of `source_len` bytes, never empty unless
    /// the source itself is. Diagnostic renderers need at least one byte to
    /// underline.
    pub fn clamped(&self, source_len: usize) -> Range<usize> {
        let s = (self.start as usize).min(source_len);
        let e = (self.end as usize).min(source_len).max(s);
        if s == e {
            s..(e + 1).min(source_len)
        } else {
            s..e
        }
    }
}

/// Line start offsets for one source file, for turning spans into
/// `line:column` positions.
#[derive(Debug)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(
                source
                    .bytes()
                    .enumerate()
                    .filter(|&(_, b)| b == b'\n')
                    .map(|(i, _)| (i + 1) as u32),
            )
            .collect();
        Self { line_starts }
    }

    /// 1-based (line, column) of a byte offset. Columns count bytes.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line_idx = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        (line_idx as u32 + 1, offset - self.line_starts[line_idx] + 1)
    }

    /// `line:col` for the start of a span.
    pub fn describe(&self, span: Span) -> String {
        let (line, col) = self.line_col(span.start);
        format!("{line}:{col}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_is_never_empty_inside_source() {
        assert_eq!(Span::new(3, 3).clamped(10), 3..4);
        assert_eq!(Span::new(8, 40).clamped(10), 8..10);
        assert_eq!(Span::new(50, 60).clamped(10), 10..10);
    }

    #[test]
    fn line_col_across_lines() {
        let idx = LineIndex::new("using r\n{\n  body\n}");
        assert_eq!(idx.line_col(0), (1, 1));
        assert_eq!(idx.line_col(7), (1, 8));
        assert_eq!(idx.line_col(8), (2, 1));
        assert_eq!(idx.line_col(12), (3, 3));
        assert_eq!(idx.line_col(17), (4, 1));
        assert_eq!(idx.describe(Span::new(12, 16)), "3:3");
    }

    #[test]
    fn span_deserializes_from_json() {
        let span: Span = serde_json::from_str(r#"{"start": 2, "end": 9}"#).unwrap();
        assert_eq!(span, Span::new(2, 9));
    }
}
