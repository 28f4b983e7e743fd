//! Text snapshots and position conversion.
//!
//! Byte offsets are what the region scanner produces; LSP positions count
//! UTF-16 code units per line. `LineIndex` owns one text snapshot and converts
//! between the two.

use std::ops::Range as Span;

use tower_lsp::lsp_types::{Position, Range, TextDocumentContentChangeEvent};

/// Line start table over an owned text snapshot.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the first character of every line.
    line_starts: Vec<usize>,
    text: String,
}

impl LineIndex {
    pub fn new(text: String) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { line_starts, text }
    }

    /// The indexed text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Byte length of the indexed text.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte span `[start, end)` of line `line`, excluding its newline.
    fn line_span(&self, line: usize) -> Span<usize> {
        let start = self.line_starts[line];
        let end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        start..end
    }

    /// Convert a byte offset to an LSP position. Offsets past the end clamp to
    /// the end of the text.
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let span = self.line_span(line);

        let character: usize = self.text[span.start..offset.min(span.end).max(span.start)]
            .chars()
            .map(char::len_utf16)
            .sum();

        Position::new(line as u32, character as u32)
    }

    /// Convert an LSP position to a byte offset.
    ///
    /// Returns `None` for a line past the end. A character past the end of its
    /// line resolves to the end of that line.
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return None;
        }
        let span = self.line_span(line);

        let mut units = 0u32;
        for (i, c) in self.text[span.clone()].char_indices() {
            if units >= position.character {
                return Some(span.start + i);
            }
            units += c.len_utf16() as u32;
        }
        Some(span.end)
    }

    /// Convert an LSP range to a byte span.
    pub fn range_to_span(&self, range: Range) -> Option<Span<usize>> {
        let start = self.position_to_offset(range.start)?;
        let end = self.position_to_offset(range.end)?;
        (start <= end).then_some(start..end)
    }
}

/// Apply incremental content changes, in order, to `text`.
///
/// A change without a range replaces the whole text. A change whose range
/// cannot be resolved against the current text is skipped.
pub fn apply_content_changes(text: &str, changes: &[TextDocumentContentChangeEvent]) -> String {
    let mut current = text.to_string();
    for change in changes {
        let Some(range) = change.range else {
            current = change.text.clone();
            continue;
        };
        let index = LineIndex::new(current);
        match index.range_to_span(range) {
            Some(span) => {
                let mut next = String::with_capacity(index.len() + change.text.len());
                next.push_str(&index.text()[..span.start]);
                next.push_str(&change.text);
                next.push_str(&index.text()[span.end..]);
                current = next;
            }
            None => {
                tracing::warn!(?range, "ignoring content change with unresolvable range");
                current = index.text;
            }
        }
    }
    current
}
