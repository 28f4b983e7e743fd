//! `UI!` region scanning.
//!
//! A region is the interior of one `UI!` macro call: everything between the
//! opening delimiter and its balanced closing delimiter. The scanner works on
//! raw text with no knowledge of Rust syntax, so a delimiter inside a string
//! literal still counts toward the depth.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// `UI!`, optional whitespace, then one of the three opening delimiters.
static TRIGGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"UI!\s*[\{\(\[]").unwrap());

/// Half-open byte span `[start, end)` of a `UI!` call's interior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// Offset just after the opening delimiter.
    pub start: usize,
    /// Offset of the matching closing delimiter.
    pub end: usize,
}

impl Region {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Whether `offset` lies inside the region. Both boundaries count as
    /// inside, so a cursor right before the closing delimiter is contained.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }
}

/// Find every balanced `UI!` region in `text`, in ascending order.
///
/// Unbalanced calls are skipped. Scanning resumes after the closing delimiter
/// of each emitted region, so regions never overlap.
pub fn scan(text: &str) -> Vec<Region> {
    let mut regions = Vec::new();
    let mut search_from = 0;

    while let Some(trigger) = TRIGGER.find_at(text, search_from) {
        let start = trigger.end();
        if start >= text.len() {
            break;
        }

        let open = text.as_bytes()[start - 1];
        match find_closing_delimiter(text, start, open) {
            Some(end) => {
                tracing::trace!(start, end, "found UI! region");
                regions.push(Region::new(start, end));
                search_from = end + 1;
            }
            None => {
                tracing::trace!(start, "no matching delimiter for UI! call");
                search_from = start;
            }
        }
    }

    regions
}

/// The closing delimiter paired with `open`.
fn closing_for(open: u8) -> u8 {
    match open {
        b'{' => b'}',
        b'(' => b')',
        _ => b']',
    }
}

/// Walk from `start` (just past an `open` delimiter) until the depth returns to
/// zero, returning the offset of the closing delimiter.
///
/// Delimiters are ASCII, so a byte walk never matches inside a multi-byte
/// character.
fn find_closing_delimiter(text: &str, start: usize, open: u8) -> Option<usize> {
    let close = closing_for(open);
    let mut depth = 1usize;

    for (i, &b) in text.as_bytes()[start..].iter().enumerate() {
        if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(start + i);
            }
        } else if b == open {
            depth += 1;
        }
    }
    None
}

/// The region containing `offset`, boundaries inclusive.
pub fn find_region_at(regions: &[Region], offset: usize) -> Option<&Region> {
    regions.iter().find(|r| r.contains(offset))
}
