//! Virtual HTML documents derived from `UI!` regions.
//!
//! Two views are produced from one scan:
//! - a masked document with the host's exact byte length and line layout,
//!   everything outside the regions blanked to spaces, and
//! - one virtual document per region holding just that region's text, with
//!   `host = region.start + virtual` as its translation rule.
//!
//! Feature requests are routed through the per-region documents. The masked
//! view is served to clients that want to inspect the whole derived document.

use tower_lsp::lsp_types::Url;

use super::region::Region;
use super::text::LineIndex;

/// URI scheme under which virtual documents are addressed.
pub const VIRTUAL_SCHEME: &str = "embedded-content";

/// Language kind of the synthesized content, used as URI authority and suffix.
const VIRTUAL_LANGUAGE: &str = "html";

/// Blank every byte of `text` outside `regions`, keeping newlines.
///
/// The output has the same byte length as `text`. Regions must be ascending
/// and disjoint; a region that overlaps its predecessor, runs backwards, or
/// does not fall on character boundaries is skipped.
///
/// A multi-byte character becomes one space per byte, so UTF-16 columns in
/// the masked view only line up with the host where everything before them
/// on the line is ASCII. Feature routing goes through the per-region
/// documents and never reads positions from this view.
pub fn synthesize(text: &str, regions: &[Region]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;

    for region in regions {
        let end = region.end.min(text.len());
        if region.start < last_end
            || region.start > end
            || !text.is_char_boundary(region.start)
            || !text.is_char_boundary(end)
        {
            tracing::warn!(?region, last_end, "skipping malformed region while masking");
            continue;
        }
        push_blank(&mut out, &text[last_end..region.start]);
        out.push_str(&text[region.start..end]);
        last_end = end;
    }
    push_blank(&mut out, &text[last_end..]);

    out
}

fn push_blank(out: &mut String, s: &str) {
    for c in s.chars() {
        if c == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        }
    }
}

/// A decoded virtual document URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualUri {
    /// The masked whole-document view of `host`.
    Masked { host: Url },
    /// The `index`-th region of `host`.
    Region { host: Url, index: usize },
}

impl VirtualUri {
    pub fn host(&self) -> &Url {
        match self {
            VirtualUri::Masked { host } | VirtualUri::Region { host, .. } => host,
        }
    }
}

/// `embedded-content://html/<encoded host>.html`
pub fn masked_uri(host: &Url) -> Option<Url> {
    let encoded = urlencoding::encode(host.as_str());
    Url::parse(&format!(
        "{VIRTUAL_SCHEME}://{VIRTUAL_LANGUAGE}/{encoded}.{VIRTUAL_LANGUAGE}"
    ))
    .ok()
}

/// `embedded-content://html/<encoded host>/<index>.html`
pub fn region_uri(host: &Url, index: usize) -> Option<Url> {
    let encoded = urlencoding::encode(host.as_str());
    Url::parse(&format!(
        "{VIRTUAL_SCHEME}://{VIRTUAL_LANGUAGE}/{encoded}/{index}.{VIRTUAL_LANGUAGE}"
    ))
    .ok()
}

/// Reverse [`masked_uri`] or [`region_uri`].
pub fn decode_virtual_uri(uri: &Url) -> Option<VirtualUri> {
    if uri.scheme() != VIRTUAL_SCHEME || uri.host_str() != Some(VIRTUAL_LANGUAGE) {
        return None;
    }
    let path = uri
        .path()
        .strip_prefix('/')?
        .strip_suffix(".html")?;

    let (encoded, index) = match path.split_once('/') {
        Some((encoded, index)) => (encoded, Some(index.parse().ok()?)),
        None => (path, None),
    };
    let host = Url::parse(&urlencoding::decode(encoded).ok()?).ok()?;

    Some(match index {
        Some(index) => VirtualUri::Region { host, index },
        None => VirtualUri::Masked { host },
    })
}

/// The text of one region, addressable on its own.
#[derive(Debug, Clone)]
pub struct VirtualDocument {
    uri: Url,
    region: Region,
    line_index: LineIndex,
}

impl VirtualDocument {
    /// Build the virtual document for the `index`-th region of `host_text`.
    pub fn new(host: &Url, index: usize, region: Region, host_text: &str) -> Option<Self> {
        let content = host_text.get(region.span())?.to_string();
        Some(Self {
            uri: region_uri(host, index)?,
            region,
            line_index: LineIndex::new(content),
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn content(&self) -> &str {
        self.line_index.text()
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    /// Map a host offset into this document, if the region contains it.
    pub fn to_virtual_offset(&self, host_offset: usize) -> Option<usize> {
        self.region
            .contains(host_offset)
            .then(|| host_offset - self.region.start)
    }

    /// Map an offset in this document back to the host.
    pub fn to_host_offset(&self, virtual_offset: usize) -> usize {
        self.region.start + virtual_offset.min(self.region.len())
    }
}
