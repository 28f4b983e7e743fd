//! Host documents and the virtual documents derived from them.
//!
//! This module provides:
//! - `scan` and `Region` for locating `UI!` macro interiors
//! - `synthesize` and `VirtualDocument` for the masked and per-region views
//! - `LineIndex` for byte offset <-> LSP position conversion
//! - `DocumentState` and `Session` for the document lifecycle

mod region;
mod state;
mod text;
mod virtual_doc;

pub use region::{find_region_at, scan, Region};
pub use state::{vanished_uris, DocumentState, Session};
pub use text::{apply_content_changes, LineIndex};
pub use virtual_doc::{
    decode_virtual_uri, masked_uri, region_uri, synthesize, VirtualDocument, VirtualUri,
    VIRTUAL_SCHEME,
};
