//! Per-document state and the session that owns it.

use std::sync::Arc;

use dashmap::DashMap;
use tower_lsp::lsp_types::{Position, Range, Url};

use super::region::{find_region_at, scan, Region};
use super::text::LineIndex;
use super::virtual_doc::{synthesize, VirtualDocument};

/// A host Rust document at one version, with everything derived from it.
#[derive(Debug, Clone)]
pub struct DocumentState {
    /// Host document URI.
    pub uri: Url,
    /// Version reported by the client for this snapshot.
    pub version: i32,
    /// Line index over the host text.
    pub line_index: LineIndex,
    /// `UI!` regions, ascending.
    pub regions: Vec<Region>,
    /// One virtual document per region, same order as `regions`.
    pub virtual_documents: Vec<VirtualDocument>,
}

impl DocumentState {
    /// Scan `text` and derive the virtual documents for this version.
    pub fn new(uri: Url, text: String, version: i32) -> Self {
        let regions = scan(&text);
        let virtual_documents = regions
            .iter()
            .enumerate()
            .filter_map(|(index, region)| VirtualDocument::new(&uri, index, *region, &text))
            .collect();

        Self {
            uri,
            version,
            line_index: LineIndex::new(text),
            regions,
            virtual_documents,
        }
    }

    /// The host text.
    pub fn text(&self) -> &str {
        self.line_index.text()
    }

    /// Whether the document contains any `UI!` region.
    pub fn has_regions(&self) -> bool {
        !self.virtual_documents.is_empty()
    }

    /// The region containing `position`, if any.
    pub fn region_at(&self, position: Position) -> Option<&Region> {
        let offset = self.line_index.position_to_offset(position)?;
        find_region_at(&self.regions, offset)
    }

    /// The virtual document containing the host `position`, together with
    /// that position translated into the virtual document.
    pub fn virtual_document_at(&self, position: Position) -> Option<(&VirtualDocument, Position)> {
        let offset = self.line_index.position_to_offset(position)?;
        self.virtual_documents.iter().find_map(|doc| {
            let virtual_offset = doc.to_virtual_offset(offset)?;
            Some((doc, doc.line_index().offset_to_position(virtual_offset)))
        })
    }

    /// Look up one of this document's virtual documents by URI.
    pub fn virtual_document(&self, uri: &Url) -> Option<&VirtualDocument> {
        self.virtual_documents.iter().find(|doc| doc.uri() == uri)
    }

    /// Translate a position inside `doc` back to the host document.
    pub fn to_host_position(&self, doc: &VirtualDocument, position: Position) -> Option<Position> {
        let virtual_offset = doc.line_index().position_to_offset(position)?;
        Some(
            self.line_index
                .offset_to_position(doc.to_host_offset(virtual_offset)),
        )
    }

    /// Translate a range inside `doc` back to the host document.
    pub fn to_host_range(&self, doc: &VirtualDocument, range: Range) -> Option<Range> {
        Some(Range::new(
            self.to_host_position(doc, range.start)?,
            self.to_host_position(doc, range.end)?,
        ))
    }

    /// The masked whole-document view.
    pub fn masked_content(&self) -> String {
        synthesize(self.text(), &self.regions)
    }
}

/// URIs of `previous`'s virtual documents that `current` no longer has.
///
/// With no `current` state (the host was closed or reopened), every virtual
/// document of `previous` has vanished.
pub fn vanished_uris(previous: &DocumentState, current: Option<&DocumentState>) -> Vec<Url> {
    previous
        .virtual_documents
        .iter()
        .map(VirtualDocument::uri)
        .filter(|uri| current.map_or(true, |state| state.virtual_document(uri).is_none()))
        .cloned()
        .collect()
}

/// Open documents, keyed by URI.
///
/// Entries are replaced wholesale on every change and removed on close.
#[derive(Debug, Default)]
pub struct Session {
    documents: DashMap<Url, Arc<DocumentState>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
        }
    }

    /// Open a document, or replace its state. Returns the new state and the
    /// state it replaced.
    pub fn open(
        &self,
        uri: Url,
        text: String,
        version: i32,
    ) -> (Arc<DocumentState>, Option<Arc<DocumentState>>) {
        let state = Arc::new(DocumentState::new(uri.clone(), text, version));
        tracing::debug!(
            %uri,
            version,
            regions = state.regions.len(),
            "derived virtual documents"
        );
        let previous = self.documents.insert(uri, Arc::clone(&state));
        (state, previous)
    }

    /// Replace a document's text at a new version.
    ///
    /// Same as [`Session::open`]; kept separate so call sites read as the
    /// lifecycle they implement.
    pub fn update(
        &self,
        uri: Url,
        text: String,
        version: i32,
    ) -> (Arc<DocumentState>, Option<Arc<DocumentState>>) {
        self.open(uri, text, version)
    }

    /// Close a document, returning its last state.
    pub fn close(&self, uri: &Url) -> Option<Arc<DocumentState>> {
        self.documents.remove(uri).map(|(_, state)| state)
    }

    /// The current state of a document.
    pub fn get(&self, uri: &Url) -> Option<Arc<DocumentState>> {
        self.documents.get(uri).map(|r| Arc::clone(&r))
    }

    /// Whether `version` is still the live version of `uri`.
    pub fn is_current(&self, uri: &Url, version: i32) -> bool {
        self.documents
            .get(uri)
            .is_some_and(|state| state.version == version)
    }

    /// Number of open documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
