//! The markup language service that virtual documents are delegated to.
//!
//! `MarkupService` is the seam: the server only ever talks to it in terms of
//! virtual documents and virtual positions. `ProxyMarkupService` forwards to
//! an external HTML language server; `DisabledMarkupService` answers nothing.

mod error;
mod proxy;
mod transport;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{
    CompletionContext, CompletionResponse, GotoDefinitionResponse, Hover, LinkedEditingRanges,
    Position, Url,
};

use crate::document::VirtualDocument;

pub use error::ProxyError;
pub use proxy::ProxyMarkupService;

/// What an auto-insertion request asks the markup service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutoInsertKind {
    /// Closing quotes after `=` in an attribute.
    #[serde(rename = "autoQuote")]
    AutoQuote,
    /// A closing tag after `>`, or the rest of a closing tag after `</`.
    #[serde(rename = "autoClose")]
    AutoClose,
}

/// HTML language features over virtual documents.
///
/// Positions and ranges are in the virtual document's coordinates. Every
/// method degrades to "no result" instead of failing.
#[tower_lsp::async_trait]
pub trait MarkupService: Send + Sync {
    /// Make the service's view of `doc` match its current content.
    async fn sync_document(&self, _doc: &VirtualDocument) {}

    /// Forget a virtual document that no longer exists.
    async fn close_document(&self, _uri: &Url) {}

    async fn hover(&self, _doc: &VirtualDocument, _position: Position) -> Option<Hover> {
        None
    }

    async fn completion(
        &self,
        _doc: &VirtualDocument,
        _position: Position,
        _context: Option<CompletionContext>,
    ) -> Option<CompletionResponse> {
        None
    }

    async fn definition(
        &self,
        _doc: &VirtualDocument,
        _position: Position,
    ) -> Option<GotoDefinitionResponse> {
        None
    }

    async fn linked_editing_ranges(
        &self,
        _doc: &VirtualDocument,
        _position: Position,
    ) -> Option<LinkedEditingRanges> {
        None
    }

    /// Snippet text to insert at `position`, possibly with a `$0` cursor
    /// placeholder.
    async fn auto_insert(
        &self,
        _doc: &VirtualDocument,
        _position: Position,
        _kind: AutoInsertKind,
    ) -> Option<String> {
        None
    }

    /// Release the service on server shutdown.
    async fn shutdown(&self) {}
}

/// A markup service that never answers. Used when no HTML language server
/// could be started.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledMarkupService;

impl MarkupService for DisabledMarkupService {}
