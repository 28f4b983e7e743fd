//! LSP feature implementations over virtual documents.
//!
//! - `features`: routing of host requests into the markup service
//! - `translate`: mapping markup results back to host coordinates
//!
//! Also defines the custom requests the server answers beyond the standard
//! protocol.

pub mod features;
pub mod translate;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{Position, TextDocumentIdentifier, Url};

use crate::markup::AutoInsertKind;

/// Method name of the virtual content request.
pub const VIRTUAL_CONTENT_METHOD: &str = "uibeam/virtualContent";

/// Method name of the auto-insert request.
pub const AUTO_INSERT_METHOD: &str = "uibeam/autoInsert";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualContentParams {
    pub uri: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualContentResponse {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoInsertParams {
    pub kind: AutoInsertKind,
    pub text_document: TextDocumentIdentifier,
    pub position: Position,
}
