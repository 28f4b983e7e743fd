//! Routing of host requests to the markup service.
//!
//! Each feature follows the same path: find the virtual document under the
//! host position, bring the markup service up to date with it, ask, then
//! discard the answer if the host document moved on while we waited.

use tower_lsp::lsp_types::*;

use super::translate;
use crate::document::{decode_virtual_uri, DocumentState, Session, VirtualUri};
use crate::markup::{AutoInsertKind, MarkupService};

/// Whether `state` is still the session's live version of its document.
fn still_current(session: &Session, state: &DocumentState) -> bool {
    let current = session.is_current(&state.uri, state.version);
    if !current {
        tracing::debug!(uri = %state.uri, version = state.version, "dropping stale result");
    }
    current
}

pub async fn hover(
    session: &Session,
    markup: &dyn MarkupService,
    uri: &Url,
    position: Position,
) -> Option<Hover> {
    let state = session.get(uri)?;
    let (doc, virtual_position) = state.virtual_document_at(position)?;

    markup.sync_document(doc).await;
    let hover = markup.hover(doc, virtual_position).await?;

    still_current(session, &state).then(|| translate::hover_to_host(&state, doc, hover))
}

pub async fn completion(
    session: &Session,
    markup: &dyn MarkupService,
    uri: &Url,
    position: Position,
    context: Option<CompletionContext>,
) -> Option<CompletionResponse> {
    let state = session.get(uri)?;
    let (doc, virtual_position) = state.virtual_document_at(position)?;

    markup.sync_document(doc).await;
    let response = markup.completion(doc, virtual_position, context).await?;

    still_current(session, &state)
        .then(|| translate::completion_to_host(&state, doc, response))
}

pub async fn definition(
    session: &Session,
    markup: &dyn MarkupService,
    uri: &Url,
    position: Position,
) -> Option<GotoDefinitionResponse> {
    let state = session.get(uri)?;
    let (doc, virtual_position) = state.virtual_document_at(position)?;

    markup.sync_document(doc).await;
    let response = markup.definition(doc, virtual_position).await?;

    still_current(session, &state)
        .then(|| translate::definition_to_host(&state, doc, response))
}

pub async fn linked_editing_ranges(
    session: &Session,
    markup: &dyn MarkupService,
    uri: &Url,
    position: Position,
) -> Option<LinkedEditingRanges> {
    let state = session.get(uri)?;
    let (doc, virtual_position) = state.virtual_document_at(position)?;

    markup.sync_document(doc).await;
    let ranges = markup.linked_editing_ranges(doc, virtual_position).await?;

    if !still_current(session, &state) {
        return None;
    }
    translate::linked_editing_to_host(&state, doc, ranges)
}

/// Ask for the text to auto-insert at a host position.
///
/// The returned text is snippet syntax, positioned at `position` in the host.
pub async fn auto_insert(
    session: &Session,
    markup: &dyn MarkupService,
    uri: &Url,
    position: Position,
    kind: AutoInsertKind,
) -> Option<String> {
    let state = session.get(uri)?;
    let (doc, virtual_position) = state.virtual_document_at(position)?;

    markup.sync_document(doc).await;
    let text = markup.auto_insert(doc, virtual_position, kind).await?;

    (!text.is_empty() && still_current(session, &state)).then_some(text)
}

/// Content of a virtual document, or empty for a URI that names nothing.
pub fn virtual_content(session: &Session, uri: &Url) -> String {
    let Some(virtual_uri) = decode_virtual_uri(uri) else {
        tracing::debug!(%uri, "not a virtual document URI");
        return String::new();
    };
    let Some(state) = session.get(virtual_uri.host()) else {
        return String::new();
    };

    match virtual_uri {
        VirtualUri::Masked { .. } => state.masked_content(),
        VirtualUri::Region { index, .. } => state
            .virtual_documents
            .get(index)
            .map(|doc| doc.content().to_string())
            .unwrap_or_default(),
    }
}
