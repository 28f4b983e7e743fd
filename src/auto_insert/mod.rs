//! Automatic quote and closing-tag insertion.
//!
//! A content change that types `=`, `>` or `/` inside a `UI!` region is a
//! trigger. After a short delay the markup service is asked what to insert;
//! the answer is applied to the host document only if nothing changed in the
//! meantime.

mod scheduler;
mod snippet;

pub use scheduler::AutoInsertScheduler;
pub use snippet::snippet_to_plain;

use tower_lsp::lsp_types::*;

use crate::document::Session;
use crate::lsp::features;
use crate::markup::{AutoInsertKind, MarkupService};
use crate::settings::AutoInsertSettings;

/// Why a document changed. Only edits trigger insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeReason {
    Edit,
    Undo,
    Redo,
}

/// A change that asks for auto insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoInsertTrigger {
    pub kind: AutoInsertKind,
    /// Host position right after the typed text.
    pub position: Position,
    /// The text the change inserted.
    pub typed: String,
}

/// Whether `kind` is switched on in `settings`.
pub fn is_enabled(settings: &AutoInsertSettings, kind: AutoInsertKind) -> bool {
    match kind {
        AutoInsertKind::AutoQuote => settings.auto_quote,
        AutoInsertKind::AutoClose => settings.auto_close,
    }
}

/// Inspect the last of `changes` for an auto-insert trigger.
///
/// Only pure insertions count: a change that replaced text, or one that
/// replaced the whole document, never triggers.
pub fn detect_trigger(
    changes: &[TextDocumentContentChangeEvent],
    reason: ChangeReason,
    settings: &AutoInsertSettings,
) -> Option<AutoInsertTrigger> {
    if reason != ChangeReason::Edit || !settings.any_enabled() {
        return None;
    }
    let change = changes.last()?;
    let range = change.range?;
    if range.start != range.end || change.range_length.is_some_and(|len| len != 0) {
        return None;
    }

    let kind = match change.text.chars().last()? {
        '=' => AutoInsertKind::AutoQuote,
        '>' | '/' => AutoInsertKind::AutoClose,
        _ => return None,
    };
    if !is_enabled(settings, kind) {
        return None;
    }

    Some(AutoInsertTrigger {
        kind,
        position: position_after(range.start, &change.text),
        typed: change.text.clone(),
    })
}

/// The position just past `text` when it is inserted at `start`.
fn position_after(start: Position, text: &str) -> Position {
    match text.rsplit_once('\n') {
        None => Position::new(start.line, start.character + utf16_len(text)),
        Some((before, last_line)) => Position::new(
            start.line + before.matches('\n').count() as u32 + 1,
            utf16_len(last_line),
        ),
    }
}

fn utf16_len(text: &str) -> u32 {
    text.chars().map(|c| c.len_utf16() as u32).sum()
}

/// Whether the typed text already ends with what would be inserted, as
/// happens when a whole element is pasted.
fn already_typed(trigger: &AutoInsertTrigger, text: &str) -> bool {
    // Skip the leading `</` or `$0` of the suggestion.
    let tail = text.get(2..).unwrap_or("");
    trigger.typed.trim().ends_with(tail)
}

/// Ask the markup service what to insert for `trigger` and build the edit.
///
/// `version` is the host version the trigger was detected on. Returns `None`
/// when there is nothing to insert or when the document is no longer at
/// `version`.
pub async fn resolve(
    session: &Session,
    markup: &dyn MarkupService,
    settings: &AutoInsertSettings,
    uri: &Url,
    version: i32,
    trigger: &AutoInsertTrigger,
) -> Option<WorkspaceEdit> {
    if !session.is_current(uri, version) {
        tracing::debug!(%uri, version, "document changed before auto insertion");
        return None;
    }

    let text = features::auto_insert(session, markup, uri, trigger.position, trigger.kind).await?;

    if !is_enabled(settings, trigger.kind) {
        return None;
    }
    if trigger.kind == AutoInsertKind::AutoClose && already_typed(trigger, &text) {
        tracing::debug!(%uri, suggestion = %text, "closing tag already typed");
        return None;
    }
    if !session.is_current(uri, version) {
        tracing::debug!(%uri, version, "document changed during auto insertion");
        return None;
    }

    Some(insertion_edit(uri, version, trigger.position, &text))
}

/// A versioned edit inserting `snippet`, reduced to plain text, at `position`.
pub fn insertion_edit(uri: &Url, version: i32, position: Position, snippet: &str) -> WorkspaceEdit {
    let edit = TextDocumentEdit {
        text_document: OptionalVersionedTextDocumentIdentifier {
            uri: uri.clone(),
            version: Some(version),
        },
        edits: vec![OneOf::Left(TextEdit {
            range: Range::new(position, position),
            new_text: snippet_to_plain(snippet),
        })],
    };
    WorkspaceEdit {
        document_changes: Some(DocumentChanges::Edits(vec![edit])),
        ..Default::default()
    }
}
