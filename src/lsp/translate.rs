//! Translation of markup service results back into host coordinates.
//!
//! Everything the markup service returns is expressed against a virtual
//! document. Ranges are mapped through the owning `DocumentState`; anything
//! that cannot be mapped is dropped rather than shown at a wrong place.

use tower_lsp::lsp_types::*;

use crate::document::{DocumentState, VirtualDocument};

/// Translate a hover. An untranslatable range is removed, keeping the content.
pub fn hover_to_host(state: &DocumentState, doc: &VirtualDocument, hover: Hover) -> Hover {
    Hover {
        contents: hover.contents,
        range: hover
            .range
            .and_then(|range| state.to_host_range(doc, range)),
    }
}

fn text_edit_to_host(
    state: &DocumentState,
    doc: &VirtualDocument,
    edit: TextEdit,
) -> Option<TextEdit> {
    Some(TextEdit {
        range: state.to_host_range(doc, edit.range)?,
        new_text: edit.new_text,
    })
}

fn completion_item_to_host(
    state: &DocumentState,
    doc: &VirtualDocument,
    mut item: CompletionItem,
) -> Option<CompletionItem> {
    item.text_edit = match item.text_edit.take() {
        None => None,
        Some(CompletionTextEdit::Edit(edit)) => Some(CompletionTextEdit::Edit(
            text_edit_to_host(state, doc, edit)?,
        )),
        Some(CompletionTextEdit::InsertAndReplace(edit)) => {
            Some(CompletionTextEdit::InsertAndReplace(InsertReplaceEdit {
                new_text: edit.new_text,
                insert: state.to_host_range(doc, edit.insert)?,
                replace: state.to_host_range(doc, edit.replace)?,
            }))
        }
    };
    if let Some(edits) = item.additional_text_edits.take() {
        item.additional_text_edits = Some(
            edits
                .into_iter()
                .map(|edit| text_edit_to_host(state, doc, edit))
                .collect::<Option<Vec<_>>>()?,
        );
    }
    Some(item)
}

/// Translate completion items; items whose edits cannot be mapped are dropped.
pub fn completion_to_host(
    state: &DocumentState,
    doc: &VirtualDocument,
    response: CompletionResponse,
) -> CompletionResponse {
    let translate = |items: Vec<CompletionItem>| -> Vec<CompletionItem> {
        items
            .into_iter()
            .filter_map(|item| completion_item_to_host(state, doc, item))
            .collect()
    };
    match response {
        CompletionResponse::Array(items) => CompletionResponse::Array(translate(items)),
        CompletionResponse::List(list) => CompletionResponse::List(CompletionList {
            is_incomplete: list.is_incomplete,
            items: translate(list.items),
        }),
    }
}

/// Translate a location. Locations in other documents pass through.
fn location_to_host(
    state: &DocumentState,
    doc: &VirtualDocument,
    location: Location,
) -> Option<Location> {
    if &location.uri != doc.uri() {
        return Some(location);
    }
    Some(Location {
        uri: state.uri.clone(),
        range: state.to_host_range(doc, location.range)?,
    })
}

fn location_link_to_host(
    state: &DocumentState,
    doc: &VirtualDocument,
    link: LocationLink,
) -> Option<LocationLink> {
    if &link.target_uri != doc.uri() {
        return Some(link);
    }
    Some(LocationLink {
        // The origin is always in the virtual document the request went to.
        origin_selection_range: link
            .origin_selection_range
            .and_then(|range| state.to_host_range(doc, range)),
        target_uri: state.uri.clone(),
        target_range: state.to_host_range(doc, link.target_range)?,
        target_selection_range: state.to_host_range(doc, link.target_selection_range)?,
    })
}

/// Translate definition results.
pub fn definition_to_host(
    state: &DocumentState,
    doc: &VirtualDocument,
    response: GotoDefinitionResponse,
) -> GotoDefinitionResponse {
    match response {
        GotoDefinitionResponse::Scalar(location) => GotoDefinitionResponse::Array(
            location_to_host(state, doc, location).into_iter().collect(),
        ),
        GotoDefinitionResponse::Array(locations) => GotoDefinitionResponse::Array(
            locations
                .into_iter()
                .filter_map(|location| location_to_host(state, doc, location))
                .collect(),
        ),
        GotoDefinitionResponse::Link(links) => GotoDefinitionResponse::Link(
            links
                .into_iter()
                .filter_map(|link| location_link_to_host(state, doc, link))
                .collect(),
        ),
    }
}

/// Translate linked editing ranges. All ranges must map, or none are returned.
pub fn linked_editing_to_host(
    state: &DocumentState,
    doc: &VirtualDocument,
    ranges: LinkedEditingRanges,
) -> Option<LinkedEditingRanges> {
    Some(LinkedEditingRanges {
        ranges: ranges
            .ranges
            .into_iter()
            .map(|range| state.to_host_range(doc, range))
            .collect::<Option<Vec<_>>>()?,
        word_pattern: ranges.word_pattern,
    })
}
