use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use expect_test::expect;
use serde_json::{json, Value};
use tower::{Service, ServiceExt};
use tower_lsp::jsonrpc::Request;
use tower_lsp::lsp_types::*;
use tower_lsp::LspService;
use uibeam_lsp::auto_insert::{self, AutoInsertTrigger};
use uibeam_lsp::document::{decode_virtual_uri, masked_uri, region_uri, VirtualDocument};
use uibeam_lsp::lsp::features;
use uibeam_lsp::settings::AutoInsertSettings;
use uibeam_lsp::{
    create_service, scan, synthesize, AutoInsertKind, Backend, MarkupService, Session,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const EMPTY_CALL: &str = r#"
        fn main() {
            let ui = UI! {};
        }
    "#;

const LITERALS_ONLY: &str = r#"
        fn main() {
            let ui = UI! {
                <p>
                    "Hello, world!"
                </p>
            };
        }
    "#;

const INTERPOLATION: &str = r#"
        fn main() {
            let name = "world";
            let ui = UI! {
                <p>
                    "Hello, "{name}"!"
                </p>
            };
        }
    "#;

const NO_SPACE: &str = r#"
        fn main() {
            let name = "world";
            let ui = UI!{
                <p>
                    "Hello, "{name}"!"
                </p>
            };
        }
    "#;

const PARENTHESES: &str = r#"
        fn main() {
            let name = "world";
            let ui = UI!(
                <p>
                    "Hello, "{name}"!"
                </p>
            );
        }
    "#;

const BRACKETS: &str = r#"
        fn main() {
            let name = "world";
            let ui = UI![
                <p>
                    "Hello, "{name}"!"
                </p>
            ];
        }
    "#;

const PLAIN_RUST: &str = r#"
        struct Hello<'h> {
            name: &'h str,
        }

        impl std::fmt::Display for Hello<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(f, "Hello, {}!", self.name)
            }
        }

        fn main() {
            println!("{}", Hello { name: "world" });
        }
    "#;

fn host_uri() -> Url {
    Url::parse("file:///home/user/app/src/main.rs").unwrap()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One line per region: `start..end` and the region's text.
fn format_regions(text: &str) -> String {
    let regions = scan(text);
    if regions.is_empty() {
        return "(no regions)".to_string();
    }
    regions
        .iter()
        .map(|r| format!("{}..{} {:?}", r.start, r.end, &text[r.span()]))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_range(range: &Range) -> String {
    format!(
        "{}:{}-{}:{}",
        range.start.line, range.start.character, range.end.line, range.end.character
    )
}

/// A markup service that answers from the request position and records what
/// it was asked.
#[derive(Default)]
struct FakeMarkup {
    calls: AtomicUsize,
    synced: Mutex<Vec<(Url, String)>>,
    /// When set, every request bumps the host document's version first.
    edit_during_request: Option<Arc<Session>>,
    auto_insert_text: Option<String>,
}

impl FakeMarkup {
    fn with_concurrent_edit(session: &Arc<Session>) -> Self {
        Self {
            edit_during_request: Some(Arc::clone(session)),
            ..Default::default()
        }
    }

    fn answering_auto_insert(text: &str) -> Self {
        Self {
            auto_insert_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn request(&self, doc: &VirtualDocument) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = &self.edit_during_request {
            let host = decode_virtual_uri(doc.uri()).unwrap().host().clone();
            let state = session.get(&host).unwrap();
            session.update(host, state.text().to_string(), state.version + 1);
        }
    }
}

fn shifted(position: Position, by: i32) -> Position {
    Position::new(position.line, (position.character as i32 + by) as u32)
}

#[tower_lsp::async_trait]
impl MarkupService for FakeMarkup {
    async fn sync_document(&self, doc: &VirtualDocument) {
        self.synced
            .lock()
            .unwrap()
            .push((doc.uri().clone(), doc.content().to_string()));
    }

    async fn hover(&self, doc: &VirtualDocument, position: Position) -> Option<Hover> {
        self.request(doc);
        Some(Hover {
            contents: HoverContents::Scalar(MarkedString::String(format!(
                "element at {}:{}",
                position.line, position.character
            ))),
            range: Some(Range::new(position, shifted(position, 1))),
        })
    }

    async fn completion(
        &self,
        doc: &VirtualDocument,
        position: Position,
        _context: Option<CompletionContext>,
    ) -> Option<CompletionResponse> {
        self.request(doc);
        Some(CompletionResponse::Array(vec![CompletionItem {
            label: "div".into(),
            text_edit: Some(CompletionTextEdit::Edit(TextEdit {
                range: Range::new(shifted(position, -1), position),
                new_text: "div".into(),
            })),
            ..Default::default()
        }]))
    }

    async fn definition(
        &self,
        doc: &VirtualDocument,
        _position: Position,
    ) -> Option<GotoDefinitionResponse> {
        self.request(doc);
        Some(GotoDefinitionResponse::Scalar(Location {
            uri: doc.uri().clone(),
            range: Range::new(Position::new(1, 16), Position::new(1, 19)),
        }))
    }

    async fn linked_editing_ranges(
        &self,
        doc: &VirtualDocument,
        _position: Position,
    ) -> Option<LinkedEditingRanges> {
        self.request(doc);
        Some(LinkedEditingRanges {
            ranges: vec![
                Range::new(Position::new(1, 17), Position::new(1, 18)),
                Range::new(Position::new(3, 18), Position::new(3, 19)),
            ],
            word_pattern: None,
        })
    }

    async fn auto_insert(
        &self,
        doc: &VirtualDocument,
        _position: Position,
        _kind: AutoInsertKind,
    ) -> Option<String> {
        self.request(doc);
        self.auto_insert_text.clone()
    }
}

fn open(text: &str) -> Arc<Session> {
    let session = Arc::new(Session::new());
    session.open(host_uri(), text.to_string(), 1);
    session
}

// ---------------------------------------------------------------------------
// Tests: region scanning
// ---------------------------------------------------------------------------

#[test]
fn no_regions_in_plain_rust() {
    expect![[r#"(no regions)"#]].assert_eq(&format_regions(""));
    expect![[r#"(no regions)"#]].assert_eq(&format_regions(PLAIN_RUST));
}

#[test]
fn empty_call() {
    expect![[r#"47..47 """#]].assert_eq(&format_regions(EMPTY_CALL));
}

#[test]
fn literals_only() {
    expect![[r#"47..137 "\n                <p>\n                    \"Hello, world!\"\n                </p>\n            ""#]]
        .assert_eq(&format_regions(LITERALS_ONLY));
}

#[test]
fn interpolation_braces_are_balanced() {
    expect![[r#"79..172 "\n                <p>\n                    \"Hello, \"{name}\"!\"\n                </p>\n            ""#]]
        .assert_eq(&format_regions(INTERPOLATION));
}

#[test]
fn every_delimiter_kind_without_space() {
    let expected = "78..171 \"\\n                <p>\\n                    \\\"Hello, \\\"{name}\\\"!\\\"\\n                </p>\\n            \"";
    for text in [NO_SPACE, PARENTHESES, BRACKETS] {
        assert_eq!(format_regions(text), expected);
    }
}

#[test]
fn several_calls_and_an_unbalanced_one() {
    let text = "let a = UI! { <a/> }; let b = UI! ( <b/> ; let c = UI![<c/>];";
    expect![[r#"
        13..19 " <a/> "
        55..59 "<c/>""#]]
    .assert_eq(&format_regions(text));
}

// ---------------------------------------------------------------------------
// Tests: masked synthesis
// ---------------------------------------------------------------------------

#[test]
fn masked_empty_document() {
    assert_eq!(synthesize("", &scan("")), "");
}

#[test]
fn masked_document_keeps_layout() {
    let expected = concat!(
        "\n",
        "                   \n",
        "                               \n",
        "                          \n",
        "                <p>\n",
        "                    \"Hello, \"{name}\"!\"\n",
        "                </p>\n",
        "              \n",
        "         \n",
        "    ",
    );
    assert_eq!(synthesize(INTERPOLATION, &scan(INTERPOLATION)), expected);
}

// ---------------------------------------------------------------------------
// Tests: content provider
// ---------------------------------------------------------------------------

#[test]
fn virtual_content_for_both_uri_forms() {
    let session = open(INTERPOLATION);

    let masked = features::virtual_content(&session, &masked_uri(&host_uri()).unwrap());
    assert_eq!(masked, synthesize(INTERPOLATION, &scan(INTERPOLATION)));

    let region = features::virtual_content(&session, &region_uri(&host_uri(), 0).unwrap());
    assert_eq!(region, &INTERPOLATION[79..172]);
}

#[test]
fn virtual_content_for_unknown_uris_is_empty() {
    let session = open(INTERPOLATION);
    let other_host = Url::parse("file:///elsewhere.rs").unwrap();

    for uri in [
        region_uri(&host_uri(), 1).unwrap(),
        masked_uri(&other_host).unwrap(),
        host_uri(),
    ] {
        assert_eq!(features::virtual_content(&session, &uri), "");
    }
}

// ---------------------------------------------------------------------------
// Tests: feature routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hover_inside_region_is_translated() {
    let session = open(LITERALS_ONLY);
    let markup = FakeMarkup::default();

    // On the `p` of `<p>`.
    let hover = features::hover(&session, &markup, &host_uri(), Position::new(3, 17))
        .await
        .unwrap();

    let HoverContents::Scalar(MarkedString::String(contents)) = &hover.contents else {
        panic!("unexpected hover contents");
    };
    expect![[r#"element at 1:17 @ 3:17-3:18"#]].assert_eq(&format!(
        "{contents} @ {}",
        format_range(&hover.range.unwrap())
    ));

    let synced = markup.synced.lock().unwrap();
    assert_eq!(synced.len(), 1);
    assert_eq!(synced[0].0, region_uri(&host_uri(), 0).unwrap());
    assert_eq!(synced[0].1, &LITERALS_ONLY[47..137]);
}

#[tokio::test]
async fn requests_outside_regions_never_reach_the_service() {
    let session = open(LITERALS_ONLY);
    let markup = FakeMarkup::default();
    let uri = host_uri();

    // Inside `fn main`, before the `UI!` call.
    let position = Position::new(1, 12);
    assert!(features::hover(&session, &markup, &uri, position).await.is_none());
    assert!(features::completion(&session, &markup, &uri, position, None)
        .await
        .is_none());
    assert!(features::definition(&session, &markup, &uri, position).await.is_none());
    assert!(features::linked_editing_ranges(&session, &markup, &uri, position)
        .await
        .is_none());

    // Documents nobody opened.
    let unknown = Url::parse("file:///unknown.rs").unwrap();
    assert!(features::hover(&session, &markup, &unknown, Position::new(3, 17))
        .await
        .is_none());

    assert_eq!(markup.calls(), 0);
    assert!(markup.synced.lock().unwrap().is_empty());
}

#[tokio::test]
async fn completion_edit_is_translated() {
    let session = open(LITERALS_ONLY);
    let markup = FakeMarkup::default();

    // Right after `<p`.
    let response = features::completion(&session, &markup, &host_uri(), Position::new(3, 18), None)
        .await
        .unwrap();
    let CompletionResponse::Array(items) = response else {
        panic!("expected an array");
    };
    let Some(CompletionTextEdit::Edit(edit)) = &items[0].text_edit else {
        panic!("expected a plain edit");
    };
    expect![[r#"3:17-3:18 div"#]].assert_eq(&format!(
        "{} {}",
        format_range(&edit.range),
        edit.new_text
    ));
}

#[tokio::test]
async fn definition_points_back_into_host() {
    let session = open(LITERALS_ONLY);
    let markup = FakeMarkup::default();

    let response = features::definition(&session, &markup, &host_uri(), Position::new(3, 17))
        .await
        .unwrap();
    let GotoDefinitionResponse::Array(locations) = response else {
        panic!("expected locations");
    };
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].uri, host_uri());
    expect![[r#"3:16-3:19"#]].assert_eq(&format_range(&locations[0].range));
}

#[tokio::test]
async fn linked_ranges_cover_both_tags() {
    let session = open(LITERALS_ONLY);
    let markup = FakeMarkup::default();

    let ranges = features::linked_editing_ranges(&session, &markup, &host_uri(), Position::new(3, 17))
        .await
        .unwrap();
    let formatted: Vec<_> = ranges.ranges.iter().map(format_range).collect();
    expect![[r#"3:17-3:18, 5:18-5:19"#]].assert_eq(&formatted.join(", "));
}

#[tokio::test]
async fn stale_results_are_dropped() {
    let session = open(LITERALS_ONLY);
    let markup = FakeMarkup::with_concurrent_edit(&session);
    let uri = host_uri();
    let position = Position::new(3, 17);

    assert!(features::hover(&session, &markup, &uri, position).await.is_none());
    assert!(features::completion(&session, &markup, &uri, position, None)
        .await
        .is_none());
    assert!(features::definition(&session, &markup, &uri, position).await.is_none());
    assert!(features::linked_editing_ranges(&session, &markup, &uri, position)
        .await
        .is_none());

    assert_eq!(markup.calls(), 4);
    assert!(session.is_current(&uri, 5));
}

// ---------------------------------------------------------------------------
// Tests: auto insertion
// ---------------------------------------------------------------------------

const TYPED_TAG: &str = "fn page() {\n    UI! {<div>}\n}\n";

/// The `>` of `<div>` was just typed at line 1, character 13.
fn typed_close() -> Vec<TextDocumentContentChangeEvent> {
    vec![TextDocumentContentChangeEvent {
        range: Some(Range::new(Position::new(1, 13), Position::new(1, 13))),
        range_length: Some(0),
        text: ">".into(),
    }]
}

fn format_edit(edit: &WorkspaceEdit) -> String {
    let Some(DocumentChanges::Edits(edits)) = &edit.document_changes else {
        return "(no document edits)".to_string();
    };
    edits
        .iter()
        .flat_map(|doc| {
            doc.edits.iter().map(move |edit| {
                let OneOf::Left(edit) = edit else {
                    return "(annotated edit)".to_string();
                };
                format!(
                    "v{} {} {:?}",
                    doc.text_document.version.unwrap_or(-1),
                    format_range(&edit.range),
                    edit.new_text
                )
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn closing_tag_is_inserted_after_typed_bracket() {
    let session = Arc::new(Session::new());
    session.open(host_uri(), TYPED_TAG.to_string(), 2);
    let markup = FakeMarkup::answering_auto_insert("$0</div>");
    let settings = AutoInsertSettings::default();

    let trigger = auto_insert::detect_trigger(
        &typed_close(),
        auto_insert::ChangeReason::Edit,
        &settings,
    )
    .unwrap();
    assert_eq!(trigger.kind, AutoInsertKind::AutoClose);

    let edit = auto_insert::resolve(&session, &markup, &settings, &host_uri(), 2, &trigger)
        .await
        .unwrap();
    expect![[r#"v2 1:14-1:14 "</div>""#]].assert_eq(&format_edit(&edit));
}

#[tokio::test]
async fn custom_request_returns_raw_snippet() {
    let session = Arc::new(Session::new());
    session.open(host_uri(), TYPED_TAG.to_string(), 2);
    let markup = FakeMarkup::answering_auto_insert("$0</div>");

    let text = features::auto_insert(
        &session,
        &markup,
        &host_uri(),
        Position::new(1, 14),
        AutoInsertKind::AutoClose,
    )
    .await;
    assert_eq!(text.as_deref(), Some("$0</div>"));
}

#[tokio::test]
async fn pasted_element_gets_no_second_closing_tag() {
    let session = Arc::new(Session::new());
    session.open(host_uri(), TYPED_TAG.to_string(), 2);
    let markup = FakeMarkup::answering_auto_insert("$0</div>");

    let trigger = AutoInsertTrigger {
        kind: AutoInsertKind::AutoClose,
        position: Position::new(1, 14),
        typed: "<div></div>".into(),
    };
    let edit = auto_insert::resolve(
        &session,
        &markup,
        &AutoInsertSettings::default(),
        &host_uri(),
        2,
        &trigger,
    )
    .await;
    assert!(edit.is_none());
}

#[tokio::test]
async fn auto_insertion_for_an_old_version_is_dropped() {
    let session = Arc::new(Session::new());
    session.open(host_uri(), TYPED_TAG.to_string(), 2);
    session.update(host_uri(), TYPED_TAG.to_string(), 3);
    let markup = FakeMarkup::answering_auto_insert("$0</div>");
    let settings = AutoInsertSettings::default();

    let trigger = auto_insert::detect_trigger(
        &typed_close(),
        auto_insert::ChangeReason::Edit,
        &settings,
    )
    .unwrap();
    let edit = auto_insert::resolve(&session, &markup, &settings, &host_uri(), 2, &trigger).await;
    assert!(edit.is_none());
    assert_eq!(markup.calls(), 0);
}

#[tokio::test]
async fn empty_suggestion_inserts_nothing() {
    let session = Arc::new(Session::new());
    session.open(host_uri(), TYPED_TAG.to_string(), 2);
    let markup = FakeMarkup::answering_auto_insert("");
    let settings = AutoInsertSettings::default();

    let trigger = auto_insert::detect_trigger(
        &typed_close(),
        auto_insert::ChangeReason::Edit,
        &settings,
    )
    .unwrap();
    let edit = auto_insert::resolve(&session, &markup, &settings, &host_uri(), 2, &trigger).await;
    assert!(edit.is_none());
    assert_eq!(markup.calls(), 1);
}

// ---------------------------------------------------------------------------
// Tests: server over the LSP service
// ---------------------------------------------------------------------------

/// Send one message; returns the result of a request, `None` for a
/// notification.
async fn send(service: &mut LspService<Backend>, request: Request) -> Option<Value> {
    let response = service.ready().await.unwrap().call(request).await.unwrap()?;
    let (_, result) = response.into_parts();
    Some(result.unwrap())
}

fn edit(line: u32, character: u32, text: &str) -> Value {
    let at = json!({ "line": line, "character": character });
    json!({ "range": { "start": at, "end": at }, "rangeLength": 0, "text": text })
}

#[tokio::test]
async fn incremental_changes_refresh_virtual_documents() {
    // A markup command that cannot start keeps the test off any real server.
    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(
        workspace.path().join("uibeam-lsp.toml"),
        "[markup]\ncommand = \"/nonexistent/uibeam-markup-server\"\n",
    )
    .unwrap();

    let (mut service, _socket) = create_service();
    let uri = Url::parse("file:///src/page.rs").unwrap();
    let region = region_uri(&uri, 0).unwrap();
    let virtual_content = |id: i64, target: &Url| {
        Request::build("uibeam/virtualContent")
            .params(json!({ "uri": target }))
            .id(id)
            .finish()
    };

    let initialize = Request::build("initialize")
        .params(json!({
            "capabilities": {},
            "rootUri": Url::from_directory_path(workspace.path()).unwrap(),
        }))
        .id(1)
        .finish();
    let result = send(&mut service, initialize).await.unwrap();
    assert_eq!(result["capabilities"]["textDocumentSync"], 2);

    let open = Request::build("textDocument/didOpen")
        .params(json!({
            "textDocument": {
                "uri": uri,
                "languageId": "rust",
                "version": 1,
                "text": "fn f() { UI!{<p>} }",
            }
        }))
        .finish();
    assert!(send(&mut service, open).await.is_none());

    let content = send(&mut service, virtual_content(2, &region)).await.unwrap();
    assert_eq!(content, json!({ "content": "<p>" }));

    let change = Request::build("textDocument/didChange")
        .params(json!({
            "textDocument": { "uri": uri, "version": 2 },
            "contentChanges": [edit(0, 16, "b")],
        }))
        .finish();
    assert!(send(&mut service, change).await.is_none());

    let content = send(&mut service, virtual_content(3, &region)).await.unwrap();
    assert_eq!(content, json!({ "content": "<p>b" }));
    let masked = send(&mut service, virtual_content(4, &masked_uri(&uri).unwrap()))
        .await
        .unwrap();
    assert_eq!(masked, json!({ "content": "             <p>b   " }));

    // Removing the call leaves no region to serve.
    let change = Request::build("textDocument/didChange")
        .params(json!({
            "textDocument": { "uri": uri, "version": 3 },
            "contentChanges": [{
                "range": {
                    "start": { "line": 0, "character": 9 },
                    "end": { "line": 0, "character": 18 }
                },
                "rangeLength": 9,
                "text": "1",
            }],
        }))
        .finish();
    assert!(send(&mut service, change).await.is_none());

    let content = send(&mut service, virtual_content(5, &region)).await.unwrap();
    assert_eq!(content, json!({ "content": "" }));
}
