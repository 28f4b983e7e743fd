//! Forwarding virtual documents to an external HTML language server.
//!
//! The server is spawned as a child process and spoken to over stdio with
//! `Content-Length` framed JSON-RPC, the same way an editor would. Writes go
//! through one queue so notifications and requests reach the server in the
//! order they were issued.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tower_lsp::lsp_types::*;

use super::error::{ProxyError, ProxyResult};
use super::transport::{read_message, write_message};
use super::{AutoInsertKind, MarkupService};
use crate::document::VirtualDocument;
use crate::settings::MarkupSettings;

type PendingMap = DashMap<i64, oneshot::Sender<ProxyResult<Value>>>;

/// The service's record of a virtual document it has opened on the server.
#[derive(Debug)]
struct OpenDocument {
    version: i32,
    content: String,
}

/// A [`MarkupService`] backed by an HTML language server process.
pub struct ProxyMarkupService {
    outbound: mpsc::UnboundedSender<Value>,
    pending: Arc<PendingMap>,
    /// Set once the server's output has closed; no response can arrive after.
    closed: Arc<AtomicBool>,
    next_id: AtomicI64,
    documents: DashMap<Url, OpenDocument>,
    /// Held so the server is killed when the service is dropped.
    _child: Option<Child>,
}

impl ProxyMarkupService {
    /// Spawn the configured server and run the `initialize` handshake.
    pub async fn start(settings: &MarkupSettings, root: Option<&Path>) -> ProxyResult<Self> {
        let mut cmd = Command::new(&settings.command);
        cmd.args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(root) = root {
            cmd.current_dir(root);
        }

        let spawn_error = |reason: String| ProxyError::Spawn {
            command: settings.command.clone(),
            reason,
        };
        let mut child = cmd.spawn().map_err(|e| spawn_error(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("failed to capture stdout".into()))?;

        tracing::info!(command = %settings.command, "started markup server");

        let service = Self::connect(stdout, stdin, Some(child));
        service.initialize(root).await?;
        Ok(service)
    }

    /// Wire the service to an already running server's output and input.
    pub fn connect<R, W>(reader: R, writer: W, child: Option<Child>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_writer(writer, outbound_rx));
        tokio::spawn(run_reader(
            reader,
            Arc::clone(&pending),
            Arc::clone(&closed),
            outbound.clone(),
        ));

        Self {
            outbound,
            pending,
            closed,
            next_id: AtomicI64::new(1),
            documents: DashMap::new(),
            _child: child,
        }
    }

    async fn initialize(&self, root: Option<&Path>) -> ProxyResult<()> {
        let root_uri = root.and_then(|root| Url::from_directory_path(root).ok());

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri,
            capabilities: ClientCapabilities {
                text_document: Some(TextDocumentClientCapabilities {
                    completion: Some(CompletionClientCapabilities {
                        completion_item: Some(CompletionItemCapability {
                            snippet_support: Some(true),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    hover: Some(HoverClientCapabilities {
                        content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            initialization_options: Some(json!({ "provideFormatter": false })),
            ..Default::default()
        };

        self.request::<_, InitializeResult>("initialize", params)
            .await?;
        self.notify("initialized", InitializedParams {});
        Ok(())
    }

    /// Send a request and wait for its result. A `null` result is `None`.
    async fn request<P, R>(&self, method: &'static str, params: P) -> ProxyResult<Option<R>>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": serde_json::to_value(params)?,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if self.closed.load(Ordering::SeqCst) || self.outbound.send(message).is_err() {
            self.pending.remove(&id);
            return Err(ProxyError::Stopped);
        }

        let value = rx.await.map_err(|_| ProxyError::Stopped)??;
        Ok(serde_json::from_value(value)?)
    }

    fn notify<P: Serialize>(&self, method: &'static str, params: P) {
        let message = match serde_json::to_value(params) {
            Ok(params) => json!({ "jsonrpc": "2.0", "method": method, "params": params }),
            Err(e) => {
                tracing::warn!(method, error = %e, "failed to encode notification");
                return;
            }
        };
        if self.outbound.send(message).is_err() {
            tracing::debug!(method, "markup server stopped; notification dropped");
        }
    }

    /// Run a request, logging and discarding any failure.
    async fn forward<P, R>(&self, method: &'static str, params: P) -> Option<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        match self.request(method, params).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(method, error = %e, "markup request failed");
                None
            }
        }
    }
}

fn position_params(doc: &VirtualDocument, position: Position) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier {
            uri: doc.uri().clone(),
        },
        position,
    }
}

#[tower_lsp::async_trait]
impl MarkupService for ProxyMarkupService {
    async fn sync_document(&self, doc: &VirtualDocument) {
        let uri = doc.uri().clone();
        let content = doc.content();

        match self.documents.entry(uri.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().content == content {
                    return;
                }
                let open = entry.get_mut();
                open.version += 1;
                open.content = content.to_string();
                let params = DidChangeTextDocumentParams {
                    text_document: VersionedTextDocumentIdentifier {
                        uri,
                        version: open.version,
                    },
                    content_changes: vec![TextDocumentContentChangeEvent {
                        range: None,
                        range_length: None,
                        text: content.to_string(),
                    }],
                };
                drop(entry);
                self.notify("textDocument/didChange", params);
            }
            Entry::Vacant(entry) => {
                entry.insert(OpenDocument {
                    version: 1,
                    content: content.to_string(),
                });
                self.notify(
                    "textDocument/didOpen",
                    DidOpenTextDocumentParams {
                        text_document: TextDocumentItem {
                            uri,
                            language_id: "html".to_string(),
                            version: 1,
                            text: content.to_string(),
                        },
                    },
                );
            }
        }
    }

    async fn close_document(&self, uri: &Url) {
        if self.documents.remove(uri).is_some() {
            self.notify(
                "textDocument/didClose",
                DidCloseTextDocumentParams {
                    text_document: TextDocumentIdentifier { uri: uri.clone() },
                },
            );
        }
    }

    async fn hover(&self, doc: &VirtualDocument, position: Position) -> Option<Hover> {
        let params = HoverParams {
            text_document_position_params: position_params(doc, position),
            work_done_progress_params: Default::default(),
        };
        self.forward("textDocument/hover", params).await
    }

    async fn completion(
        &self,
        doc: &VirtualDocument,
        position: Position,
        context: Option<CompletionContext>,
    ) -> Option<CompletionResponse> {
        let params = CompletionParams {
            text_document_position: position_params(doc, position),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context,
        };
        self.forward("textDocument/completion", params).await
    }

    async fn definition(
        &self,
        doc: &VirtualDocument,
        position: Position,
    ) -> Option<GotoDefinitionResponse> {
        let params = GotoDefinitionParams {
            text_document_position_params: position_params(doc, position),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        self.forward("textDocument/definition", params).await
    }

    async fn linked_editing_ranges(
        &self,
        doc: &VirtualDocument,
        position: Position,
    ) -> Option<LinkedEditingRanges> {
        let params = LinkedEditingRangeParams {
            text_document_position_params: position_params(doc, position),
            work_done_progress_params: Default::default(),
        };
        self.forward("textDocument/linkedEditingRange", params)
            .await
    }

    async fn auto_insert(
        &self,
        doc: &VirtualDocument,
        position: Position,
        kind: AutoInsertKind,
    ) -> Option<String> {
        let params = json!({
            "kind": kind,
            "textDocument": { "uri": doc.uri() },
            "position": position,
        });
        self.forward("html/autoInsert", params).await
    }

    async fn shutdown(&self) {
        if let Err(e) = self.request::<_, Value>("shutdown", Value::Null).await {
            tracing::debug!(error = %e, "markup server shutdown request failed");
        }
        self.notify("exit", Value::Null);
    }
}

/// Drain the outbound queue into the server's input.
async fn run_writer<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Value>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            tracing::error!(error = %e, "writing to markup server failed");
            break;
        }
    }
}

/// Dispatch everything the server sends until its output closes.
async fn run_reader<R>(
    reader: R,
    pending: Arc<PendingMap>,
    closed: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Value>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => dispatch(message, &pending, &outbound),
            Ok(None) => {
                tracing::info!("markup server closed its output");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "reading from markup server failed");
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    let ids: Vec<i64> = pending.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, tx)) = pending.remove(&id) {
            let _ = tx.send(Err(ProxyError::Stopped));
        }
    }
}

fn dispatch(message: Value, pending: &PendingMap, outbound: &mpsc::UnboundedSender<Value>) {
    let id = message.get("id").cloned();
    let method = message.get("method").and_then(Value::as_str);

    match (id, method) {
        // Response to one of our requests.
        (Some(id), None) => {
            let Some(id) = id.as_i64() else {
                tracing::warn!(%id, "response with unexpected id");
                return;
            };
            let Some((_, tx)) = pending.remove(&id) else {
                return;
            };
            let outcome = match message.get("error") {
                Some(error) => Err(ProxyError::Server {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }),
                None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
        }
        // Server-initiated request: answer so the server is never left waiting.
        (Some(id), Some(method)) => {
            let result = match method {
                "workspace/configuration" => {
                    let items = message
                        .pointer("/params/items")
                        .and_then(Value::as_array)
                        .map_or(0, Vec::len);
                    Value::Array(vec![Value::Null; items])
                }
                _ => Value::Null,
            };
            tracing::debug!(method, "answering markup server request");
            let _ = outbound.send(json!({ "jsonrpc": "2.0", "id": id, "result": result }));
        }
        (None, Some("window/logMessage")) => {
            if let Some(text) = message.pointer("/params/message").and_then(Value::as_str) {
                tracing::debug!(target: "uibeam_lsp::markup_server", "{text}");
            }
        }
        (None, _) => {}
    }
}
