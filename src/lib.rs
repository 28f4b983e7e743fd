//! Language server for markup embedded in `UI!` macro calls.
//!
//! Regions inside `UI!` calls are exposed to an HTML language server as
//! virtual documents; its answers are translated back into the Rust file.

use std::sync::{Arc, OnceLock};

use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};

pub mod auto_insert;
pub mod document;
pub mod lsp;
pub mod markup;
pub mod settings;

pub use document::{scan, synthesize, DocumentState, LineIndex, Region, Session};
pub use markup::{AutoInsertKind, DisabledMarkupService, MarkupService, ProxyMarkupService};
pub use settings::{discover_settings, load_settings, Settings};

use auto_insert::{AutoInsertScheduler, ChangeReason};
use lsp::{AutoInsertParams, VirtualContentParams, VirtualContentResponse};

pub struct Backend {
    client: Client,
    session: Arc<Session>,
    scheduler: AutoInsertScheduler,
    settings: OnceLock<Settings>,
    markup: OnceLock<Arc<dyn MarkupService>>,
}

impl Backend {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            session: Arc::new(Session::new()),
            scheduler: AutoInsertScheduler::new(),
            settings: OnceLock::new(),
            markup: OnceLock::new(),
        }
    }

    fn markup(&self) -> Arc<dyn MarkupService> {
        match self.markup.get() {
            Some(markup) => Arc::clone(markup),
            None => Arc::new(DisabledMarkupService),
        }
    }

    fn settings(&self) -> Settings {
        self.settings.get().cloned().unwrap_or_default()
    }

    /// Tell the markup service about virtual documents that no longer exist.
    async fn close_vanished(&self, previous: &DocumentState, current: Option<&DocumentState>) {
        let markup = self.markup();
        for uri in document::vanished_uris(previous, current) {
            markup.close_document(&uri).await;
        }
    }

    /// Schedule auto insertion if the last change typed a trigger character
    /// inside a `UI!` region.
    fn schedule_auto_insert(
        &self,
        state: &DocumentState,
        changes: &[TextDocumentContentChangeEvent],
    ) {
        let settings = self.settings().auto_insert;
        let Some(trigger) = auto_insert::detect_trigger(changes, ChangeReason::Edit, &settings)
        else {
            return;
        };
        if state.region_at(trigger.position).is_none() {
            return;
        }

        let client = self.client.clone();
        let session = Arc::clone(&self.session);
        let markup = self.markup();
        let uri = state.uri.clone();
        let version = state.version;
        let delay = settings.debounce();

        self.scheduler.schedule(state.uri.clone(), delay, async move {
            let Some(edit) = auto_insert::resolve(
                &session,
                markup.as_ref(),
                &settings,
                &uri,
                version,
                &trigger,
            )
            .await
            else {
                return;
            };
            match client.apply_edit(edit).await {
                Ok(response) if !response.applied => {
                    tracing::debug!(%uri, reason = ?response.failure_reason, "auto insertion rejected");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(%uri, error = %e, "failed to apply auto insertion"),
            }
        });
    }

    /// `uibeam/virtualContent`: the content of a virtual document.
    async fn virtual_content(
        &self,
        params: VirtualContentParams,
    ) -> Result<VirtualContentResponse> {
        Ok(VirtualContentResponse {
            content: lsp::features::virtual_content(&self.session, &params.uri),
        })
    }

    /// `uibeam/autoInsert`: the snippet to insert at a position.
    async fn auto_insert(&self, params: AutoInsertParams) -> Result<Option<String>> {
        let markup = self.markup();
        Ok(lsp::features::auto_insert(
            &self.session,
            markup.as_ref(),
            &params.text_document.uri,
            params.position,
            params.kind,
        )
        .await)
    }
}

/// Whether an opened document is a Rust file that may contain `UI!` calls.
fn is_host_document(document: &TextDocumentItem) -> bool {
    document.language_id == "rust" || document.uri.path().ends_with(".rs")
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        let settings = match &workspace_root {
            Some(root) => {
                let (settings, settings_dir) = settings::discover_settings(root);
                tracing::info!(dir = %settings_dir.display(), "loaded settings");
                settings
            }
            None => Settings::default(),
        };

        let markup: Arc<dyn MarkupService> =
            match ProxyMarkupService::start(&settings.markup, workspace_root.as_deref()).await {
                Ok(proxy) => Arc::new(proxy),
                Err(e) => {
                    tracing::warn!(
                        command = %settings.markup.command,
                        error = %e,
                        "markup language server unavailable; UI! features disabled"
                    );
                    Arc::new(DisabledMarkupService)
                }
            };
        let _ = self.markup.set(markup);
        let _ = self.settings.set(settings);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec!["<".to_string(), ">".to_string()]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                linked_editing_range_provider: Some(
                    LinkedEditingRangeServerCapabilities::Simple(true),
                ),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "uibeam language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.markup().shutdown().await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        if !is_host_document(&params.text_document) {
            return;
        }
        let document = params.text_document;
        let (_, previous) = self
            .session
            .open(document.uri, document.text, document.version);
        if let Some(previous) = previous {
            self.close_vanished(&previous, None).await;
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        self.scheduler.cancel(&uri);

        let Some(current) = self.session.get(&uri) else {
            return;
        };
        let text = document::apply_content_changes(current.text(), &params.content_changes);
        let (state, previous) = self
            .session
            .update(uri, text, params.text_document.version);
        if let Some(previous) = previous {
            self.close_vanished(&previous, Some(state.as_ref())).await;
        }

        self.schedule_auto_insert(&state, &params.content_changes);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.scheduler.cancel(&uri);
        if let Some(previous) = self.session.close(&uri) {
            self.close_vanished(&previous, None).await;
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let markup = self.markup();
        Ok(lsp::features::hover(&self.session, markup.as_ref(), uri, position).await)
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let markup = self.markup();
        Ok(lsp::features::completion(
            &self.session,
            markup.as_ref(),
            uri,
            position,
            params.context,
        )
        .await)
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let markup = self.markup();
        Ok(lsp::features::definition(&self.session, markup.as_ref(), uri, position).await)
    }

    async fn linked_editing_range(
        &self,
        params: LinkedEditingRangeParams,
    ) -> Result<Option<LinkedEditingRanges>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let markup = self.markup();
        Ok(
            lsp::features::linked_editing_ranges(&self.session, markup.as_ref(), uri, position)
                .await,
        )
    }
}

pub fn create_service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::build(Backend::new)
        .custom_method(lsp::VIRTUAL_CONTENT_METHOD, Backend::virtual_content)
        .custom_method(lsp::AUTO_INSERT_METHOD, Backend::auto_insert)
        .finish()
}
