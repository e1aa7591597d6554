//! Backend struct for the Prettier Language Server.
//!
//! The Backend holds server state and implements the `LanguageServer` trait from tower-lsp.
//! It keeps open documents in memory and delegates formatting to the
//! [`PrettierEditService`] pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::document::TextDocument;
use crate::formatting::{FormatRequest, PrettierEditService};
use crate::module_resolver::{ModuleResolverOptions, NodeModuleResolver};
use crate::provider::FormatterProvider;
use crate::settings::TrustState;
use crate::workspace::WorkspaceService;

/// Notification the editor sends when workspace trust changes.
pub const DID_CHANGE_TRUST_METHOD: &str = "workspace/didChangeTrust";

/// Request formatting a document regardless of ignore files and pragmas.
pub const FORCE_FORMAT_METHOD: &str = "prettier/forceFormatDocument";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeTrustParams {
    pub is_trusted: bool,
}

/// The Backend struct holds server state.
///
/// # State
/// - `client`: The LSP client handle for registrations
/// - `documents`: Open documents, keyed by URI
/// - `workspace`: Settings resolution, trust and workspace folders
/// - `edits`: The formatting pipeline
pub struct Backend {
    client: Client,
    documents: RwLock<HashMap<Url, TextDocument>>,
    workspace: Arc<WorkspaceService>,
    edits: PrettierEditService,
    has_configuration_capability: AtomicBool,
}

impl Backend {
    /// Backend resolving Prettier from disk with `options`.
    pub fn with_options(client: Client, options: ModuleResolverOptions) -> Self {
        let workspace = Arc::new(WorkspaceService::new(
            Arc::new(client.clone()),
            Arc::new(TrustState::default()),
        ));
        let provider = Arc::new(NodeModuleResolver::new(workspace.clone(), options));
        Self::with_provider(client, workspace, provider)
    }

    /// Backend with an explicit settings service and formatter provider.
    pub fn with_provider(
        client: Client,
        workspace: Arc<WorkspaceService>,
        provider: Arc<dyn FormatterProvider>,
    ) -> Self {
        Self {
            client,
            documents: RwLock::new(HashMap::new()),
            edits: PrettierEditService::new(workspace.clone(), provider),
            workspace,
            has_configuration_capability: AtomicBool::new(false),
        }
    }

    /// Handler for `workspace/didChangeTrust`, the only place trust changes.
    pub async fn did_change_trust(&self, params: DidChangeTrustParams) {
        log::info!("Workspace trust changed: trusted = {}", params.is_trusted);
        self.workspace.trust().set_trusted(params.is_trusted);
    }

    /// Handler for `prettier/forceFormatDocument`.
    pub async fn force_format_document(
        &self,
        params: DocumentFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        self.format_with(&params.text_document.uri, FormatRequest::forced())
            .await
    }

    async fn document(&self, uri: &Url) -> Option<TextDocument> {
        self.documents.read().await.get(uri).cloned()
    }

    async fn format_with(&self, uri: &Url, request: FormatRequest) -> Result<Option<Vec<TextEdit>>> {
        let Some(document) = self.document(uri).await else {
            log::warn!("Document not found for formatting: {}", uri);
            return Ok(None);
        };
        Ok(Some(self.edits.provide_edits(&document, &request).await))
    }
}

fn workspace_folders(params: &InitializeParams) -> Vec<WorkspaceFolder> {
    if let Some(folders) = params.workspace_folders.clone() {
        return folders;
    }
    #[allow(deprecated)]
    let root = params.root_uri.clone();
    root.map(|uri| {
        let name = uri
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
            .to_string();
        vec![WorkspaceFolder { uri, name }]
    })
    .unwrap_or_default()
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let has_configuration = params
            .capabilities
            .workspace
            .as_ref()
            .and_then(|workspace| workspace.configuration)
            .unwrap_or(false);
        self.has_configuration_capability
            .store(has_configuration, Ordering::SeqCst);

        self.workspace
            .set_workspace_folders(workspace_folders(&params))
            .await;

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "prettier-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: crate::capabilities::server_capabilities(),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("Prettier LSP initialized");

        if self.has_configuration_capability.load(Ordering::SeqCst) {
            let registration = Registration {
                id: "prettier-did-change-configuration".to_string(),
                method: "workspace/didChangeConfiguration".to_string(),
                register_options: None,
            };
            if let Err(e) = self.client.register_capability(vec![registration]).await {
                log::warn!("Failed to register for configuration changes: {}", e);
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        self.workspace.clear_cache().await;
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        log::info!("Document opened: {}", item.uri);

        let document = TextDocument::new(item.uri.clone(), item.language_id, item.version, item.text);
        self.documents.write().await.insert(item.uri, document);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        let mut documents = self.documents.write().await;
        match documents.get_mut(&uri) {
            Some(document) => {
                document.apply_changes(params.content_changes, version);
                log::debug!("Document changed: {} (version {})", uri, document.version());
            }
            None => log::warn!("Change for unknown document: {}", uri),
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        log::info!("Document closed: {}", uri);
        self.documents.write().await.remove(&uri);
    }

    async fn did_change_configuration(&self, _: DidChangeConfigurationParams) {
        // Settings stay fixed per document for the session.
        log::info!("Configuration changed");
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        self.format_with(&params.text_document.uri, FormatRequest::default())
            .await
    }

    async fn range_formatting(
        &self,
        params: DocumentRangeFormattingParams,
    ) -> Result<Option<Vec<TextEdit>>> {
        let uri = params.text_document.uri;
        let Some(document) = self.document(&uri).await else {
            log::warn!("Document not found for range formatting: {}", uri);
            return Ok(None);
        };

        let request = FormatRequest::range(
            document.utf16_offset_at(params.range.start),
            document.utf16_offset_at(params.range.end),
        );
        Ok(Some(self.edits.provide_edits(&document, &request).await))
    }
}
