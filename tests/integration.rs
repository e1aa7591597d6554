//! Integration tests for the Prettier LSP server.
//!
//! These drive the formatting pipeline and the backend end-to-end against a
//! fake settings client, formatter provider and engine.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tower_lsp::async_trait;
use tower_lsp::lsp_types::*;
use tower_lsp::{LanguageServer, LspService};

use prettier_lsp::backend::{Backend, DidChangeTrustParams};
use prettier_lsp::document::TextDocument;
use prettier_lsp::formatting::{FormatRequest, PrettierEditService};
use prettier_lsp::provider::{
    FileInfo, FileInfoOptions, FormatterProvider, PrettierEngine, ResolveConfigOptions,
    ResolvedConfigOutcome, SupportInfo, SupportLanguage,
};
use prettier_lsp::settings::{PrettierOptions, PrettierSettings, TrustState};
use prettier_lsp::workspace::{PackageManager, WorkspaceClient, WorkspaceService};

struct FakeClient {
    settings: Value,
}

#[async_trait]
impl WorkspaceClient for FakeClient {
    async fn fetch_settings(&self, _scope: &Url) -> anyhow::Result<PrettierSettings> {
        Ok(PrettierSettings::from_value(self.settings.clone())?)
    }

    async fn package_manager(&self, _folder: &Url) -> anyhow::Result<Option<PackageManager>> {
        Ok(None)
    }
}

/// Engine whose answers are scripted and whose inputs are recorded.
struct FakeEngine {
    formatted: Option<String>,
    ignored: bool,
    inferred_parser: Option<String>,
    format_calls: Mutex<Vec<PrettierOptions>>,
    file_info_calls: Mutex<Vec<Option<PathBuf>>>,
}

impl FakeEngine {
    fn formatting_to(formatted: &str) -> Self {
        Self {
            formatted: Some(formatted.to_string()),
            ignored: false,
            inferred_parser: Some("typescript".to_string()),
            format_calls: Mutex::new(Vec::new()),
            file_info_calls: Mutex::new(Vec::new()),
        }
    }

    fn last_options(&self) -> PrettierOptions {
        self.format_calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("engine was not invoked")
    }

    fn format_count(&self) -> usize {
        self.format_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PrettierEngine for FakeEngine {
    async fn format(&self, _text: &str, options: &PrettierOptions) -> anyhow::Result<String> {
        self.format_calls.lock().unwrap().push(options.clone());
        self.formatted
            .clone()
            .ok_or_else(|| anyhow::anyhow!("SyntaxError: Unexpected token (1:7)"))
    }

    async fn file_info(&self, _path: &Path, options: &FileInfoOptions) -> anyhow::Result<FileInfo> {
        self.file_info_calls
            .lock()
            .unwrap()
            .push(options.ignore_path.clone());
        Ok(FileInfo {
            ignored: self.ignored,
            inferred_parser: self.inferred_parser.clone(),
        })
    }

    async fn support_info(&self) -> anyhow::Result<SupportInfo> {
        Ok(SupportInfo {
            languages: vec![
                SupportLanguage {
                    name: "TypeScript".to_string(),
                    parsers: vec!["typescript".to_string(), "babel-ts".to_string()],
                    extensions: vec![".ts".to_string()],
                    filenames: vec![],
                    vscode_language_ids: vec!["typescript".to_string()],
                },
                SupportLanguage {
                    name: "JSON".to_string(),
                    parsers: vec!["json".to_string()],
                    extensions: vec![".json".to_string()],
                    filenames: vec![],
                    vscode_language_ids: vec!["json".to_string()],
                },
            ],
        })
    }

    async fn resolve_config(
        &self,
        _path: &Path,
        _options: &ResolveConfigOptions,
    ) -> anyhow::Result<Option<PrettierOptions>> {
        Ok(None)
    }
}

struct FakeProvider {
    engine: Option<Arc<FakeEngine>>,
    outcome: ResolvedConfigOutcome,
    ignore_lookups: AtomicUsize,
}

impl FakeProvider {
    fn new(engine: FakeEngine) -> Self {
        Self {
            engine: Some(Arc::new(engine)),
            outcome: ResolvedConfigOutcome::NotFound,
            ignore_lookups: AtomicUsize::new(0),
        }
    }

    fn with_outcome(mut self, outcome: ResolvedConfigOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    fn engine(&self) -> &FakeEngine {
        self.engine.as_deref().expect("provider has an engine")
    }
}

#[async_trait]
impl FormatterProvider for FakeProvider {
    async fn prettier_instance(&self, _path: &Path) -> Option<Arc<dyn PrettierEngine>> {
        self.engine
            .clone()
            .map(|engine| engine as Arc<dyn PrettierEngine>)
    }

    async fn resolved_config(
        &self,
        _document: &TextDocument,
        _settings: &PrettierSettings,
    ) -> ResolvedConfigOutcome {
        self.outcome.clone()
    }

    async fn resolved_ignore_path(&self, _path: &Path, ignore_path: &str) -> Option<PathBuf> {
        self.ignore_lookups.fetch_add(1, Ordering::SeqCst);
        Some(PathBuf::from("/w").join(ignore_path))
    }
}

fn workspace(settings: Value) -> Arc<WorkspaceService> {
    let trust = Arc::new(TrustState::default());
    trust.set_trusted(true);
    Arc::new(WorkspaceService::new(Arc::new(FakeClient { settings }), trust))
}

fn service(settings: Value, provider: Arc<FakeProvider>) -> PrettierEditService {
    PrettierEditService::new(workspace(settings), provider)
}

fn document(language_id: &str, path: &str, text: &str) -> TextDocument {
    TextDocument::new(
        Url::parse(&format!("file://{path}")).unwrap(),
        language_id,
        1,
        text.to_string(),
    )
}

const UNFORMATTED: &str = "const a = {b:1}\n";
const FORMATTED: &str = "const a = { b: 1 };\n";

#[tokio::test]
async fn already_formatted_text_yields_no_edits() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let service = service(json!(null), provider.clone());
    let doc = document("typescript", "/w/a.ts", FORMATTED);

    let edits = service.provide_edits(&doc, &FormatRequest::default()).await;
    assert!(edits.is_empty());
    assert_eq!(provider.engine().format_count(), 1);
}

#[tokio::test]
async fn returns_one_minimal_edit() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let service = service(json!(null), provider);
    let doc = document("typescript", "/w/a.ts", UNFORMATTED);

    let edits = service.provide_edits(&doc, &FormatRequest::default()).await;
    assert_eq!(edits.len(), 1);
    // Common prefix "const a = {", common suffix "\n".
    assert_eq!(edits[0].range.start, Position::new(0, 11));
    assert_eq!(edits[0].range.end, Position::new(0, 15));
    assert_eq!(edits[0].new_text, " b: 1 };");
}

#[tokio::test]
async fn local_config_wins_over_workspace_settings() {
    let provider = Arc::new(
        FakeProvider::new(FakeEngine::formatting_to(FORMATTED)).with_outcome(
            ResolvedConfigOutcome::Found(
                serde_json::from_value(json!({ "semi": false, "tabWidth": 2 })).unwrap(),
            ),
        ),
    );
    let service = service(
        json!({ "singleQuote": true, "tabWidth": 8, "printWidth": 120 }),
        provider.clone(),
    );
    let doc = document("typescript", "/w/a.ts", UNFORMATTED);

    service.provide_edits(&doc, &FormatRequest::default()).await;

    let options = provider.engine().last_options();
    assert_eq!(options.get("semi"), Some(&json!(false)));
    assert_eq!(options.get("tabWidth"), Some(&json!(2)));
    assert!(options.get("singleQuote").is_none());
    assert!(options.get("printWidth").is_none());
    assert_eq!(options.get("filepath"), Some(&json!("/w/a.ts")));
}

#[tokio::test]
async fn workspace_settings_used_without_local_config() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let service = service(json!({ "singleQuote": true, "tabWidth": 8 }), provider.clone());
    let doc = document("typescript", "/w/a.ts", UNFORMATTED);

    service.provide_edits(&doc, &FormatRequest::default()).await;

    let options = provider.engine().last_options();
    assert_eq!(options.get("singleQuote"), Some(&json!(true)));
    assert_eq!(options.get("tabWidth"), Some(&json!(8)));
}

#[tokio::test]
async fn disabled_or_errored_config_short_circuits() {
    for outcome in [ResolvedConfigOutcome::Disabled, ResolvedConfigOutcome::Errored] {
        let provider = Arc::new(
            FakeProvider::new(FakeEngine::formatting_to(FORMATTED)).with_outcome(outcome),
        );
        let service = service(json!(null), provider.clone());
        let doc = document("typescript", "/w/a.ts", UNFORMATTED);

        let edits = service.provide_edits(&doc, &FormatRequest::default()).await;
        assert!(edits.is_empty());
        assert_eq!(provider.engine().format_count(), 0);
    }
}

#[tokio::test]
async fn missing_engine_yields_no_edit() {
    let provider = Arc::new(FakeProvider {
        engine: None,
        outcome: ResolvedConfigOutcome::NotFound,
        ignore_lookups: AtomicUsize::new(0),
    });
    let service = service(json!(null), provider);
    let doc = document("typescript", "/w/a.ts", UNFORMATTED);

    assert!(service
        .format(doc.text(), &doc, &FormatRequest::default())
        .await
        .is_none());
}

#[tokio::test]
async fn ignored_file_is_skipped_unless_forced() {
    let mut engine = FakeEngine::formatting_to(FORMATTED);
    engine.ignored = true;
    let provider = Arc::new(FakeProvider::new(engine));
    let service = service(json!(null), provider.clone());
    let doc = document("typescript", "/w/dist/a.ts", UNFORMATTED);

    let edits = service.provide_edits(&doc, &FormatRequest::default()).await;
    assert!(edits.is_empty());
    assert_eq!(provider.engine().format_count(), 0);

    let edits = service.provide_edits(&doc, &FormatRequest::forced()).await;
    assert_eq!(edits.len(), 1);
    assert_eq!(provider.engine().format_count(), 1);
}

#[tokio::test]
async fn force_clears_pragma_requirement_before_invoking() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let service = service(json!({ "requirePragma": true }), provider.clone());
    let doc = document("typescript", "/w/a.ts", UNFORMATTED);

    service.provide_edits(&doc, &FormatRequest::forced()).await;
    assert_eq!(
        provider.engine().last_options().get("requirePragma"),
        Some(&json!(false))
    );
}

#[tokio::test]
async fn engine_inferred_parser_beats_language_id() {
    let mut engine = FakeEngine::formatting_to(FORMATTED);
    engine.inferred_parser = Some("babel".to_string());
    let provider = Arc::new(FakeProvider::new(engine));
    let service = service(json!(null), provider.clone());
    let doc = document("json", "/w/a.js", UNFORMATTED);

    service.provide_edits(&doc, &FormatRequest::default()).await;
    assert_eq!(provider.engine().last_options().parser(), Some("babel"));
}

#[tokio::test]
async fn language_id_maps_to_parser_when_not_inferred() {
    let mut engine = FakeEngine::formatting_to(FORMATTED);
    engine.inferred_parser = None;
    let provider = Arc::new(FakeProvider::new(engine));
    let service = service(json!(null), provider.clone());
    let doc = document("typescript", "/w/a.custom", UNFORMATTED);

    service.provide_edits(&doc, &FormatRequest::default()).await;
    assert_eq!(provider.engine().last_options().parser(), Some("typescript"));
}

#[tokio::test]
async fn unresolved_parser_yields_no_edit() {
    for language_id in ["plaintext", "cobol"] {
        let mut engine = FakeEngine::formatting_to(FORMATTED);
        engine.inferred_parser = None;
        let provider = Arc::new(FakeProvider::new(engine));
        let service = service(json!(null), provider.clone());
        let doc = document(language_id, "/w/a.custom", UNFORMATTED);

        let edits = service.provide_edits(&doc, &FormatRequest::default()).await;
        assert!(edits.is_empty());
        assert_eq!(provider.engine().format_count(), 0);
    }
}

#[tokio::test]
async fn engine_failure_returns_original_text() {
    let mut engine = FakeEngine::formatting_to(FORMATTED);
    engine.formatted = None;
    let provider = Arc::new(FakeProvider::new(engine));
    let service = service(json!(null), provider.clone());
    let doc = document("typescript", "/w/a.ts", UNFORMATTED);

    let result = service
        .format(doc.text(), &doc, &FormatRequest::default())
        .await;
    assert_eq!(result.as_deref(), Some(UNFORMATTED));

    let edits = service.provide_edits(&doc, &FormatRequest::default()).await;
    assert!(edits.is_empty());
}

#[tokio::test]
async fn ignore_path_only_resolved_when_configured() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let service = service(json!({ "ignorePath": ".customignore" }), provider.clone());
    let doc = document("typescript", "/w/a.ts", UNFORMATTED);
    service.provide_edits(&doc, &FormatRequest::default()).await;
    assert_eq!(
        provider.engine().file_info_calls.lock().unwrap().last().cloned(),
        Some(Some(PathBuf::from("/w/.customignore")))
    );

    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let service = self::service(json!({ "ignorePath": "" }), provider.clone());
    service.provide_edits(&doc, &FormatRequest::default()).await;
    assert_eq!(provider.ignore_lookups.load(Ordering::SeqCst), 0);
    assert_eq!(
        provider.engine().file_info_calls.lock().unwrap().last().cloned(),
        Some(None)
    );
}

fn backend_service(
    settings: Value,
    provider: Arc<FakeProvider>,
) -> (LspService<Backend>, Arc<WorkspaceService>) {
    let trust = Arc::new(TrustState::default());
    let workspace = Arc::new(WorkspaceService::new(Arc::new(FakeClient { settings }), trust));
    let shared = workspace.clone();
    let (service, _socket) =
        LspService::new(move |client| Backend::with_provider(client, shared, provider));
    (service, workspace)
}

async fn open(backend: &Backend, uri: &Url, language_id: &str, text: &str) {
    backend
        .did_open(DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id.to_string(),
                version: 1,
                text: text.to_string(),
            },
        })
        .await;
}

fn formatting_params(uri: &Url) -> DocumentFormattingParams {
    DocumentFormattingParams {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
        options: FormattingOptions::default(),
        work_done_progress_params: Default::default(),
    }
}

#[tokio::test]
async fn backend_formats_open_documents() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let (service, _) = backend_service(json!(null), provider);
    let backend = service.inner();
    let uri = Url::parse("file:///w/a.ts").unwrap();

    let missing = backend.formatting(formatting_params(&uri)).await.unwrap();
    assert!(missing.is_none());

    open(backend, &uri, "typescript", UNFORMATTED).await;
    let edits = backend
        .formatting(formatting_params(&uri))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].new_text, " b: 1 };");
}

#[tokio::test]
async fn backend_range_formatting_passes_utf16_offsets() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(
        "// 😀\nconst a = { b: 1 };\n",
    )));
    let (service, _) = backend_service(json!(null), provider.clone());
    let backend = service.inner();
    let uri = Url::parse("file:///w/a.ts").unwrap();
    open(backend, &uri, "typescript", "// 😀\nconst a = {b:1}\n").await;

    let edits = backend
        .range_formatting(DocumentRangeFormattingParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            range: Range {
                start: Position::new(1, 0),
                end: Position::new(1, 15),
            },
            options: FormattingOptions::default(),
            work_done_progress_params: Default::default(),
        })
        .await
        .unwrap()
        .unwrap();

    let options = provider.engine().last_options();
    // "// 😀\n" is 6 UTF-16 units.
    assert_eq!(options.get("rangeStart"), Some(&json!(6)));
    assert_eq!(options.get("rangeEnd"), Some(&json!(21)));
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].range.start, Position::new(1, 11));
}

#[tokio::test]
async fn backend_force_format_bypasses_ignore() {
    let mut engine = FakeEngine::formatting_to(FORMATTED);
    engine.ignored = true;
    let provider = Arc::new(FakeProvider::new(engine));
    let (service, _) = backend_service(json!(null), provider);
    let backend = service.inner();
    let uri = Url::parse("file:///w/a.ts").unwrap();
    open(backend, &uri, "typescript", UNFORMATTED).await;

    let normal = backend
        .formatting(formatting_params(&uri))
        .await
        .unwrap()
        .unwrap();
    assert!(normal.is_empty());

    let forced = backend
        .force_format_document(formatting_params(&uri))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(forced.len(), 1);
}

#[tokio::test]
async fn backend_trust_notification_updates_session_trust() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let (service, workspace) = backend_service(
        json!({ "prettierPath": "/opt/prettier", "withNodeModules": true }),
        provider,
    );
    let backend = service.inner();
    assert!(!workspace.trust().is_trusted());

    let before = workspace
        .get_config(&Url::parse("file:///w/a.ts").unwrap())
        .await;
    assert_eq!(before.prettier_path, None);
    assert!(!before.with_node_modules);

    backend
        .did_change_trust(DidChangeTrustParams { is_trusted: true })
        .await;
    assert!(workspace.trust().is_trusted());

    let after = workspace
        .get_config(&Url::parse("file:///w/b.ts").unwrap())
        .await;
    assert_eq!(after.prettier_path.as_deref(), Some("/opt/prettier"));
}

#[tokio::test]
async fn backend_tracks_incremental_changes() {
    let provider = Arc::new(FakeProvider::new(FakeEngine::formatting_to(FORMATTED)));
    let (service, _) = backend_service(json!(null), provider);
    let backend = service.inner();
    let uri = Url::parse("file:///w/a.ts").unwrap();
    open(backend, &uri, "typescript", "const a = {b:1};\n").await;

    backend
        .did_change(DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier {
                uri: uri.clone(),
                version: 2,
            },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: Some(Range {
                    start: Position::new(0, 11),
                    end: Position::new(0, 14),
                }),
                range_length: None,
                text: " b: 1 ".to_string(),
            }],
        })
        .await;

    // "const a = { b: 1 };\n" is exactly what the engine returns.
    let edits = backend
        .formatting(formatting_params(&uri))
        .await
        .unwrap()
        .unwrap();
    assert!(edits.is_empty());
}
