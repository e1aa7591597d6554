//! Format pipeline for the Prettier LSP.
//!
//! `PrettierEditService` turns a document into at most one text edit:
//! settings → local config → engine → ignore check → parser → options →
//! format → minimal diff. Every failure ends the request with no edit and a
//! log entry.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tower_lsp::lsp_types::TextEdit;

use crate::diff::minimal_edit;
use crate::document::{TextDocument, PLAINTEXT_LANGUAGE_ID};
use crate::language::parser_from_language_id;
use crate::provider::{FileInfoOptions, FormatterProvider, PrettierEngine};
use crate::settings::{PrettierOptions, PrettierSettings};
use crate::workspace::WorkspaceService;

/// Per-request knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatRequest {
    /// Start of the range to format, in UTF-16 code units
    pub range_start: Option<usize>,
    /// End of the range to format, in UTF-16 code units
    pub range_end: Option<usize>,
    /// Format even if the file is ignored or lacks a required pragma
    pub force: bool,
}

impl FormatRequest {
    pub fn range(start: usize, end: usize) -> Self {
        Self {
            range_start: Some(start),
            range_end: Some(end),
            force: false,
        }
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    /// Both bounds, only when neither is zero.
    fn range_bounds(&self) -> Option<(usize, usize)> {
        match (self.range_start, self.range_end) {
            (Some(start), Some(end)) if start != 0 && end != 0 => Some((start, end)),
            _ => None,
        }
    }
}

pub struct PrettierEditService {
    workspace: Arc<WorkspaceService>,
    provider: Arc<dyn FormatterProvider>,
}

impl PrettierEditService {
    pub fn new(workspace: Arc<WorkspaceService>, provider: Arc<dyn FormatterProvider>) -> Self {
        Self {
            workspace,
            provider,
        }
    }

    /// Edits turning `document` into its formatted form. Empty when there is
    /// nothing to apply, whether formatting was skipped or changed nothing.
    pub async fn provide_edits(
        &self,
        document: &TextDocument,
        request: &FormatRequest,
    ) -> Vec<TextEdit> {
        let text = document.text();
        let Some(formatted) = self.format(text, document, request).await else {
            return vec![];
        };

        let edit = minimal_edit(text, &formatted);
        if edit.is_noop() {
            log::debug!("No formatting changes needed for: {}", document.uri());
            return vec![];
        }
        vec![edit.to_text_edit(text, document.line_index())]
    }

    /// Formatted text, or `None` when formatting does not apply. An engine
    /// failure yields `text` unchanged.
    pub async fn format(
        &self,
        text: &str,
        document: &TextDocument,
        request: &FormatRequest,
    ) -> Option<String> {
        let uri = document.uri();
        let path = document.path();

        log::info!("Formatting {}", uri);

        let settings = self.workspace.get_config(uri).await;

        let resolved_config = self.provider.resolved_config(document, &settings).await;
        if !resolved_config.allows_formatting() {
            log::debug!("Local config outcome {:?}, skipping", resolved_config);
            return None;
        }

        let Some(prettier) = self.provider.prettier_instance(&path).await else {
            log::error!("Prettier could not be loaded. See previous logs for more information.");
            return None;
        };

        let mut resolved_ignore_path = None;
        if let Some(ignore_path) = settings.ignore_file_name() {
            resolved_ignore_path = self
                .provider
                .resolved_ignore_path(&path, ignore_path)
                .await;
            if let Some(resolved) = &resolved_ignore_path {
                log::info!("Using ignore file (if present) at {}", resolved.display());
            }
        }

        let file_info_options = FileInfoOptions {
            ignore_path: resolved_ignore_path,
            resolve_config: true,
            with_node_modules: settings.with_node_modules,
        };
        let file_info = match prettier.file_info(&path, &file_info_options).await {
            Ok(info) => info,
            Err(e) => {
                log::error!("Failed to get file info for {}: {:#}", path.display(), e);
                return None;
            }
        };
        log::info!("File Info: {:?}", file_info);

        if !request.force && file_info.ignored {
            log::info!("File is ignored, skipping.");
            return None;
        }

        let parser = match file_info.inferred_parser {
            Some(parser) => Some(parser),
            None if document.language_id() != PLAINTEXT_LANGUAGE_ID => {
                // Plaintext never has a parser; reaching here usually means a
                // custom extension without a parser configured.
                log::warn!("Parser not inferred, trying language id.");
                self.parser_from_language_id(prettier.as_ref(), &path, document.language_id())
                    .await
            }
            None => None,
        };
        let Some(parser) = parser else {
            log::error!(
                "Failed to resolve a parser, skipping file. If you registered a custom file extension, be sure to configure the parser."
            );
            return None;
        };

        let options = prettier_options(
            &path,
            &parser,
            &settings,
            resolved_config.local_options(),
            request,
        );
        log::info!("Prettier Options: {:?}", options);

        match prettier.format(text, &options).await {
            Ok(formatted) => Some(formatted),
            Err(e) => {
                log::error!("Error formatting document: {:#}", e);
                Some(text.to_string())
            }
        }
    }

    async fn parser_from_language_id(
        &self,
        prettier: &dyn PrettierEngine,
        path: &Path,
        language_id: &str,
    ) -> Option<String> {
        match prettier.support_info().await {
            Ok(info) => parser_from_language_id(&info.languages, path, language_id),
            Err(e) => {
                log::error!("Failed to load Prettier support info: {:#}", e);
                None
            }
        }
    }
}

/// Merge options, lowest precedence first: workspace settings (only without
/// local config), file path and parser, range bounds, local config.
pub fn prettier_options(
    file_name: &Path,
    parser: &str,
    settings: &PrettierSettings,
    local_config: Option<&PrettierOptions>,
    request: &FormatRequest,
) -> PrettierOptions {
    let mut options = match local_config {
        Some(_) => {
            log::info!("Detected local configuration (i.e. .prettierrc or .editorconfig), editor settings will not be used");
            PrettierOptions::default()
        }
        None => {
            log::info!("No local configuration (i.e. .prettierrc or .editorconfig) detected, falling back to editor settings");
            settings.fallback_options()
        }
    };

    options.insert("filepath", file_name.to_string_lossy().into_owned());
    options.insert("parser", parser);

    if let Some((start, end)) = request.range_bounds() {
        options.insert("rangeStart", start);
        options.insert("rangeEnd", end);
    }

    if let Some(local) = local_config {
        options.extend(local.clone());
    }

    if request.force && options.requires_pragma() {
        options.insert("requirePragma", Value::Bool(false));
    }

    options
}
