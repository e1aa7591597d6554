//! Contract between the formatting pipeline and whatever supplies Prettier.
//!
//! The pipeline never locates or loads Prettier itself. It asks a
//! [`FormatterProvider`] for an engine, the local configuration and the
//! ignore file, and talks to the engine through [`PrettierEngine`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tower_lsp::async_trait;

use crate::document::TextDocument;
use crate::settings::{PrettierOptions, PrettierSettings};

/// Result of looking for project-local Prettier configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedConfigOutcome {
    /// A `.prettierrc`/`.editorconfig` applies; its options win over everything.
    Found(PrettierOptions),
    /// Nothing found; workspace settings are used.
    NotFound,
    /// Formatting is turned off for this path.
    Disabled,
    /// Discovery failed, e.g. a malformed config file.
    Errored,
}

impl ResolvedConfigOutcome {
    /// Whether the pipeline may continue.
    pub fn allows_formatting(&self) -> bool {
        matches!(self, Self::Found(_) | Self::NotFound)
    }

    pub fn local_options(&self) -> Option<&PrettierOptions> {
        match self {
            Self::Found(options) => Some(options),
            _ => None,
        }
    }
}

/// Options for `prettier.getFileInfo`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_path: Option<PathBuf>,
    pub resolve_config: bool,
    pub with_node_modules: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub inferred_parser: Option<String>,
}

/// Options for `prettier.resolveConfig`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConfigOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
    pub editorconfig: bool,
}

/// One entry of `prettier.getSupportInfo().languages`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupportLanguage {
    pub name: String,
    pub parsers: Vec<String>,
    pub extensions: Vec<String>,
    pub filenames: Vec<String>,
    pub vscode_language_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SupportInfo {
    pub languages: Vec<SupportLanguage>,
}

/// A loaded Prettier instance.
#[async_trait]
pub trait PrettierEngine: Send + Sync {
    async fn format(&self, text: &str, options: &PrettierOptions) -> anyhow::Result<String>;

    async fn file_info(&self, path: &Path, options: &FileInfoOptions) -> anyhow::Result<FileInfo>;

    async fn support_info(&self) -> anyhow::Result<SupportInfo>;

    /// `Ok(None)` when no configuration applies to `path`.
    async fn resolve_config(
        &self,
        path: &Path,
        options: &ResolveConfigOptions,
    ) -> anyhow::Result<Option<PrettierOptions>>;
}

#[async_trait]
pub trait FormatterProvider: Send + Sync {
    /// Prettier instance for `path`, or `None` when none can be loaded.
    async fn prettier_instance(&self, path: &Path) -> Option<Arc<dyn PrettierEngine>>;

    async fn resolved_config(
        &self,
        document: &TextDocument,
        settings: &PrettierSettings,
    ) -> ResolvedConfigOutcome;

    /// Best-effort location of `ignore_path` for `path`.
    async fn resolved_ignore_path(&self, path: &Path, ignore_path: &str) -> Option<PathBuf>;
}
