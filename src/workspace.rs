//! Workspace-aware settings resolution.
//!
//! `WorkspaceService` fetches editor settings once per document and shares
//! that one resolution between every caller, sanitizing the result when the
//! workspace is not trusted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tower_lsp::async_trait;
use tower_lsp::lsp_types::request::Request;
use tower_lsp::lsp_types::{ConfigurationItem, Url, WorkspaceFolder};
use tower_lsp::Client;

use crate::settings::{PrettierSettings, TrustState, SETTINGS_SECTION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Yarn,
    Pnpm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteNpmPackageCommandParams {
    pub workspace_folder_uri: Url,
}

/// Asks the client which package manager a workspace folder uses. The
/// client extension implements the handler.
pub enum ExecuteNpmPackageCommand {}

impl Request for ExecuteNpmPackageCommand {
    type Params = ExecuteNpmPackageCommandParams;
    type Result = Option<PackageManager>;
    const METHOD: &'static str = "custom/executeNpmPackageCommand";
}

/// Outbound requests the server makes to the editor.
#[async_trait]
pub trait WorkspaceClient: Send + Sync + 'static {
    async fn fetch_settings(&self, scope: &Url) -> anyhow::Result<PrettierSettings>;

    async fn package_manager(&self, workspace_folder: &Url)
        -> anyhow::Result<Option<PackageManager>>;
}

#[async_trait]
impl WorkspaceClient for Client {
    async fn fetch_settings(&self, scope: &Url) -> anyhow::Result<PrettierSettings> {
        let values = self
            .configuration(vec![ConfigurationItem {
                scope_uri: Some(scope.clone()),
                section: Some(SETTINGS_SECTION.to_string()),
            }])
            .await
            .map_err(|e| anyhow::anyhow!("workspace/configuration failed: {}", e))?;
        let value = values.into_iter().next().unwrap_or_default();
        PrettierSettings::from_value(value).context("invalid prettier settings")
    }

    async fn package_manager(
        &self,
        workspace_folder: &Url,
    ) -> anyhow::Result<Option<PackageManager>> {
        self.send_request::<ExecuteNpmPackageCommand>(ExecuteNpmPackageCommandParams {
            workspace_folder_uri: workspace_folder.clone(),
        })
        .await
        .map_err(|e| anyhow::anyhow!("{} failed: {}", ExecuteNpmPackageCommand::METHOD, e))
    }
}

type SettingsCell = Arc<OnceCell<PrettierSettings>>;

/// Cache key for `uri`: its file system path, so one file reached through
/// differently encoded URIs (`%40` vs `@`, `c%3A` vs `c:`) shares an entry.
fn settings_key(uri: &Url) -> PathBuf {
    uri.to_file_path()
        .unwrap_or_else(|_| PathBuf::from(uri.as_str()))
}

pub struct WorkspaceService {
    client: Arc<dyn WorkspaceClient>,
    trust: Arc<TrustState>,
    /// One pending-or-resolved settings computation per document path
    settings: Mutex<HashMap<PathBuf, SettingsCell>>,
    folders: RwLock<Vec<WorkspaceFolder>>,
}

impl WorkspaceService {
    pub fn new(client: Arc<dyn WorkspaceClient>, trust: Arc<TrustState>) -> Self {
        Self {
            client,
            trust,
            settings: Mutex::new(HashMap::new()),
            folders: RwLock::new(Vec::new()),
        }
    }

    pub fn trust(&self) -> &TrustState {
        &self.trust
    }

    /// Effective settings for `uri`.
    ///
    /// The first caller starts the fetch; everyone else, including callers
    /// arriving while it is still in flight, gets that same result. Trust is
    /// read when the fetch completes and cached results are never redone.
    pub async fn get_config(&self, uri: &Url) -> PrettierSettings {
        let cell = {
            let mut settings = self.settings.lock().await;
            settings.entry(settings_key(uri)).or_default().clone()
        };
        cell.get_or_init(|| self.resolve(uri)).await.clone()
    }

    /// Effective settings for a file on disk, sharing the cache entry of
    /// whatever URI the editor used for it.
    pub async fn get_config_for_path(&self, path: &Path) -> PrettierSettings {
        match Url::from_file_path(path) {
            Ok(uri) => self.get_config(&uri).await,
            Err(_) => {
                log::warn!("Cannot build a URI for {}, using defaults", path.display());
                PrettierSettings::default().sanitized()
            }
        }
    }

    async fn resolve(&self, uri: &Url) -> PrettierSettings {
        log::debug!("Fetching settings for {}", uri);
        let settings = match self.client.fetch_settings(uri).await {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Failed to fetch settings for {}, using defaults: {:#}", uri, e);
                PrettierSettings::default()
            }
        };
        if self.trust.is_trusted() {
            settings
        } else {
            settings.sanitized()
        }
    }

    /// Drop every cached resolution. Called when the session ends.
    pub async fn clear_cache(&self) {
        self.settings.lock().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn cached_count(&self) -> usize {
        self.settings.lock().await.len()
    }

    /// `None` on any failure; the client may not implement the request.
    pub async fn execute_npm_package_manager_command(
        &self,
        workspace_folder: &Url,
    ) -> Option<PackageManager> {
        match self.client.package_manager(workspace_folder).await {
            Ok(manager) => manager,
            Err(e) => {
                log::debug!("Package manager query failed: {:#}", e);
                None
            }
        }
    }

    pub async fn set_workspace_folders(&self, folders: Vec<WorkspaceFolder>) {
        *self.folders.write().await = folders;
    }

    /// Deepest workspace folder containing `path`.
    pub async fn workspace_folder_for(&self, path: &Path) -> Option<(Url, PathBuf)> {
        self.containing_folders(path).await.into_iter().next()
    }

    /// Every workspace folder containing `path`, deepest first.
    pub async fn containing_folders(&self, path: &Path) -> Vec<(Url, PathBuf)> {
        let folders = self.folders.read().await;
        let mut containing: Vec<(Url, PathBuf)> = folders
            .iter()
            .filter_map(|folder| {
                let root = folder.uri.to_file_path().ok()?;
                path.starts_with(&root).then(|| (folder.uri.clone(), root))
            })
            .collect();
        containing.sort_by_key(|(_, root)| std::cmp::Reverse(root.components().count()));
        containing
    }

    /// Resolve a user-supplied path for `file`: `~/` expands to the home
    /// directory, absolute paths are kept, relative paths are joined onto
    /// the workspace folder containing `file`.
    pub async fn workspace_relative_path(&self, file: &Path, to_resolve: &str) -> Option<PathBuf> {
        if let Some(rest) = to_resolve.strip_prefix('~') {
            if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') {
                if let Some(home) = std::env::var_os("HOME") {
                    return Some(PathBuf::from(home).join(rest.trim_start_matches(['/', '\\'])));
                }
            }
        }

        let candidate = Path::new(to_resolve);
        if candidate.is_absolute() {
            return Some(candidate.to_path_buf());
        }

        let (_, root) = self.workspace_folder_for(file).await?;
        Some(root.join(candidate))
    }
}
