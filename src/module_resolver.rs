//! Locates Prettier on disk and answers the [`FormatterProvider`] contract.
//!
//! Resolution order for a file:
//! 1. `prettierPath` from settings (workspace-relative)
//! 2. the nearest `node_modules/prettier` above the file, trusted workspaces only
//! 3. the global modules of the workspace's package manager, when `resolveGlobalModules` is set
//! 4. the bundled Prettier passed on the command line

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tokio::process::Command;
use tokio::sync::Mutex;
use tower_lsp::async_trait;

use crate::document::TextDocument;
use crate::engine::NodePrettier;
use crate::provider::{
    FormatterProvider, PrettierEngine, ResolveConfigOptions, ResolvedConfigOutcome,
};
use crate::settings::PrettierSettings;
use crate::workspace::{PackageManager, WorkspaceService};

/// Process-level knobs, usually from the command line.
#[derive(Debug, Clone)]
pub struct ModuleResolverOptions {
    /// `node` executable used to run Prettier
    pub node_path: PathBuf,
    /// Prettier module used when nothing else resolves
    pub bundled_prettier: Option<PathBuf>,
}

impl Default for ModuleResolverOptions {
    fn default() -> Self {
        Self {
            node_path: PathBuf::from("node"),
            bundled_prettier: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleSource {
    Configured,
    Local,
    Global,
    Bundled,
}

impl fmt::Display for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configured => "configured",
            Self::Local => "local",
            Self::Global => "global",
            Self::Bundled => "bundled",
        };
        f.write_str(label)
    }
}

pub struct NodeModuleResolver {
    workspace: Arc<WorkspaceService>,
    options: ModuleResolverOptions,
    instances: Mutex<LruCache<PathBuf, Arc<NodePrettier>>>,
    ignore_paths: Mutex<LruCache<(PathBuf, String), Option<PathBuf>>>,
    global_roots: Mutex<HashMap<PackageManager, Option<PathBuf>>>,
}

impl NodeModuleResolver {
    pub fn new(workspace: Arc<WorkspaceService>, options: ModuleResolverOptions) -> Self {
        Self {
            workspace,
            options,
            instances: Mutex::new(LruCache::new(
                NonZeroUsize::new(16).expect("non-zero instance cache size"),
            )),
            ignore_paths: Mutex::new(LruCache::new(
                NonZeroUsize::new(256).expect("non-zero ignore path cache size"),
            )),
            global_roots: Mutex::new(HashMap::new()),
        }
    }

    async fn candidates(
        &self,
        path: &Path,
        settings: &PrettierSettings,
    ) -> Vec<(ModuleSource, PathBuf)> {
        let mut candidates = Vec::new();

        if let Some(configured) = settings.prettier_path.as_deref() {
            match self.workspace.workspace_relative_path(path, configured).await {
                Some(dir) => candidates.push((ModuleSource::Configured, dir)),
                None => log::warn!(
                    "prettierPath '{}' could not be resolved for {}",
                    configured,
                    path.display()
                ),
            }
        }

        if self.workspace.trust().is_trusted() {
            if let Some(dir) = find_local_module(path) {
                candidates.push((ModuleSource::Local, dir));
            }
        }

        if settings.resolve_global_modules {
            if let Some(root) = self.global_modules_root(path).await {
                candidates.push((ModuleSource::Global, root.join("prettier")));
            }
        }

        if let Some(bundled) = &self.options.bundled_prettier {
            candidates.push((ModuleSource::Bundled, bundled.clone()));
        }

        candidates
    }

    async fn global_modules_root(&self, path: &Path) -> Option<PathBuf> {
        let manager = match self.workspace.workspace_folder_for(path).await {
            Some((folder, _)) => self
                .workspace
                .execute_npm_package_manager_command(&folder)
                .await
                .unwrap_or(PackageManager::Npm),
            None => PackageManager::Npm,
        };

        let mut roots = self.global_roots.lock().await;
        if let Some(root) = roots.get(&manager) {
            return root.clone();
        }
        let root = match query_global_root(manager).await {
            Ok(root) => Some(root),
            Err(e) => {
                log::warn!("Could not locate global {:?} modules: {:#}", manager, e);
                None
            }
        };
        roots.insert(manager, root.clone());
        root
    }

    async fn resolve_instance(&self, path: &Path) -> Option<Arc<NodePrettier>> {
        let settings = self.workspace.get_config_for_path(path).await;
        for (source, dir) in self.candidates(path, &settings).await {
            if let Some(instance) = self.load(source, dir).await {
                return Some(instance);
            }
        }
        log::error!("No usable Prettier found for {}", path.display());
        None
    }

    async fn load(&self, source: ModuleSource, dir: PathBuf) -> Option<Arc<NodePrettier>> {
        if let Some(instance) = self.instances.lock().await.get(&dir).cloned() {
            return Some(instance);
        }
        match NodePrettier::load(&self.options.node_path, &dir) {
            Ok(instance) => {
                log::info!(
                    "Using {} Prettier {} from {}",
                    source,
                    instance.version(),
                    dir.display()
                );
                let instance = Arc::new(instance);
                self.instances.lock().await.put(dir, instance.clone());
                Some(instance)
            }
            Err(e) => {
                log::warn!("Skipping {} Prettier: {:#}", source, e);
                None
            }
        }
    }
}

/// Nearest `node_modules/prettier` in `path` or any of its ancestors.
fn find_local_module(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .map(|dir| dir.join("node_modules").join("prettier"))
        .find(|candidate| candidate.join("package.json").is_file())
}

async fn query_global_root(manager: PackageManager) -> anyhow::Result<PathBuf> {
    let (program, args, suffix): (&str, &[&str], Option<&str>) = match manager {
        PackageManager::Npm => ("npm", &["root", "-g"][..], None),
        PackageManager::Pnpm => ("pnpm", &["root", "-g"][..], None),
        PackageManager::Yarn => ("yarn", &["global", "dir"][..], Some("node_modules")),
    };
    let output = Command::new(program).args(args).output().await?;
    if !output.status.success() {
        anyhow::bail!("{} {} exited with {}", program, args.join(" "), output.status);
    }
    let root = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    Ok(match suffix {
        Some(suffix) => root.join(suffix),
        None => root,
    })
}

#[async_trait]
impl FormatterProvider for NodeModuleResolver {
    async fn prettier_instance(&self, path: &Path) -> Option<Arc<dyn PrettierEngine>> {
        let instance = self.resolve_instance(path).await?;
        Some(instance)
    }

    async fn resolved_config(
        &self,
        document: &TextDocument,
        settings: &PrettierSettings,
    ) -> ResolvedConfigOutcome {
        let path = document.path();
        let Some(engine) = self.prettier_instance(&path).await else {
            return ResolvedConfigOutcome::Errored;
        };

        let config = match settings.config_path.as_deref() {
            Some(config_path) => {
                self.workspace
                    .workspace_relative_path(&path, config_path)
                    .await
            }
            None => None,
        };
        let options = ResolveConfigOptions {
            config,
            editorconfig: settings.use_editor_config,
        };

        match engine.resolve_config(&path, &options).await {
            Ok(Some(config)) => {
                log::debug!("Resolved local config for {}: {:?}", path.display(), config);
                ResolvedConfigOutcome::Found(config)
            }
            Ok(None) if settings.require_config => {
                log::info!("Require config set to true and no config present. Skipping file.");
                ResolvedConfigOutcome::Disabled
            }
            Ok(None) => ResolvedConfigOutcome::NotFound,
            Err(e) => {
                log::error!("Invalid prettier configuration file detected: {:#}", e);
                ResolvedConfigOutcome::Errored
            }
        }
    }

    async fn resolved_ignore_path(&self, path: &Path, ignore_path: &str) -> Option<PathBuf> {
        let key = (path.to_path_buf(), ignore_path.to_string());
        if let Some(cached) = self.ignore_paths.lock().await.get(&key).cloned() {
            return cached;
        }

        let mut resolved = self.workspace.workspace_relative_path(path, ignore_path).await;
        if let Some(candidate) = resolved.as_ref().filter(|candidate| !candidate.exists()) {
            // The file may sit in several workspace folders; the one picked
            // above might not hold the ignore file.
            let fallback = self
                .workspace
                .containing_folders(path)
                .await
                .into_iter()
                .map(|(_, root)| root.join(ignore_path))
                .find(|p| p.exists());
            if fallback.is_none() {
                log::debug!("No ignore file found, keeping {}", candidate.display());
            }
            resolved = fallback.or(resolved);
        }

        self.ignore_paths.lock().await.put(key, resolved.clone());
        resolved
    }
}
