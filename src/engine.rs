//! Prettier running in a `node` child process.
//!
//! Every call spawns `node` with a small bridge script, writes one JSON
//! request to its stdin and reads one JSON response from its stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tower_lsp::async_trait;

use crate::provider::{
    FileInfo, FileInfoOptions, PrettierEngine, ResolveConfigOptions, SupportInfo,
};
use crate::settings::PrettierOptions;

/// Oldest Prettier the bridge knows how to drive.
pub const MIN_PRETTIER_VERSION: (u64, u64) = (1, 13);

const BRIDGE_SCRIPT: &str = r#"
let input = "";
process.stdin.setEncoding("utf8");
process.stdin.on("data", (chunk) => (input += chunk));
process.stdin.on("end", async () => {
  try {
    const request = JSON.parse(input);
    const prettier = require(request.modulePath);
    let result;
    switch (request.method) {
      case "format":
        result = await prettier.format(request.text, request.options);
        break;
      case "getFileInfo":
        result = await prettier.getFileInfo(request.filePath, request.options);
        break;
      case "getSupportInfo":
        result = await prettier.getSupportInfo();
        break;
      case "resolveConfig":
        result = await prettier.resolveConfig(request.filePath, request.options);
        break;
      default:
        throw new Error(`unknown method ${request.method}`);
    }
    process.stdout.write(JSON.stringify({ ok: true, result: result ?? null }));
  } catch (error) {
    process.stdout.write(
      JSON.stringify({ ok: false, error: String((error && error.stack) || error) })
    );
  }
});
"#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeRequest<'a> {
    module_path: &'a Path,
    method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_path: Option<&'a Path>,
    options: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// `package.json` of a candidate Prettier module.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
}

impl PackageManifest {
    pub fn read(module_dir: &Path) -> anyhow::Result<Self> {
        let path = module_dir.join("package.json");
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid {}", path.display()))
    }

    /// `major.minor` of the version, ignoring any pre-release suffix.
    pub fn major_minor(&self) -> Option<(u64, u64)> {
        let mut parts = self
            .version
            .split(|c: char| c == '.' || c == '-' || c == '+');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some((major, minor))
    }

    pub fn is_supported(&self) -> bool {
        self.name == "prettier"
            && self
                .major_minor()
                .is_some_and(|version| version >= MIN_PRETTIER_VERSION)
    }
}

#[derive(Debug)]
pub struct NodePrettier {
    node: PathBuf,
    module_dir: PathBuf,
    version: String,
    support_info: OnceCell<SupportInfo>,
}

impl NodePrettier {
    /// Load the module at `module_dir`, rejecting anything that is not a
    /// supported Prettier. The directory is made absolute so the bridge can
    /// `require` it from any working directory.
    pub fn load(node: &Path, module_dir: &Path) -> anyhow::Result<Self> {
        let module_dir = std::fs::canonicalize(module_dir)
            .with_context(|| format!("failed to resolve {}", module_dir.display()))?;
        let manifest = PackageManifest::read(&module_dir)?;
        if !manifest.is_supported() {
            bail!(
                "{} {} at {} is not a supported Prettier (need >= {}.{})",
                manifest.name,
                manifest.version,
                module_dir.display(),
                MIN_PRETTIER_VERSION.0,
                MIN_PRETTIER_VERSION.1
            );
        }
        Ok(Self {
            node: node.to_path_buf(),
            module_dir,
            version: manifest.version,
            support_info: OnceCell::new(),
        })
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    async fn call<T: DeserializeOwned>(&self, request: BridgeRequest<'_>) -> anyhow::Result<T> {
        let method = request.method;
        let payload = serde_json::to_vec(&request)?;

        let mut child = Command::new(&self.node)
            .arg("-e")
            .arg(BRIDGE_SCRIPT)
            .current_dir(&self.module_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.node.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to open node stdin"))?;
        stdin.write_all(&payload).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            bail!(
                "node exited with {} during {}: {}",
                output.status,
                method,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let response: BridgeResponse = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("malformed response to {}", method))?;
        if !response.ok {
            bail!(
                "{}",
                response
                    .error
                    .unwrap_or_else(|| format!("{} failed", method))
            );
        }
        serde_json::from_value(response.result)
            .with_context(|| format!("unexpected result shape for {}", method))
    }
}

#[async_trait]
impl PrettierEngine for NodePrettier {
    async fn format(&self, text: &str, options: &PrettierOptions) -> anyhow::Result<String> {
        self.call(BridgeRequest {
            module_path: &self.module_dir,
            method: "format",
            text: Some(text),
            file_path: None,
            options: serde_json::to_value(options)?,
        })
        .await
    }

    async fn file_info(&self, path: &Path, options: &FileInfoOptions) -> anyhow::Result<FileInfo> {
        self.call(BridgeRequest {
            module_path: &self.module_dir,
            method: "getFileInfo",
            text: None,
            file_path: Some(path),
            options: serde_json::to_value(options)?,
        })
        .await
    }

    async fn support_info(&self) -> anyhow::Result<SupportInfo> {
        let info = self
            .support_info
            .get_or_try_init(|| {
                self.call::<SupportInfo>(BridgeRequest {
                    module_path: &self.module_dir,
                    method: "getSupportInfo",
                    text: None,
                    file_path: None,
                    options: Value::Null,
                })
            })
            .await?;
        Ok(info.clone())
    }

    async fn resolve_config(
        &self,
        path: &Path,
        options: &ResolveConfigOptions,
    ) -> anyhow::Result<Option<PrettierOptions>> {
        self.call(BridgeRequest {
            module_path: &self.module_dir,
            method: "resolveConfig",
            text: None,
            file_path: Some(path),
            options: serde_json::to_value(options)?,
        })
        .await
    }
}
