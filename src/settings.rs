//! Editor settings, pass-through Prettier options and workspace trust.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Settings section requested through `workspace/configuration`.
pub const SETTINGS_SECTION: &str = "prettier";

/// Ignore file used when none is configured or the workspace is untrusted.
pub const DEFAULT_IGNORE_PATH: &str = ".prettierignore";

/// Workspace settings Prettier understands. Only these are forwarded when
/// no local configuration is found.
pub const FALLBACK_OPTION_KEYS: &[&str] = &[
    "arrowParens",
    "bracketSpacing",
    "endOfLine",
    "htmlWhitespaceSensitivity",
    "insertPragma",
    "singleAttributePerLine",
    "bracketSameLine",
    "jsxBracketSameLine",
    "jsxSingleQuote",
    "printWidth",
    "proseWrap",
    "quoteProps",
    "requirePragma",
    "semi",
    "singleQuote",
    "tabWidth",
    "trailingComma",
    "useTabs",
    "embeddedLanguageFormatting",
    "vueIndentScriptAndStyle",
];

/// Effective settings for one document.
///
/// Environment keys are typed; everything else lands in `options` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrettierSettings {
    /// Explicit path to a Prettier module
    #[serde(default)]
    pub prettier_path: Option<String>,
    /// Explicit path to a Prettier config file
    #[serde(default)]
    pub config_path: Option<String>,
    /// Ignore file name, resolved relative to the workspace folder
    #[serde(default = "default_ignore_path")]
    pub ignore_path: Option<String>,
    #[serde(default)]
    pub document_selectors: Vec<String>,
    /// Honor `.editorconfig` during config discovery (default: true)
    #[serde(default = "default_true")]
    pub use_editor_config: bool,
    /// Format files inside `node_modules`
    #[serde(default)]
    pub with_node_modules: bool,
    /// Fall back to globally installed Prettier
    #[serde(default)]
    pub resolve_global_modules: bool,
    /// Only format files that have a local Prettier config
    #[serde(default)]
    pub require_config: bool,
    #[serde(flatten)]
    pub options: PrettierOptions,
}

fn default_ignore_path() -> Option<String> {
    Some(DEFAULT_IGNORE_PATH.to_string())
}

fn default_true() -> bool {
    true
}

impl Default for PrettierSettings {
    fn default() -> Self {
        Self {
            prettier_path: None,
            config_path: None,
            ignore_path: default_ignore_path(),
            document_selectors: Vec::new(),
            use_editor_config: true,
            with_node_modules: false,
            resolve_global_modules: false,
            require_config: false,
            options: PrettierOptions::default(),
        }
    }
}

impl PrettierSettings {
    /// Parse a `workspace/configuration` result. `null` means "nothing set".
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    /// Strip everything that could load code or read outside the workspace.
    pub fn sanitized(self) -> Self {
        Self {
            prettier_path: None,
            config_path: None,
            ignore_path: default_ignore_path(),
            document_selectors: Vec::new(),
            use_editor_config: false,
            with_node_modules: false,
            resolve_global_modules: false,
            ..self
        }
    }

    /// Configured ignore file name, if any.
    pub fn ignore_file_name(&self) -> Option<&str> {
        self.ignore_path.as_deref().filter(|name| !name.is_empty())
    }

    /// Workspace options forwarded to Prettier when no local config exists.
    pub fn fallback_options(&self) -> PrettierOptions {
        let mut fallback = PrettierOptions::default();
        for key in FALLBACK_OPTION_KEYS {
            if let Some(value) = self.options.get(key) {
                fallback.insert(*key, value.clone());
            }
        }
        fallback
    }
}

/// Options object handed to Prettier. Opaque apart from the handful of keys
/// the formatting pipeline sets itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrettierOptions(Map<String, Value>);

impl PrettierOptions {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Overlay `other` on top of `self`; keys in `other` win. Explicit nulls
    /// in `other` count as absent and leave `self` untouched.
    pub fn extend(&mut self, other: PrettierOptions) {
        self.0
            .extend(other.0.into_iter().filter(|(_, value)| !value.is_null()));
    }

    pub fn parser(&self) -> Option<&str> {
        self.get("parser").and_then(Value::as_str)
    }

    pub fn requires_pragma(&self) -> bool {
        self.get("requirePragma").and_then(Value::as_bool) == Some(true)
    }
}

/// Workspace trust for the session. Starts untrusted.
#[derive(Debug, Default)]
pub struct TrustState {
    trusted: AtomicBool,
}

impl TrustState {
    pub fn is_trusted(&self) -> bool {
        self.trusted.load(Ordering::SeqCst)
    }

    /// Only the `workspace/didChangeTrust` handler calls this.
    pub fn set_trusted(&self, trusted: bool) {
        self.trusted.store(trusted, Ordering::SeqCst);
    }
}
