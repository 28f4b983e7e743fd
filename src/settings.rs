//! Settings for uibeam-lsp.
//!
//! Settings are read from a `uibeam-lsp.toml` file discovered from the
//! workspace root. Every field is optional:
//!
//! ```toml
//! [markup]
//! command = "vscode-html-language-server"
//! args = ["--stdio"]
//!
//! [auto_insert]
//! auto_quote = true
//! auto_close = true
//! debounce_ms = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Name of the settings file looked up during discovery.
pub const SETTINGS_FILE: &str = "uibeam-lsp.toml";

/// Root settings structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// The HTML language server virtual documents are delegated to.
    pub markup: MarkupSettings,
    /// Automatic quote and closing-tag insertion.
    pub auto_insert: AutoInsertSettings,
}

/// How to launch the markup language server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarkupSettings {
    /// Executable to spawn.
    pub command: String,
    /// Arguments; the server must speak LSP over stdio.
    pub args: Vec<String>,
}

impl Default for MarkupSettings {
    fn default() -> Self {
        Self {
            command: "vscode-html-language-server".to_string(),
            args: vec!["--stdio".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoInsertSettings {
    /// Insert `""` after typing `=` in a tag.
    pub auto_quote: bool,
    /// Insert the closing tag after typing `>` or `</`.
    pub auto_close: bool,
    /// Delay before asking the markup server, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for AutoInsertSettings {
    fn default() -> Self {
        Self {
            auto_quote: true,
            auto_close: true,
            debounce_ms: 100,
        }
    }
}

impl AutoInsertSettings {
    pub fn any_enabled(&self) -> bool {
        self.auto_quote || self.auto_close
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Parse settings from TOML text.
pub fn parse_settings(content: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str(content)
}

/// Load settings from a file.
///
/// Returns default settings if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(content) => match parse_settings(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse settings");
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Discover the settings file by searching up the directory tree, then the
/// immediate child directories of `start_dir`.
///
/// Returns `(settings, settings_dir)` where `settings_dir` is the directory
/// that held the file, or `start_dir` when none was found.
pub fn discover_settings(start_dir: &Path) -> (Settings, PathBuf) {
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(SETTINGS_FILE);
        if candidate.is_file() {
            return (load_settings(&candidate), dir.to_path_buf());
        }
        current = dir.parent();
    }

    if let Ok(entries) = std::fs::read_dir(start_dir) {
        for entry in entries.flatten() {
            if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                let candidate = entry.path().join(SETTINGS_FILE);
                if candidate.is_file() {
                    return (load_settings(&candidate), entry.path());
                }
            }
        }
    }

    (Settings::default(), start_dir.to_path_buf())
}
