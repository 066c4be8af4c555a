//! Compile options and engine configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding extra module search paths.
pub const ENV_PATH: &str = "EKANS_PATH";
/// Environment variable overriding the compiled unit cache directory.
pub const ENV_CACHE_DIR: &str = "EKANS_CACHE_DIR";

/// How the top level of a unit is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileMode {
    /// A module body: returns a map of every name bound at the top level.
    #[default]
    Module,
    /// An interactive line: like a module, and also binds the last value to `_`.
    Repl,
    /// A plain function body.
    Function,
}

impl CompileMode {
    /// True when top-level bindings are exported as a namespace map.
    pub fn exports(self) -> bool {
        matches!(self, CompileMode::Module | CompileMode::Repl)
    }
}

/// Per-unit compiler input.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Top-level compilation mode
    pub mode: CompileMode,
    /// Qualified name given to the top-level code object
    pub name: String,
    /// File name recorded in every code object of the unit
    pub filename: Arc<str>,
    /// Names known to live in the global environment at compile time
    pub globals: Arc<FxHashSet<String>>,
    /// Layout passes after which a warning is logged
    pub layout_warn_after: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            mode: CompileMode::Module,
            name: "<module>".to_string(),
            filename: Arc::from("<string>"),
            globals: Arc::new(FxHashSet::default()),
            layout_warn_after: 10,
        }
    }
}

impl CompileOptions {
    /// Options for a module loaded from `path`.
    pub fn module(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<module>".to_string());
        Self {
            mode: CompileMode::Module,
            name,
            filename: Arc::from(path.to_string_lossy().as_ref()),
            ..Self::default()
        }
    }

    /// Options for one interactive line.
    pub fn repl() -> Self {
        Self {
            mode: CompileMode::Repl,
            name: "<repl>".to_string(),
            filename: Arc::from("<stdin>"),
            ..Self::default()
        }
    }

    /// Replaces the compile-time global name set.
    pub fn with_globals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.globals = Arc::new(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Settings for an [`Engine`](crate::Engine) and its module loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directories searched for absolute imports
    pub search_paths: Vec<PathBuf>,

    /// Directory for persisted compiled units
    pub cache_dir: Option<PathBuf>,

    /// Persist compiled units into `cache_dir`
    pub persist_cache: bool,

    /// Layout passes after which a warning is logged
    pub layout_warn_after: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_paths: vec![PathBuf::from(".")],
            cache_dir: None,
            persist_cache: false,
            layout_warn_after: 10,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default location and the environment.
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.load_from_env();
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse TOML configuration text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `EKANS_*` environment overrides.
    pub fn load_from_env(&mut self) {
        if let Ok(value) = std::env::var(ENV_PATH) {
            self.set("path", &value);
        }
        if let Ok(value) = std::env::var(ENV_CACHE_DIR) {
            self.set("cache-dir", &value);
        }
    }

    /// Set a configuration value by key.
    pub fn set(&mut self, key: &str, value: &str) {
        match key {
            "path" => {
                let extra: Vec<PathBuf> = std::env::split_paths(value).collect();
                self.search_paths.splice(0..0, extra);
            }
            "cache-dir" => {
                self.cache_dir = Some(PathBuf::from(value));
                self.persist_cache = true;
            }
            "persist-cache" => self.persist_cache = value == "true",
            "layout-warn-after" => {
                if let Ok(n) = value.parse() {
                    self.layout_warn_after = n;
                }
            }
            _ => tracing::warn!("Unknown config key: {}", key),
        }
    }
}

/// `<config dir>/ekans/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ekans").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.search_paths, vec![PathBuf::from(".")]);
        assert!(config.cache_dir.is_none());
        assert_eq!(config.layout_warn_after, 10);
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml(
            r#"
            search_paths = ["lib", "vendor"]
            cache_dir = "/tmp/ekans"
            persist_cache = true
            "#,
        )
        .unwrap();
        assert_eq!(config.search_paths.len(), 2);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/ekans")));
        assert!(config.persist_cache);
        assert_eq!(config.layout_warn_after, 10);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            EngineConfig::from_toml("search_paths = 3"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_set_path_prepends() {
        let mut config = EngineConfig::default();
        config.set("path", "lib");
        assert_eq!(config.search_paths[0], PathBuf::from("lib"));
        assert_eq!(config.search_paths[1], PathBuf::from("."));
    }

    #[test]
    fn test_mode_exports() {
        assert!(CompileMode::Module.exports());
        assert!(CompileMode::Repl.exports());
        assert!(!CompileMode::Function.exports());
    }
}
