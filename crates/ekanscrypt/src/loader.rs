//! Module loader: resolves import names to `.es` files and caches their
//! compiled units.
//!
//! The in-memory cache is keyed by canonical path and remembers the
//! source modification time; a newer source invalidates the entry. When
//! persistence is enabled, compiled units are also written as JSON into
//! the cache directory, one file per source named by a hash of its path.

use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};

use crate::compiler::{CodeObject, compile_source};
use crate::config::{CompileOptions, EngineConfig};
use crate::error::{Error, Result};

/// Source file extension.
pub const EXTENSION: &str = "es";
/// File that turns a directory into a package.
pub const PACKAGE_INIT: &str = "__init__.es";

struct CacheEntry {
    modified: SystemTime,
    code: Arc<CodeObject>,
}

/// On-disk form of a compiled unit.
#[derive(Serialize, Deserialize)]
struct PersistedUnit {
    source: PathBuf,
    modified: SystemTime,
    code: Arc<CodeObject>,
}

/// Locates and compiles modules; shareable across threads.
pub struct ModuleLoader {
    config: EngineConfig,
    cache: RwLock<FxHashMap<PathBuf, CacheEntry>>,
}

impl ModuleLoader {
    /// Creates a loader over the given search paths and cache settings.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    /// The loader configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolves a dotted module name.
    ///
    /// Level 0 searches the configured paths, level 1 the script
    /// directory and level `n` the directory `n - 1` levels above it.
    pub fn resolve(&self, name: &str, level: u32, script_dir: Option<&Path>) -> Result<PathBuf> {
        let relative: PathBuf = name.split('.').collect();
        let roots = match level {
            0 => self.config.search_paths.clone(),
            _ => {
                let dir = script_dir.ok_or_else(|| {
                    Error::Import(format!("relative import of '{}' outside a script", name))
                })?;
                let mut dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
                for _ in 1..level {
                    dir = dir.parent().map(Path::to_path_buf).ok_or_else(|| {
                        Error::Import(format!(
                            "relative import of '{}' beyond the top directory",
                            name
                        ))
                    })?;
                }
                vec![dir]
            }
        };

        for root in &roots {
            let base = root.join(&relative);
            let candidates = [base.with_extension(EXTENSION), base.join(PACKAGE_INIT)];
            if let Some(found) = candidates.into_iter().find(|path| path.is_file()) {
                let found = found.canonicalize()?;
                tracing::trace!(module = name, path = %found.display(), "resolved");
                return Ok(found);
            }
        }
        Err(Error::Import(format!("No module named '{}'", name)))
    }

    /// Returns the compiled unit for `path`, compiling it when the cache
    /// has no entry at least as new as the source.
    pub fn load(&self, path: &Path) -> Result<Arc<CodeObject>> {
        let modified = fs::metadata(path)?.modified()?;
        if let Some(entry) = self.cache.read().get(path) {
            if entry.modified >= modified {
                tracing::trace!(path = %path.display(), "module cache hit");
                return Ok(entry.code.clone());
            }
        }

        let code = match self.read_persisted(path, modified) {
            Some(code) => code,
            None => {
                let source = fs::read_to_string(path)?;
                let mut options = CompileOptions::module(path);
                options.layout_warn_after = self.config.layout_warn_after;
                let code = compile_source(&source, &options)?;
                self.persist(path, modified, &code);
                code
            }
        };

        self.cache.write().insert(
            path.to_path_buf(),
            CacheEntry {
                modified,
                code: code.clone(),
            },
        );
        Ok(code)
    }

    /// Drops every in-memory entry.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Number of units held in memory.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        if !self.config.persist_cache {
            return None;
        }
        self.config
            .cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("ekans")))
    }

    fn persisted_path(&self, source: &Path) -> Option<PathBuf> {
        let mut hasher = FxHasher::default();
        source.hash(&mut hasher);
        let dir = self.cache_dir()?;
        Some(dir.join(format!("{:016x}.json", hasher.finish())))
    }

    fn read_persisted(&self, source: &Path, modified: SystemTime) -> Option<Arc<CodeObject>> {
        let file = self.persisted_path(source)?;
        let text = fs::read_to_string(&file).ok()?;
        let unit: PersistedUnit = match serde_json::from_str(&text) {
            Ok(unit) => unit,
            Err(e) => {
                tracing::debug!(file = %file.display(), error = %e, "ignoring unreadable cache file");
                return None;
            }
        };
        if unit.source != source || unit.modified < modified {
            return None;
        }
        tracing::debug!(path = %source.display(), "loaded persisted unit");
        Some(unit.code)
    }

    fn persist(&self, source: &Path, modified: SystemTime, code: &Arc<CodeObject>) {
        let Some(file) = self.persisted_path(source) else {
            return;
        };
        let unit = PersistedUnit {
            source: source.to_path_buf(),
            modified,
            code: code.clone(),
        };
        let written = file
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .map_err(|e| e.to_string())
            .and_then(|()| serde_json::to_string(&unit).map_err(|e| e.to_string()))
            .and_then(|json| fs::write(&file, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            tracing::warn!(file = %file.display(), error = %e, "failed to persist compiled unit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader_for(dir: &TempDir) -> ModuleLoader {
        ModuleLoader::new(EngineConfig {
            search_paths: vec![dir.path().to_path_buf()],
            ..EngineConfig::default()
        })
    }

    #[test]
    fn test_resolve_module_and_package() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("util.es"), "x = 1").unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg").join("__init__.es"), "").unwrap();
        fs::write(dir.path().join("pkg").join("inner.es"), "y = 2").unwrap();

        let loader = loader_for(&dir);
        let util = loader.resolve("util", 0, None).unwrap();
        assert!(util.ends_with("util.es"));
        let pkg = loader.resolve("pkg", 0, None).unwrap();
        assert!(pkg.ends_with("pkg/__init__.es"));
        let inner = loader.resolve("pkg.inner", 0, None).unwrap();
        assert!(inner.ends_with("pkg/inner.es"));
        assert!(matches!(loader.resolve("missing", 0, None), Err(Error::Import(_))));
    }

    #[test]
    fn test_resolve_relative_levels() {
        let dir = TempDir::new().unwrap();
        let scripts = dir.path().join("app").join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        fs::write(scripts.join("near.es"), "").unwrap();
        fs::write(dir.path().join("app").join("far.es"), "").unwrap();

        let loader = ModuleLoader::new(EngineConfig::default());
        assert!(loader.resolve("near", 1, Some(&scripts)).is_ok());
        assert!(loader.resolve("far", 2, Some(&scripts)).is_ok());
        assert!(loader.resolve("far", 1, Some(&scripts)).is_err());
        assert!(loader.resolve("near", 1, None).is_err());
    }

    #[test]
    fn test_load_caches_until_source_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.es");
        fs::write(&path, "a = 1").unwrap();

        let loader = loader_for(&dir);
        let path = loader.resolve("m", 0, None).unwrap();
        let first = loader.load(&path).unwrap();
        let second = loader.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.cached(), 1);

        let file = fs::File::options().write(true).open(&path).unwrap();
        fs::write(&path, "a = 2").unwrap();
        file.set_modified(SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();
        let third = loader.load(&path).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_compile_errors_propagate() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.es"), "x = )").unwrap();
        let loader = loader_for(&dir);
        let path = loader.resolve("bad", 0, None).unwrap();
        assert!(loader.load(&path).is_err());
        assert_eq!(loader.cached(), 0);
    }

    #[test]
    fn test_persisted_units_survive_a_new_loader() {
        let dir = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        fs::write(dir.path().join("m.es"), "a = 1").unwrap();
        let config = EngineConfig {
            search_paths: vec![dir.path().to_path_buf()],
            cache_dir: Some(cache.path().to_path_buf()),
            persist_cache: true,
            ..EngineConfig::default()
        };

        let loader = ModuleLoader::new(config.clone());
        let path = loader.resolve("m", 0, None).unwrap();
        let compiled = loader.load(&path).unwrap();
        assert_eq!(fs::read_dir(cache.path()).unwrap().count(), 1);

        let reloaded = ModuleLoader::new(config).load(&path).unwrap();
        assert_eq!(*compiled, *reloaded);
    }

    #[test]
    fn test_persisted_non_finite_constants() {
        let dir = TempDir::new().unwrap();
        let cache = TempDir::new().unwrap();
        fs::write(dir.path().join("m.es"), "a = nan; b = -infinity").unwrap();
        let config = EngineConfig {
            search_paths: vec![dir.path().to_path_buf()],
            cache_dir: Some(cache.path().to_path_buf()),
            persist_cache: true,
            ..EngineConfig::default()
        };

        let loader = ModuleLoader::new(config);
        let path = loader.resolve("m", 0, None).unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        let compiled = loader.load(&path).unwrap();
        let persisted = loader.read_persisted(&path, modified).unwrap();
        assert_eq!(*compiled, *persisted);
        assert!(persisted
            .constants
            .iter()
            .any(|c| matches!(c, crate::compiler::Constant::Float(x) if x.is_nan())));
    }
}
