//! `IMPORT_NAME` and `IMPORT_FROM`.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::frame::Frame;
use super::interpreter::{Exit, Interpreter};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::loader::ModuleLoader;
use crate::runtime::exception::{Raised, RunResult};
use crate::runtime::object::{Module, namespace};
use crate::runtime::value::Value;

impl Interpreter {
    /// Imports a dotted module name.
    ///
    /// Every prefix is imported in turn and attached to its parent.
    /// Without a from-list the top package is returned, otherwise the
    /// innermost module.
    pub(crate) fn import(
        &mut self,
        frame: &Frame,
        name: &str,
        level: u32,
        fromlist: &Value,
    ) -> RunResult<Value> {
        let script_dir = script_dir(&frame.code.filename);
        let mut top = None;
        let mut parent: Option<Value> = None;
        let mut prefix = String::new();
        for part in name.split('.') {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);

            let loader = self.loader();
            let path = loader
                .resolve(&prefix, level, script_dir.as_deref())
                .map_err(import_error)?;
            let module = self.import_path(&prefix, path)?;
            if let Some(Value::Module(parent)) = &parent {
                parent
                    .attrs
                    .borrow_mut()
                    .insert(part.to_string(), module.clone());
            }
            top.get_or_insert_with(|| module.clone());
            parent = Some(module);
        }

        let innermost = parent.ok_or_else(|| Raised::new("ImportError", "empty module name"))?;
        match fromlist {
            Value::None => Ok(top.unwrap_or(innermost)),
            Value::Tuple(names) if names.is_empty() => Ok(top.unwrap_or(innermost)),
            _ => Ok(innermost),
        }
    }

    /// Runs a module body once per interpreter and wraps its exports.
    fn import_path(&mut self, name: &str, path: PathBuf) -> RunResult<Value> {
        if let Some(module) = self.modules.get(&path) {
            return Ok(module.clone());
        }
        let code = self
            .loader()
            .load(&path)
            .map_err(import_error)?;

        let module = Rc::new(Module {
            name: name.to_string(),
            attrs: RefCell::new(FxHashMap::default()),
        });
        let value = Value::Module(module.clone());
        // Registered before the body runs so cyclic imports terminate.
        self.modules.insert(path.clone(), value.clone());
        tracing::debug!(module = name, path = %path.display(), "importing");

        let globals = namespace();
        globals
            .borrow_mut()
            .insert("__name__".to_string(), Value::str(name));
        let mut frame = self.frame(&code, globals);
        frame.module_scope = true;
        let exports = match self.run_frame(&mut frame) {
            Ok(Exit::Return(exports)) => exports,
            Ok(Exit::Yield(_)) => {
                self.modules.remove(&path);
                return Err(Raised::new("ImportError", "yield at module level"));
            }
            Err(raised) => {
                self.modules.remove(&path);
                return Err(raised);
            }
        };

        if let Value::Map(dict) = exports {
            let mut attrs = module.attrs.borrow_mut();
            for (key, value) in dict.borrow().iter() {
                if let Value::Str(key) = key {
                    if !key.starts_with('_') {
                        attrs.insert(key.to_string(), value.clone());
                    }
                }
            }
        }
        Ok(value)
    }

    /// `from module import name`.
    pub(crate) fn import_from(&mut self, module: &Value, name: &str) -> RunResult<Value> {
        match module {
            Value::Module(m) => m.attrs.borrow().get(name).cloned().ok_or_else(|| {
                Raised::new(
                    "ImportError",
                    format!("cannot import name '{}' from '{}'", name, m.name),
                )
            }),
            other => self.get_attr(other, name),
        }
    }

    /// The configured loader, or one over the default configuration.
    fn loader(&mut self) -> Arc<ModuleLoader> {
        self.loader
            .get_or_insert_with(|| Arc::new(ModuleLoader::new(EngineConfig::default())))
            .clone()
    }
}

fn import_error(error: Error) -> Raised {
    match error {
        Error::Import(message) => Raised::new("ImportError", message),
        other => Raised::new("ImportError", other.to_string()),
    }
}

/// Directory of the running script; the working directory for code
/// that did not come from a file.
fn script_dir(filename: &str) -> Option<PathBuf> {
    if filename.starts_with('<') {
        return std::env::current_dir().ok();
    }
    match Path::new(filename).parent() {
        Some(dir) if dir.as_os_str().is_empty() => Some(PathBuf::from(".")),
        Some(dir) => Some(dir.to_path_buf()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_dir() {
        assert_eq!(script_dir("lib/util.es"), Some(PathBuf::from("lib")));
        assert_eq!(script_dir("main.es"), Some(PathBuf::from(".")));
        assert!(script_dir("<string>").is_some());
    }
}
