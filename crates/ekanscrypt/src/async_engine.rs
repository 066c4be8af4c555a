//! Asynchronous engine APIs.
//!
//! Source files are read with tokio and compiled on the blocking pool,
//! so many units can be prepared concurrently. Execution stays on the
//! calling task: the reference runtime is single threaded.
//!
//! # Example
//!
//! ```ignore
//! use ekanscrypt::AsyncEngine;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = AsyncEngine::default();
//!     let value = engine.eval_file("script.es").await.unwrap();
//!     println!("{}", value);
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;

use crate::builtins::Output;
use crate::compiler::{CodeObject, compile_source};
use crate::config::{CompileOptions, EngineConfig};
use crate::error::{Error, Result};
use crate::last_value;
use crate::loader::ModuleLoader;
use crate::runtime::{Value, namespace};
use crate::vm::Interpreter;

/// Compiles on the blocking pool and runs each file in a fresh
/// interpreter; every interpreter shares one module loader.
pub struct AsyncEngine {
    loader: Arc<ModuleLoader>,
    output: Output,
}

impl AsyncEngine {
    /// Creates an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            loader: Arc::new(ModuleLoader::new(config)),
            output: Output::Stdout,
        }
    }

    /// Redirects `print` of every evaluated unit.
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// The shared module loader.
    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    /// Compiles source text without blocking the runtime.
    pub async fn compile(&self, source: String, options: CompileOptions) -> Result<Arc<CodeObject>> {
        tokio::task::spawn_blocking(move || compile_source(&source, &options))
            .await
            .map_err(|e| Error::Internal(format!("compile task failed: {}", e)))?
    }

    /// Reads and compiles a module file.
    pub async fn compile_file(&self, path: impl AsRef<Path>) -> Result<Arc<CodeObject>> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).await?;
        let mut options = CompileOptions::module(path);
        options.layout_warn_after = self.loader.config().layout_warn_after;
        self.compile(source, options).await
    }

    /// Compiles several files concurrently; results keep the input order.
    pub async fn compile_files(&self, paths: &[impl AsRef<Path>]) -> Vec<Result<Arc<CodeObject>>> {
        let futures: Vec<_> = paths.iter().map(|p| self.compile_file(p)).collect();
        futures::future::join_all(futures).await
    }

    /// Evaluates one interactive line in a fresh interpreter.
    pub async fn eval(&self, source: &str) -> Result<Value> {
        let code = self
            .compile(source.to_string(), CompileOptions::repl())
            .await?;
        let exports = self.interpreter().run(&code, &namespace())?;
        Ok(last_value(&exports))
    }

    /// Runs a module file and returns its export map.
    pub async fn eval_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let code = self.compile_file(path).await?;
        self.interpreter().run(&code, &namespace())
    }

    /// Compiles several files concurrently, then runs them in order.
    pub async fn eval_files(&self, paths: &[PathBuf]) -> Vec<Result<Value>> {
        let compiled = self.compile_files(paths).await;
        compiled
            .into_iter()
            .map(|code| code.and_then(|code| self.interpreter().run(&code, &namespace())))
            .collect()
    }

    fn interpreter(&self) -> Interpreter {
        Interpreter::new()
            .with_output(self.output.clone())
            .with_loader(self.loader.clone())
    }
}

impl Default for AsyncEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_eval() {
        let engine = AsyncEngine::default();
        let value = engine.eval("x = 20; x + 22").await.unwrap();
        assert_eq!(value, Value::Int(42));
    }

    #[tokio::test]
    async fn test_eval_files_keeps_order() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.es");
        let broken = dir.path().join("broken.es");
        std_fs::write(&first, "answer = 6 * 7").unwrap();
        std_fs::write(&broken, "answer = (").unwrap();

        let (output, _) = Output::buffer();
        let engine = AsyncEngine::default().with_output(output);
        let results = engine.eval_files(&[first, broken]).await;
        assert_eq!(results.len(), 2);
        let Ok(Value::Map(exports)) = &results[0] else {
            panic!("expected an export map");
        };
        assert_eq!(
            exports.borrow().get(&Value::str("answer")),
            Some(&Value::Int(42))
        );
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let engine = AsyncEngine::default();
        assert!(matches!(
            engine.eval_file("/nonexistent/ekans/file.es").await,
            Err(Error::Io(_))
        ));
    }
}
