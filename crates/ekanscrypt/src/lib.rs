// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # ekanscrypt
//!
//! Compiler pipeline and reference runtime for the ekanscrypt scripting
//! language.
//!
//! ## Overview
//!
//! Source text flows through these stages:
//! - [`lexer`] splits it into tokens
//! - [`parser`] groups tokens into a tree by repeated rule sweeps
//! - [`resolver`] decides the storage class of every name
//! - [`compiler`] emits bytecode, lays out jumps and assembles code objects
//! - [`vm`] executes code objects against the [`runtime`] data model
//!
//! [`loader`] resolves and caches imported modules, [`builtins`] provides
//! the global functions and classes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ekanscrypt::{Engine, Value};
//!
//! let mut engine = Engine::new();
//! let result = engine.eval("x = 1; x = x + 2")?;
//! assert_eq!(result, Value::Int(3));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod resolver;
pub mod runtime;
pub mod vm;

#[cfg(feature = "async")]
pub mod async_engine;

use std::path::Path;
use std::sync::Arc;

pub use builtins::Output;
pub use compiler::{CodeObject, compile_source};
#[cfg(feature = "parallel")]
pub use compiler::ParallelCompiler;
pub use config::{CompileMode, CompileOptions, EngineConfig};
pub use error::{Diagnostic, Error, Result};
pub use loader::ModuleLoader;
pub use runtime::{Namespace, Value};
pub use vm::Interpreter;

#[cfg(feature = "async")]
pub use async_engine::AsyncEngine;

/// The pipeline and a reference interpreter with one interactive
/// session.
///
/// Names bound by [`Engine::eval`] stay visible to later calls.
pub struct Engine {
    interpreter: Interpreter,
    globals: Namespace,
    loader: Arc<ModuleLoader>,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine whose imports use `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        let loader = Arc::new(ModuleLoader::new(config));
        Self {
            interpreter: Interpreter::new().with_loader(loader.clone()),
            globals: runtime::namespace(),
            loader,
        }
    }

    /// Redirects `print` and `eprint`.
    pub fn with_output(mut self, output: Output) -> Self {
        self.interpreter = std::mem::take(&mut self.interpreter)
            .with_output(output)
            .with_loader(self.loader.clone());
        self
    }

    /// Compiles source text without running it.
    pub fn compile(&self, source: &str, options: &CompileOptions) -> Result<Arc<CodeObject>> {
        let mut options = options.clone();
        options.layout_warn_after = self.loader.config().layout_warn_after;
        compile_source(source, &options)
    }

    /// Evaluates an interactive line in the session and returns the
    /// value of its last expression.
    pub fn eval(&mut self, source: &str) -> Result<Value> {
        let code = self.compile(source, &CompileOptions::repl())?;
        let exports = self.interpreter.run(&code, &self.globals)?;
        if let Value::Map(map) = &exports {
            let mut globals = self.globals.borrow_mut();
            for (key, value) in map.borrow().iter() {
                if let Value::Str(key) = key {
                    globals.insert(key.to_string(), value.clone());
                }
            }
        }
        Ok(last_value(&exports))
    }

    /// Runs a module file in its own name-space and returns its export
    /// map.
    pub fn run_file(&mut self, path: &Path) -> Result<Value> {
        let source = std::fs::read_to_string(path)?;
        let code = self.compile(&source, &CompileOptions::module(path))?;
        tracing::debug!(path = %path.display(), "running file");
        self.interpreter.run(&code, &runtime::namespace())
    }

    /// Names bound in the session and the builtins, for completion.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.borrow().keys().cloned().collect();
        names.extend(self.interpreter.builtin_names().map(str::to_string));
        names.sort();
        names.dedup();
        names
    }

    /// Forgets every name bound in the session.
    pub fn reset(&mut self) {
        self.globals = runtime::namespace();
    }

    /// The module loader shared by imports.
    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// The `_` entry of a REPL export map.
pub(crate) fn last_value(exports: &Value) -> Value {
    match exports {
        Value::Map(map) => map
            .borrow()
            .get(&Value::str("_"))
            .cloned()
            .unwrap_or(Value::None),
        _ => Value::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_keeps_names() {
        let mut engine = Engine::new();
        assert_eq!(engine.eval("x = 40").unwrap(), Value::Int(40));
        assert_eq!(engine.eval("x + 2").unwrap(), Value::Int(42));
        assert!(engine.names().iter().any(|name| name == "x"));
        engine.reset();
        assert!(engine.eval("x").is_err());
    }

    #[test]
    fn test_compile_errors_are_reported() {
        let mut engine = Engine::new();
        assert!(matches!(engine.eval("return 1"), Err(Error::Compile(_))));
    }

    #[test]
    fn test_uncaught_exception() {
        let mut engine = Engine::new();
        let Err(Error::Runtime(message)) = engine.eval("raise ValueError('bad')") else {
            panic!("expected a runtime error");
        };
        assert_eq!(message, "ValueError: bad");
    }
}
