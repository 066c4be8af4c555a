//! Bytecode compiler.
//!
//! The resolved forest is translated by [`codegen`] into symbolic
//! instructions, [`layout`] turns labels into offsets, and [`assembler`]
//! packs the result into an immutable [`CodeObject`].
//!
//! ## Structure
//!
//! - `bytecode` - opcodes and the symbolic instruction list
//! - `codegen` - one translation case per node kind
//! - `layout` - fixed-point jump layout
//! - `assembler` - stack depth analysis and byte encoding
//! - `code` - the code object and its disassembler

pub mod assembler;
pub mod bytecode;
pub mod code;
pub mod codegen;
pub mod layout;

pub use bytecode::{Instr, Label, OpCode};
pub use code::{CodeFlags, CodeObject, Constant};
pub use codegen::Compiler;

use std::sync::Arc;

use crate::ast::Node;
use crate::config::CompileOptions;
use crate::error::Result;

/// Compiles a resolved forest into the unit's top-level code object.
pub fn compile_module(nodes: &[Node], options: &CompileOptions) -> Result<Arc<CodeObject>> {
    let code = Compiler::new(options).compile_module(nodes)?;
    Ok(Arc::new(code))
}

/// Runs the whole pipeline over one source text.
pub fn compile_source(source: &str, options: &CompileOptions) -> Result<Arc<CodeObject>> {
    let span = tracing::debug_span!("compile", unit = %options.filename);
    let _guard = span.enter();

    let tokens = crate::lexer::tokenize(source)?;
    let mut forest = crate::parser::parse(tokens)?;
    crate::resolver::resolve(&mut forest)?;
    compile_module(&forest, options)
}

/// Compiles independent units on a thread pool.
///
/// Each unit owns its buffers, scopes and label counter, so units never
/// share compiler state.
#[cfg(feature = "parallel")]
pub struct ParallelCompiler {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ParallelCompiler {
    /// Creates a compiler with the default number of threads.
    pub fn new() -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new())
    }

    /// Creates a compiler with a specific number of threads.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new().num_threads(num_threads))
    }

    fn build(builder: rayon::ThreadPoolBuilder) -> Result<Self> {
        let pool = builder
            .build()
            .map_err(|e| crate::Error::Internal(format!("failed to create thread pool: {}", e)))?;
        Ok(Self { pool })
    }

    /// Compiles `(source, options)` pairs; results keep the input order.
    pub fn compile_all(&self, units: &[(&str, CompileOptions)]) -> Vec<Result<Arc<CodeObject>>> {
        use rayon::prelude::*;

        self.pool.install(|| {
            units
                .par_iter()
                .map(|(source, options)| compile_source(source, options))
                .collect()
        })
    }
}

#[cfg(all(test, feature = "parallel"))]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_compile_keeps_order() {
        let compiler = ParallelCompiler::with_threads(2).unwrap();
        let units = vec![
            ("a = 1", CompileOptions::default()),
            ("b = )", CompileOptions::default()),
            ("c = 3", CompileOptions::default()),
        ];
        let results = compiler.compile_all(&units);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        let code = results[2].as_ref().unwrap();
        assert!(code.names.iter().any(|n| n == "c") || code.varnames.iter().any(|n| n == "c"));
    }
}
