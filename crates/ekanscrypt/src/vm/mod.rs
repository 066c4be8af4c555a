//! Reference runtime for compiled code objects.
//!
//! A straightforward stack machine: one [`Frame`] per activation, a
//! value stack, a block stack of protected regions and a stack of the
//! exceptions being handled. Values are reference counted and the
//! interpreter is single threaded.
//!
//! ## Structure
//!
//! - `interpreter` - frames, unwinding and the opcode loop
//! - `calls` - argument binding, classes and generators
//! - `attributes` - attribute access and instance operator methods
//! - `operators` - arithmetic and comparison of builtin values
//! - `imports` - module import through the loader

mod attributes;
mod calls;
mod frame;
mod imports;
mod interpreter;
pub mod operators;

pub use frame::{Block, Frame};
pub use interpreter::{Interpreter, MAX_DEPTH};
