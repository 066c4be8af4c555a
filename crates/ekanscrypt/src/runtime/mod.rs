//! Runtime data model of the reference interpreter.
//!
//! ## Structure
//!
//! - `value` - the [`Value`] enum, truthiness, equality and hashing
//! - `object` - functions, classes, instances, modules, cells, iterators
//! - `exception` - exceptions in flight and the builtin class table

pub mod exception;
pub mod object;
pub mod value;

pub use exception::{Raised, RunResult};
pub use object::{Args, Namespace, namespace};
pub use value::{Dict, HashKey, Value};
