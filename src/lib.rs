//! kons: a small s-expression interpreter.
//!
//! Source text is read into nodes allocated on a kind-segregated slab
//! heap, evaluated under lexical scope, and reclaimed by a stop-the-world
//! mark-sweep collector with explicit roots.

pub mod error;
pub mod eval;
pub mod globals;
pub mod heap;
pub mod page;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod scope;
pub mod symbol;
pub mod value;
