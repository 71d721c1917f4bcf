//! Script compiler: turns parsed script sections into [`ScriptCode`] for the
//! VM and the types, functions and globals a module exposes.
//!
//! [`builder`] drives a build through its declaration phases and hands each
//! body to a function compiler, which emits instructions through the
//! expression, call and statement passes.
//!
//! [`ScriptCode`]: crate::vm::script_code::ScriptCode

pub(crate) mod builder;
pub mod bytecode_io;
mod call;
mod const_eval;
mod conversion;
pub(crate) mod declaration;
mod expr;
mod function_compiler;
mod stmt;
