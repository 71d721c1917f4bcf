//! Bytecode representation and the interpreter that runs it.

pub(crate) mod instruction;
pub(crate) mod machine;
pub(crate) mod ops;
pub(crate) mod script_code;
