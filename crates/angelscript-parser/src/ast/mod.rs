//! Syntax tree and parser.
//!
//! Nodes are allocated in a [`bumpalo::Bump`] arena and borrow their text
//! from it, so a whole build can share one arena and drop it in one go.
//!
//! ```
//! use angelscript_parser::Parser;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let script = Parser::parse("int add(int a, int b) { return a + b; }", &arena).unwrap();
//! assert_eq!(script.items().len(), 1);
//! ```

mod node;
mod ops;
mod types;

mod expr;
mod expr_parser;

mod stmt;
mod stmt_parser;

mod decl;
mod decl_parser;

mod parser;
mod type_parser;

pub use angelscript_core::{ParseError, ParseErrorKind, ParseErrors};

pub use decl::*;
pub use expr::*;
pub use node::*;
pub use ops::*;
pub use parser::Parser;
pub use stmt::*;
pub use type_parser::primitive_of;
pub use types::*;
