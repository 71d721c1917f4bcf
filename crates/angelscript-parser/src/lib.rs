//! Lexer and parser for the AngelScript script subset.
//!
//! Two kinds of input are handled:
//! - whole script sections, via [`Parser::parse`]
//! - the declaration strings hosts pass when registering functions,
//!   properties and types, via [`Parser::parse_function_signature`],
//!   [`Parser::parse_property_declaration`] and
//!   [`Parser::parse_type_declaration`]
//!
//! ```
//! use angelscript_parser::Parser;
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let decl = Parser::parse_function_signature("int add(int a, int b)", &arena).unwrap();
//! assert_eq!(decl.name.name, "add");
//! assert_eq!(decl.params.len(), 2);
//! ```

pub mod ast;
pub mod lexer;

pub use angelscript_core::Span;
pub use ast::Parser;
pub use lexer::{Lexer, Token, TokenKind};
