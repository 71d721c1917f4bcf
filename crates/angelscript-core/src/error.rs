//! Error types for every phase of the runtime.
//!
//! ```text
//! ScriptError           - what host-facing operations return
//! ├── AngelScript(ReturnCode)
//! ├── Build(Vec<CompilationError>)
//! └── ...
//! LexError / ParseError - front-end diagnostics with spans
//! CompilationError      - semantic diagnostics with spans
//! ```

use std::ffi::NulError;
use std::str::Utf8Error;

use thiserror::Error;

use crate::enums::ReturnCode;
use crate::Span;

/// Result alias used across the runtime.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Errors surfaced to hosts.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("AngelScript error: {0:?}")]
    AngelScript(ReturnCode),

    #[error("Null pointer encountered")]
    NullPointer,

    #[error("build failed with {} error(s)", .0.len())]
    Build(Vec<CompilationError>),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseErrors),

    #[error("String conversion error: {0}")]
    StringConversion(#[from] NulError),

    #[error("UTF-8 conversion error: {0}")]
    Utf8Conversion(#[from] Utf8Error),

    #[error("ScriptGeneric error: {0}")]
    Generic(String),

    #[error("Unknown error code: {0}")]
    Unknown(i32),
}

impl ScriptError {
    /// Turn a raw result code into a `ScriptResult`.
    ///
    /// Non-negative codes are success.
    pub fn from_code(code: i32) -> ScriptResult<()> {
        if code >= 0 {
            return Ok(());
        }
        match ReturnCode::try_from(code) {
            Ok(rc) => Err(ScriptError::AngelScript(rc)),
            Err(_) => Err(ScriptError::Unknown(code)),
        }
    }

    /// The code this error maps to on the C surface.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            ScriptError::AngelScript(rc) => *rc,
            ScriptError::NullPointer => ReturnCode::InvalidArg,
            ScriptError::Build(_) => ReturnCode::Error,
            ScriptError::Parse(_) => ReturnCode::InvalidDeclaration,
            ScriptError::StringConversion(_) | ScriptError::Utf8Conversion(_) => {
                ReturnCode::InvalidArg
            }
            ScriptError::Generic(_) | ScriptError::Unknown(_) => ReturnCode::Error,
        }
    }

    /// Raw `i32` form of [`ScriptError::return_code`].
    #[inline]
    pub fn code(&self) -> i32 {
        self.return_code().code()
    }
}

impl From<ReturnCode> for ScriptError {
    fn from(rc: ReturnCode) -> Self {
        ScriptError::AngelScript(rc)
    }
}

/// Errors produced while turning characters into tokens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' at {span}")]
    UnexpectedChar { ch: char, span: Span },

    #[error("unterminated string literal at {span}")]
    UnterminatedString { span: Span },

    #[error("unterminated comment at {span}")]
    UnterminatedComment { span: Span },

    #[error("invalid number at {span}: {detail}")]
    InvalidNumber { span: Span, detail: String },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::UnterminatedComment { span }
            | LexError::InvalidNumber { span, .. } => *span,
        }
    }
}

/// Category of a [`ParseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    ExpectedToken,
    UnexpectedToken,
    UnexpectedEof,
    ExpectedExpression,
    ExpectedType,
    ExpectedStatement,
    ExpectedDeclaration,
    ExpectedIdentifier,
    InvalidLiteral,
    InvalidSyntax,
    NotSupported,
    Lexer,
}

impl ParseErrorKind {
    fn description(self) -> &'static str {
        match self {
            ParseErrorKind::ExpectedToken => "expected token",
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::UnexpectedEof => "unexpected end of input",
            ParseErrorKind::ExpectedExpression => "expected expression",
            ParseErrorKind::ExpectedType => "expected type",
            ParseErrorKind::ExpectedStatement => "expected statement",
            ParseErrorKind::ExpectedDeclaration => "expected declaration",
            ParseErrorKind::ExpectedIdentifier => "expected identifier",
            ParseErrorKind::InvalidLiteral => "invalid literal",
            ParseErrorKind::InvalidSyntax => "invalid syntax",
            ParseErrorKind::NotSupported => "unsupported construct",
            ParseErrorKind::Lexer => "lexical error",
        }
    }
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// A syntax error with its location.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {span}: {message}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
        }
    }

    pub fn expected_token(span: Span, expected: &str, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedToken,
            span,
            format!("expected {expected}, found {found}"),
        )
    }

    pub fn unexpected_eof(span: Span) -> Self {
        Self::new(ParseErrorKind::UnexpectedEof, span, "unexpected end of file")
    }

    pub fn expected_expression(span: Span, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedExpression,
            span,
            format!("expected expression, found {found}"),
        )
    }

    pub fn expected_identifier(span: Span, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedIdentifier,
            span,
            format!("expected identifier, found {found}"),
        )
    }

    pub fn expected_type(span: Span, found: &str) -> Self {
        Self::new(
            ParseErrorKind::ExpectedType,
            span,
            format!("expected type, found {found}"),
        )
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::new(ParseErrorKind::Lexer, err.span(), err.to_string())
    }
}

/// Every syntax error found in one parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseErrors {
    errors: Vec<ParseError>,
}

impl ParseErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<ParseError> {
        self.errors
    }
}

impl From<ParseError> for ParseErrors {
    fn from(error: ParseError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl IntoIterator for ParseErrors {
    type Item = ParseError;
    type IntoIter = std::vec::IntoIter<ParseError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

/// Diagnostics produced while compiling a module.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    #[error("{message}")]
    Syntax { message: String, span: Span },

    #[error("Identifier '{name}' is not a data type")]
    UnknownType { name: String, span: Span },

    #[error("No matching symbol '{name}'")]
    UnknownFunction { name: String, span: Span },

    #[error("'{name}' is not declared")]
    UnknownVariable { name: String, span: Span },

    #[error("Name conflict. '{name}' is already declared")]
    DuplicateDefinition { name: String, span: Span },

    #[error("{message}")]
    TypeMismatch { message: String, span: Span },

    #[error("{message}")]
    InvalidOperation { message: String, span: Span },

    #[error("{message}")]
    Other { message: String, span: Span },
}

impl CompilationError {
    pub fn span(&self) -> Span {
        match self {
            CompilationError::Syntax { span, .. }
            | CompilationError::UnknownType { span, .. }
            | CompilationError::UnknownFunction { span, .. }
            | CompilationError::UnknownVariable { span, .. }
            | CompilationError::DuplicateDefinition { span, .. }
            | CompilationError::TypeMismatch { span, .. }
            | CompilationError::InvalidOperation { span, .. }
            | CompilationError::Other { span, .. } => *span,
        }
    }

    pub fn mismatch(span: Span, message: impl Into<String>) -> Self {
        CompilationError::TypeMismatch {
            message: message.into(),
            span,
        }
    }

    pub fn invalid(span: Span, message: impl Into<String>) -> Self {
        CompilationError::InvalidOperation {
            message: message.into(),
            span,
        }
    }

    pub fn other(span: Span, message: impl Into<String>) -> Self {
        CompilationError::Other {
            message: message.into(),
            span,
        }
    }
}

impl From<ParseError> for CompilationError {
    fn from(err: ParseError) -> Self {
        CompilationError::Syntax {
            message: err.message,
            span: err.span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_code_maps_known_and_unknown() {
        assert!(ScriptError::from_code(0).is_ok());
        assert!(ScriptError::from_code(3).is_ok());
        assert!(matches!(
            ScriptError::from_code(-2),
            Err(ScriptError::AngelScript(ReturnCode::ContextActive))
        ));
        assert!(matches!(
            ScriptError::from_code(-1234),
            Err(ScriptError::Unknown(-1234))
        ));
    }

    #[test]
    fn return_code_of_wrapped_errors() {
        assert_eq!(ScriptError::NullPointer.code(), -5);
        assert_eq!(ScriptError::Build(Vec::new()).return_code(), ReturnCode::Error);
        assert_eq!(ScriptError::from(ReturnCode::NameTaken).code(), -9);
    }

    #[test]
    fn lex_errors_become_parse_errors() {
        let err: ParseError = LexError::UnterminatedString {
            span: Span::new(2, 3, 1),
        }
        .into();
        assert_eq!(err.kind, ParseErrorKind::Lexer);
        assert_eq!(err.span.line, 2);
    }

    #[test]
    fn compilation_error_keeps_span() {
        let err = CompilationError::UnknownType {
            name: "Foo".into(),
            span: Span::new(7, 9, 3),
        };
        assert_eq!(err.span(), Span::new(7, 9, 3));
        assert_eq!(err.to_string(), "Identifier 'Foo' is not a data type");
    }
}
