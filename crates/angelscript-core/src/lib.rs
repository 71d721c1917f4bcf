//! Shared vocabulary for the AngelScript runtime.
//!
//! This crate holds everything that both the parser and the runtime need to
//! agree on, and everything that crosses the C boundary as a plain integer:
//!
//! - [`ReturnCode`], [`ContextState`], [`EngineProperty`] and the other
//!   boundary enums, with lossless conversion to and from their raw values
//! - the type-id encoding ([`type_id`]) and [`PrimitiveKind`]
//! - [`Span`] for source locations
//! - the error types: [`ScriptError`] for runtime/host failures and the
//!   parse/compile diagnostics produced by the front end

pub mod enums;
pub mod error;
pub mod span;
pub mod type_id;

pub use enums::*;
pub use error::{
    CompilationError, LexError, ParseError, ParseErrorKind, ParseErrors, ScriptError,
    ScriptResult,
};
pub use span::Span;
pub use type_id::{PrimitiveKind, TypeIdFlags};

/// Version number reported through `asGetLibraryVersion`-style queries.
pub const ANGELSCRIPT_VERSION: u32 = 23700;

/// Human readable library version.
pub const ANGELSCRIPT_VERSION_STRING: &str = "2.37.0";

/// Boolean as it crosses the C boundary.
pub type AsBool = u32;

/// `asTRUE`
pub const AS_TRUE: AsBool = 1;

/// `asFALSE`
pub const AS_FALSE: AsBool = 0;

/// Convert a Rust bool to its boundary representation.
#[inline]
pub fn as_bool(value: bool) -> AsBool {
    if value { AS_TRUE } else { AS_FALSE }
}

/// Convert a boundary bool to a Rust bool. Any non-zero value is true.
#[inline]
pub fn from_as_bool(value: AsBool) -> bool {
    value != 0
}
