//! Flat C surface, one module per handle family.
//!
//! Every function takes the handle it operates on as its first argument.
//! A null handle, a null required string or an out-of-range index yields the
//! family's neutral result and has no other effect:
//!
//! | return type            | neutral result          |
//! |------------------------|-------------------------|
//! | `int` status / id      | `asINVALID_ARG` (-5)    |
//! | pointer                | null                    |
//! | count, `asUINT`        | 0                       |
//! | `asBOOL`               | `asFALSE`               |
//! | context state          | `asEXECUTION_ERROR` (7) |
//! | `void`                 | nothing happens         |
//!
//! Handles returned by lookups are borrowed: their owner keeps them alive
//! and the caller must not release them. Handles returned by
//! `asCreateScriptEngine`, `asEngine_CreateContext`,
//! `asEngine_RequestContext`, `asEngine_CreateScriptObject*`,
//! `asEngine_CreateDelegate`, `asEngine_RefCastObject` and the out parameter
//! of `asModule_CompileFunction` carry a reference the caller releases.
//!
//! Returned strings stay valid until several more strings have been
//! returned on the same thread.
//!
//! Host functions are registered with the generic calling convention only.

/// Unwrap an `Option`, returning `$neutral` from the enclosing function on
/// `None`.
macro_rules! or_return {
    ($value:expr, $neutral:expr) => {
        match $value {
            Some(value) => value,
            None => return $neutral,
        }
    };
}

pub mod context;
pub mod engine;
pub mod function;
pub mod generic;
pub mod module;
pub mod script_object;
pub mod string_factory;
pub mod typeinfo;
pub mod types;

pub use types::*;
