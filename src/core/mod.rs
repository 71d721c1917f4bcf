//! Public handle types. Each is a cheap clone over shared state; the last
//! clone to drop releases the object.

pub mod context;
pub mod engine;
pub mod function;
pub mod lockable_shared_bool;
pub mod module;
pub mod script_generic;
pub mod script_object;
pub mod string_factory;
pub mod typeinfo;
