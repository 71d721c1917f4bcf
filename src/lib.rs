//! An embeddable AngelScript-style scripting runtime.
//!
//! The host creates an [`Engine`](crate::core::engine::Engine), registers its types
//! and functions, builds script [`Module`](crate::core::module::Module)s and runs
//! their functions through a [`Context`](crate::core::context::Context). Every
//! handle is reference counted and can be shared across threads.
//!
//! ```
//! use angelscript_runtime::prelude::*;
//!
//! let engine = Engine::create();
//! let module = engine.get_module("main", GetModuleFlags::AlwaysCreate).unwrap();
//! module.add_script_section("main", "int add(int a, int b) { return a + b; }", 0).unwrap();
//! module.build().unwrap();
//!
//! let ctx = engine.create_context().unwrap();
//! ctx.prepare(&module.get_function_by_name("add").unwrap()).unwrap();
//! ctx.set_arg_dword(0, 2).unwrap();
//! ctx.set_arg_dword(1, 3).unwrap();
//! assert_eq!(ctx.execute().unwrap(), ContextState::Finished);
//! assert_eq!(ctx.get_return_dword(), 5);
//! ```
//!
//! The same surface is exported to C under the `as*` names from [`ffi`].

pub mod compiler;
pub mod core;
pub mod ffi;
mod internal;
pub mod types;
mod vm;

pub use angelscript_core::{ANGELSCRIPT_VERSION, ANGELSCRIPT_VERSION_STRING};

use crate::core::context::Context;

/// The context currently executing on this thread, if any. Inside nested
/// execution this is the innermost context.
pub fn get_active_context() -> Option<Context> {
    internal::thread_manager::active_context()
}

pub mod prelude {
    pub use crate::compiler::bytecode_io::{BinaryStream, MemoryStream};
    pub use crate::core::context::*;
    pub use crate::core::engine::*;
    pub use crate::core::function::*;
    pub use crate::core::lockable_shared_bool::*;
    pub use crate::core::module::*;
    pub use crate::core::script_generic::*;
    pub use crate::core::script_object::*;
    pub use crate::core::string_factory::*;
    pub use crate::core::typeinfo::*;
    pub use crate::get_active_context;
    pub use crate::internal::gc::GcStatistics;
    pub use crate::types::*;
    pub use angelscript_core::{
        Behaviour, CompileFlags, ContextState, EngineProperty, FunctionType, GCFlags, GetModuleFlags, MessageType,
        ObjectTypeFlags, PrimitiveKind, ReturnCode, ScriptError, ScriptResult, TypeModifiers, type_id,
    };

    pub use parking_lot::Mutex;
    pub use std::sync::atomic::Ordering;
    pub use std::sync::Arc;
}
