//! Host callback signatures and the message record passed to the message
//! callback.

use std::fmt;
use std::sync::Arc;

use angelscript_core::MessageType;

use crate::core::context::Context;
use crate::core::engine::Engine;
use crate::core::script_generic::ScriptGeneric;
use crate::core::script_object::ScriptObject;
use crate::core::typeinfo::TypeInfo;

/// A compiler or host diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageInfo {
    /// Script section the message refers to. Empty for engine messages.
    pub section: String,
    /// 1-based line, 0 when not applicable.
    pub row: i32,
    /// 1-based column, 0 when not applicable.
    pub col: i32,
    pub msg_type: MessageType,
    pub message: String,
}

impl MessageInfo {
    pub fn new(
        section: impl Into<String>,
        row: i32,
        col: i32,
        msg_type: MessageType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            row,
            col,
            msg_type,
            message: message.into(),
        }
    }
}

impl fmt::Display for MessageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.msg_type {
            MessageType::Error => "ERR",
            MessageType::Warning => "WARN",
            MessageType::Information => "INFO",
        };
        write!(
            f,
            "{} ({}, {}) : {} : {}",
            self.section, self.row, self.col, kind, self.message
        )
    }
}

pub type MessageCallbackFn = Arc<dyn Fn(&MessageInfo) + Send + Sync>;

/// Called at every statement while the callback is installed.
pub type LineCallbackFn = Arc<dyn Fn(&Context) + Send + Sync>;

/// Called when an exception is raised, before the stack unwinds.
pub type ExceptionCallbackFn = Arc<dyn Fn(&Context) + Send + Sync>;

/// Called for each object the collector found in an unreachable cycle.
pub type CircularRefCallbackFn = Arc<dyn Fn(&TypeInfo, &ScriptObject) + Send + Sync>;

pub type RequestContextCallbackFn = Arc<dyn Fn(&Engine) -> Option<Context> + Send + Sync>;

pub type ReturnContextCallbackFn = Arc<dyn Fn(&Engine, Context) + Send + Sync>;

/// A registered function using the generic calling convention.
pub type GenericFn = Arc<dyn Fn(&mut ScriptGeneric) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_display() {
        let info = MessageInfo::new("main", 3, 7, MessageType::Error, "No matching symbol 'x'");
        assert_eq!(info.to_string(), "main (3, 7) : ERR : No matching symbol 'x'");
    }
}
