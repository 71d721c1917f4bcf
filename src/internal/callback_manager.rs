use parking_lot::RwLock;

use angelscript_core::MessageType;

use crate::types::callbacks::{
    CircularRefCallbackFn, MessageCallbackFn, MessageInfo, RequestContextCallbackFn,
    ReturnContextCallbackFn,
};

/// Host callbacks installed on one engine.
///
/// Every getter clones the callback out of its lock, so a callback is always
/// invoked with no lock held and may install or clear callbacks itself.
#[derive(Default)]
pub(crate) struct CallbackManager {
    message_callback: RwLock<Option<MessageCallbackFn>>,
    circular_ref_callback: RwLock<Option<CircularRefCallbackFn>>,
    context_callbacks: RwLock<Option<(RequestContextCallbackFn, ReturnContextCallbackFn)>>,
}

impl CallbackManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_message_callback(&self, callback: Option<MessageCallbackFn>) {
        *self.message_callback.write() = callback;
    }

    /// Deliver a diagnostic to the host callback and mirror it to `tracing`.
    pub(crate) fn send_message(&self, info: &MessageInfo) {
        match info.msg_type {
            MessageType::Error => tracing::error!(section = %info.section, row = info.row, col = info.col, "{}", info.message),
            MessageType::Warning => tracing::warn!(section = %info.section, row = info.row, col = info.col, "{}", info.message),
            MessageType::Information => tracing::info!(section = %info.section, row = info.row, col = info.col, "{}", info.message),
        }
        let callback = self.message_callback.read().clone();
        if let Some(callback) = callback {
            callback(info);
        }
    }

    pub(crate) fn set_circular_ref_callback(&self, callback: Option<CircularRefCallbackFn>) {
        *self.circular_ref_callback.write() = callback;
    }

    pub(crate) fn circular_ref_callback(&self) -> Option<CircularRefCallbackFn> {
        self.circular_ref_callback.read().clone()
    }

    pub(crate) fn set_context_callbacks(
        &self,
        callbacks: Option<(RequestContextCallbackFn, ReturnContextCallbackFn)>,
    ) {
        *self.context_callbacks.write() = callbacks;
    }

    pub(crate) fn context_callbacks(&self) -> Option<(RequestContextCallbackFn, ReturnContextCallbackFn)> {
        self.context_callbacks.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn messages_reach_the_installed_callback() {
        let manager = CallbackManager::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.set_message_callback(Some(Arc::new(move |info: &MessageInfo| {
            sink.lock().push(info.message.clone());
        })));
        manager.send_message(&MessageInfo::new("s", 1, 1, MessageType::Warning, "careful"));
        manager.set_message_callback(None);
        manager.send_message(&MessageInfo::new("s", 1, 1, MessageType::Error, "dropped"));
        assert_eq!(*seen.lock(), vec!["careful".to_string()]);
    }

    #[test]
    fn callback_may_replace_itself() {
        let manager = Arc::new(CallbackManager::new());
        let inner = manager.clone();
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        manager.set_message_callback(Some(Arc::new(move |_: &MessageInfo| {
            *counter.lock() += 1;
            inner.set_message_callback(None);
        })));
        manager.send_message(&MessageInfo::new("", 0, 0, MessageType::Information, "x"));
        manager.send_message(&MessageInfo::new("", 0, 0, MessageType::Information, "y"));
        assert_eq!(*calls.lock(), 1);
    }
}
