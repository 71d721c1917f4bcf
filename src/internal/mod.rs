pub(crate) mod callback_manager;
pub(crate) mod gc;
pub(crate) mod registry;
pub(crate) mod thread_manager;
