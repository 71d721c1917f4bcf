use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Shared value stored in a [`UserDataStore`].
pub type UserDataValue = Arc<dyn Any + Send + Sync>;

/// A type that can be attached to an engine, module, context, function,
/// type or object.
///
/// `KEY` selects the slot; two types with the same key overwrite each other.
///
/// ```
/// use angelscript_runtime::prelude::*;
///
/// struct Budget(u32);
/// impl UserData for Budget {
///     const KEY: usize = 0x4255_4447;
/// }
///
/// let engine = Engine::create();
/// engine.set_user_data(Budget(10));
/// assert_eq!(engine.get_user_data::<Budget>().map(|b| b.0), Some(10));
/// ```
pub trait UserData: Any + Send + Sync {
    const KEY: usize;
}

/// Keyed user data slots carried by every handle type.
#[derive(Default)]
pub struct UserDataStore {
    entries: Mutex<FxHashMap<usize, UserDataValue>>,
}

impl UserDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `T::KEY`, returning what was there before.
    pub fn set<T: UserData>(&self, data: T) -> Option<UserDataValue> {
        self.set_raw(T::KEY, Arc::new(data))
    }

    pub fn get<T: UserData>(&self) -> Option<Arc<T>> {
        self.get_raw(T::KEY)?.downcast::<T>().ok()
    }

    pub fn remove<T: UserData>(&self) -> Option<UserDataValue> {
        self.entries.lock().remove(&T::KEY)
    }

    pub(crate) fn set_raw(&self, key: usize, data: UserDataValue) -> Option<UserDataValue> {
        self.entries.lock().insert(key, data)
    }

    pub(crate) fn get_raw(&self, key: usize) -> Option<UserDataValue> {
        self.entries.lock().get(&key).cloned()
    }

    pub(crate) fn remove_raw(&self, key: usize) -> Option<UserDataValue> {
        self.entries.lock().remove(&key)
    }

    pub fn clear(&self) {
        // drop outside the lock; a value's Drop may touch the same store
        let entries = std::mem::take(&mut *self.entries.lock());
        drop(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u32);
    impl UserData for Counter {
        const KEY: usize = 1;
    }

    struct Label(&'static str);
    impl UserData for Label {
        const KEY: usize = 1;
    }

    #[test]
    fn set_returns_previous() {
        let store = UserDataStore::new();
        assert!(store.set(Counter(1)).is_none());
        assert!(store.set(Counter(2)).is_some());
        assert_eq!(store.get::<Counter>().map(|c| c.0), Some(2));
    }

    #[test]
    fn same_key_different_type_does_not_downcast() {
        let store = UserDataStore::new();
        store.set(Label("x"));
        assert!(store.get::<Counter>().is_none());
        assert_eq!(store.get::<Label>().map(|l| l.0), Some("x"));
        store.remove::<Label>();
        assert!(store.get::<Label>().is_none());
    }
}
