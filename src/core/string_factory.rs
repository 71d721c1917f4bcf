//! Provider of the string constants used by compiled scripts.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use angelscript_core::{ReturnCode, ScriptResult};

use crate::types::script_value::ScriptString;

/// Turns literal bytes in a script into string values.
///
/// The engine asks the factory once per distinct literal when a module is
/// built, and hands every constant back through
/// [`release_string_constant`](StringFactory::release_string_constant) when
/// the module is discarded.
pub trait StringFactory: Send + Sync {
    /// Value for a literal, or `None` when the bytes are not acceptable.
    fn get_string_constant(&self, data: &[u8]) -> Option<ScriptString>;

    /// Give back a constant obtained from this factory.
    fn release_string_constant(&self, value: &ScriptString) -> ScriptResult<()>;

    /// Raw bytes of a string produced by this factory.
    fn get_raw_string_data(&self, value: &ScriptString) -> Vec<u8>;
}

/// Interning factory: identical literals share one buffer, kept alive while
/// any module still holds the constant.
#[derive(Default)]
pub struct DefaultStringFactory {
    cache: Mutex<FxHashMap<ScriptString, usize>>,
}

impl DefaultStringFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct constants currently handed out.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StringFactory for DefaultStringFactory {
    fn get_string_constant(&self, data: &[u8]) -> Option<ScriptString> {
        let text = String::from_utf8_lossy(data);
        let mut cache = self.cache.lock();
        if let Some((existing, count)) = cache.get_key_value(text.as_ref()).map(|(k, v)| (k.clone(), *v)) {
            cache.insert(existing.clone(), count + 1);
            return Some(existing);
        }
        let value = ScriptString::new(text.into_owned());
        cache.insert(value.clone(), 1);
        Some(value)
    }

    fn release_string_constant(&self, value: &ScriptString) -> ScriptResult<()> {
        let mut cache = self.cache.lock();
        match cache.get_mut(value) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(())
            }
            Some(_) => {
                cache.remove(value);
                Ok(())
            }
            None => Err(ReturnCode::InvalidArg.into()),
        }
    }

    fn get_raw_string_data(&self, value: &ScriptString) -> Vec<u8> {
        value.as_str().as_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_literals_are_interned() {
        let factory = DefaultStringFactory::new();
        let a = factory.get_string_constant(b"hello").unwrap();
        let b = factory.get_string_constant(b"hello").unwrap();
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn release_drops_last_reference() {
        let factory = DefaultStringFactory::new();
        let a = factory.get_string_constant(b"x").unwrap();
        factory.get_string_constant(b"x").unwrap();
        factory.release_string_constant(&a).unwrap();
        assert_eq!(factory.len(), 1);
        factory.release_string_constant(&a).unwrap();
        assert!(factory.is_empty());
        assert!(factory.release_string_constant(&a).is_err());
    }

    #[test]
    fn raw_data_is_utf8_bytes() {
        let factory = DefaultStringFactory::new();
        let s = factory.get_string_constant("é".as_bytes()).unwrap();
        assert_eq!(factory.get_raw_string_data(&s), vec![0xC3, 0xA9]);
    }
}
