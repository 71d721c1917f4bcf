//! Container format used by `Module::save_byte_code` and
//! `Module::load_byte_code`.
//!
//! Compiled code refers to live engine objects, so what gets saved is the
//! module's script sections. Loading builds them again.
//!
//! Layout, little endian:
//!
//! ```text
//! magic    b"ASRB"
//! version  u32
//! flags    u32            bit 0: debug info stripped
//! count    u32
//! count x  name: u32 len + bytes, code: u32 len + bytes, line_offset: i32
//! ```

use angelscript_core::{ReturnCode, ScriptError, ScriptResult};

const MAGIC: &[u8; 4] = b"ASRB";
const FORMAT_VERSION: u32 = 1;
const FLAG_STRIPPED: u32 = 1;

/// Destination or source of saved byte code.
pub trait BinaryStream {
    fn write(&mut self, data: &[u8]) -> ScriptResult<()>;

    /// Fill `out` completely or fail.
    fn read(&mut self, out: &mut [u8]) -> ScriptResult<()>;
}

/// In-memory [`BinaryStream`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStream {
    buffer: Vec<u8>,
    position: usize,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { buffer: bytes, position: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Start reading from the beginning again.
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl BinaryStream for MemoryStream {
    fn write(&mut self, data: &[u8]) -> ScriptResult<()> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, out: &mut [u8]) -> ScriptResult<()> {
        let end = self.position + out.len();
        let data = self.buffer.get(self.position..end).ok_or(ReturnCode::Error)?;
        out.copy_from_slice(data);
        self.position = end;
        Ok(())
    }
}

/// One saved script section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SavedSection {
    pub(crate) name: String,
    pub(crate) code: String,
    pub(crate) line_offset: i32,
}

pub(crate) fn write_module(
    stream: &mut dyn BinaryStream,
    sections: &[SavedSection],
    strip_debug_info: bool,
) -> ScriptResult<()> {
    stream.write(MAGIC)?;
    stream.write(&FORMAT_VERSION.to_le_bytes())?;
    let flags = if strip_debug_info { FLAG_STRIPPED } else { 0 };
    stream.write(&flags.to_le_bytes())?;
    stream.write(&(sections.len() as u32).to_le_bytes())?;
    for section in sections {
        write_str(stream, &section.name)?;
        write_str(stream, &section.code)?;
        stream.write(&section.line_offset.to_le_bytes())?;
    }
    Ok(())
}

/// Sections and the debug-info-stripped flag.
pub(crate) fn read_module(stream: &mut dyn BinaryStream) -> ScriptResult<(Vec<SavedSection>, bool)> {
    let mut magic = [0u8; 4];
    stream.read(&mut magic)?;
    if &magic != MAGIC {
        return Err(ScriptError::Generic("not a saved module".into()));
    }
    let version = read_u32(stream)?;
    if version != FORMAT_VERSION {
        return Err(ScriptError::Generic(format!("unsupported byte code version {version}")));
    }
    let flags = read_u32(stream)?;
    let count = read_u32(stream)?;
    let mut sections = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let name = read_str(stream)?;
        let code = read_str(stream)?;
        let line_offset = read_u32(stream)? as i32;
        sections.push(SavedSection { name, code, line_offset });
    }
    Ok((sections, flags & FLAG_STRIPPED != 0))
}

fn write_str(stream: &mut dyn BinaryStream, text: &str) -> ScriptResult<()> {
    stream.write(&(text.len() as u32).to_le_bytes())?;
    stream.write(text.as_bytes())
}

fn read_u32(stream: &mut dyn BinaryStream) -> ScriptResult<u32> {
    let mut bytes = [0u8; 4];
    stream.read(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_str(stream: &mut dyn BinaryStream) -> ScriptResult<String> {
    let len = read_u32(stream)? as usize;
    let mut bytes = vec![0u8; len];
    stream.read(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| ScriptError::Utf8Conversion(e.utf8_error()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_survive_a_round_trip() {
        let sections = vec![
            SavedSection { name: "a".into(), code: "int f() { return 1; }".into(), line_offset: 0 },
            SavedSection { name: "b".into(), code: "// ünïcode".into(), line_offset: 10 },
        ];
        let mut stream = MemoryStream::new();
        write_module(&mut stream, &sections, true).unwrap();
        stream.rewind();
        let (loaded, stripped) = read_module(&mut stream).unwrap();
        assert_eq!(loaded, sections);
        assert!(stripped);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut stream = MemoryStream::new();
        write_module(&mut stream, &[], false).unwrap();
        let mut bytes = stream.into_bytes();
        bytes.truncate(6);
        assert!(read_module(&mut MemoryStream::from_bytes(bytes)).is_err());
        assert!(read_module(&mut MemoryStream::from_bytes(b"XXXX\x01\0\0\0".to_vec())).is_err());
    }
}
