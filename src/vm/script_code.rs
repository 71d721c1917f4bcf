use std::ops::Range;

use crate::types::data_type::DataType;
use crate::vm::instruction::Instr;

/// A local variable slot. Parameters come first.
#[derive(Debug, Clone)]
pub(crate) struct LocalVar {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    /// Instructions during which the variable is declared.
    pub(crate) scope: Range<usize>,
    /// Compiler temporary, hidden from the debugging interface.
    pub(crate) is_temporary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LineEntry {
    pub(crate) pc: usize,
    pub(crate) line: i32,
    pub(crate) col: i32,
}

/// Compiled body of a script function.
#[derive(Debug)]
pub(crate) struct ScriptCode {
    pub(crate) instructions: Vec<Instr>,
    pub(crate) locals: Vec<LocalVar>,
    pub(crate) param_count: u32,
    /// Sorted by `pc`.
    pub(crate) lines: Vec<LineEntry>,
    pub(crate) section: Option<String>,
}

impl ScriptCode {
    /// Source position of the statement containing `pc`.
    pub(crate) fn line_at(&self, pc: usize) -> (i32, i32) {
        let index = self.lines.partition_point(|entry| entry.pc <= pc);
        match index.checked_sub(1).and_then(|i| self.lines.get(i)) {
            Some(entry) => (entry.line, entry.col),
            None => self.lines.first().map_or((0, 0), |e| (e.line, e.col)),
        }
    }

    /// Debug-visible locals, as `(slot, variable)`.
    pub(crate) fn visible_locals(&self) -> impl Iterator<Item = (usize, &LocalVar)> {
        self.locals.iter().enumerate().filter(|(_, v)| !v.is_temporary)
    }

    pub(crate) fn is_in_scope(&self, slot: usize, pc: usize) -> bool {
        self.locals.get(slot).is_some_and(|v| v.scope.contains(&pc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use angelscript_core::PrimitiveKind;

    fn code() -> ScriptCode {
        ScriptCode {
            instructions: vec![Instr::Line(3, 5), Instr::Pop, Instr::Line(4, 5), Instr::Return],
            locals: vec![
                LocalVar {
                    name: "a".into(),
                    data_type: DataType::primitive(PrimitiveKind::Int32),
                    scope: 0..4,
                    is_temporary: false,
                },
                LocalVar {
                    name: "$tmp0".into(),
                    data_type: DataType::primitive(PrimitiveKind::Int32),
                    scope: 1..2,
                    is_temporary: true,
                },
            ],
            param_count: 1,
            lines: vec![
                LineEntry { pc: 0, line: 3, col: 5 },
                LineEntry { pc: 2, line: 4, col: 5 },
            ],
            section: Some("main".into()),
        }
    }

    #[test]
    fn line_lookup_uses_last_entry_before_pc() {
        let code = code();
        assert_eq!(code.line_at(1), (3, 5));
        assert_eq!(code.line_at(3), (4, 5));
    }

    #[test]
    fn temporaries_are_hidden() {
        let code = code();
        assert_eq!(code.visible_locals().count(), 1);
        assert!(code.is_in_scope(1, 1));
        assert!(!code.is_in_scope(1, 2));
    }
}
