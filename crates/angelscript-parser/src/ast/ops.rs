//! Operators and their binding powers.

use std::fmt;

use crate::lexer::TokenKind;

/// Infix operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Equal,
    NotEqual,
    Is,
    NotIs,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Shl,
    Shr,
    UShr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    /// `(left, right)` binding power. `**` is right-associative.
    pub fn binding_power(self) -> (u8, u8) {
        use BinaryOp::*;
        match self {
            Or | Xor => (5, 6),
            And => (7, 8),
            BitOr => (9, 10),
            BitXor => (11, 12),
            BitAnd => (13, 14),
            Equal | NotEqual | Is | NotIs => (15, 16),
            Less | LessEqual | Greater | GreaterEqual => (17, 18),
            Shl | Shr | UShr => (19, 20),
            Add | Sub => (21, 22),
            Mul | Div | Mod => (23, 24),
            Pow => (26, 25),
        }
    }

    pub fn from_token(kind: TokenKind) -> Option<Self> {
        use TokenKind as T;
        Some(match kind {
            T::PipePipe => BinaryOp::Or,
            T::CaretCaret => BinaryOp::Xor,
            T::AmpAmp => BinaryOp::And,
            T::Pipe => BinaryOp::BitOr,
            T::Caret => BinaryOp::BitXor,
            T::Amp => BinaryOp::BitAnd,
            T::EqualEqual => BinaryOp::Equal,
            T::BangEqual => BinaryOp::NotEqual,
            T::Is => BinaryOp::Is,
            T::NotIs => BinaryOp::NotIs,
            T::Less => BinaryOp::Less,
            T::LessEqual => BinaryOp::LessEqual,
            T::Greater => BinaryOp::Greater,
            T::GreaterEqual => BinaryOp::GreaterEqual,
            T::LessLess => BinaryOp::Shl,
            T::GreaterGreater => BinaryOp::Shr,
            T::GreaterGreaterGreater => BinaryOp::UShr,
            T::Plus => BinaryOp::Add,
            T::Minus => BinaryOp::Sub,
            T::Star => BinaryOp::Mul,
            T::Slash => BinaryOp::Div,
            T::Percent => BinaryOp::Mod,
            T::StarStar => BinaryOp::Pow,
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Equal | NotEqual | Is | NotIs | Less | LessEqual | Greater | GreaterEqual
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::Or | BinaryOp::Xor | BinaryOp::And)
    }

    pub fn is_bitwise(self) -> bool {
        use BinaryOp::*;
        matches!(self, BitOr | BitXor | BitAnd | Shl | Shr | UShr)
    }

    pub fn as_str(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Or => "||",
            Xor => "^^",
            And => "&&",
            BitOr => "|",
            BitXor => "^",
            BitAnd => "&",
            Equal => "==",
            NotEqual => "!=",
            Is => "is",
            NotIs => "!is",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Shl => "<<",
            Shr => ">>",
            UShr => ">>>",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Pow => "**",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    PreInc,
    PreDec,
    /// `@expr`
    HandleOf,
}

impl UnaryOp {
    pub const BINDING_POWER: u8 = 27;

    pub fn from_token(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::PlusPlus => UnaryOp::PreInc,
            TokenKind::MinusMinus => UnaryOp::PreDec,
            TokenKind::At => UnaryOp::HandleOf,
            _ => return None,
        })
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::PreInc => "++",
            UnaryOp::PreDec => "--",
            UnaryOp::HandleOf => "@",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOp {
    Inc,
    Dec,
}

impl PostfixOp {
    pub const BINDING_POWER: u8 = 29;

    pub fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::PlusPlus => Some(PostfixOp::Inc),
            TokenKind::MinusMinus => Some(PostfixOp::Dec),
            _ => None,
        }
    }
}

/// Assignment operators. Compound forms carry the arithmetic they apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

impl AssignOp {
    /// Right-associative, below the ternary.
    pub const BINDING_POWER: (u8, u8) = (2, 1);

    pub fn from_token(kind: TokenKind) -> Option<Self> {
        use TokenKind as T;
        let op = match kind {
            T::Equal => return Some(AssignOp::Assign),
            T::PlusEqual => BinaryOp::Add,
            T::MinusEqual => BinaryOp::Sub,
            T::StarEqual => BinaryOp::Mul,
            T::StarStarEqual => BinaryOp::Pow,
            T::SlashEqual => BinaryOp::Div,
            T::PercentEqual => BinaryOp::Mod,
            T::AmpEqual => BinaryOp::BitAnd,
            T::PipeEqual => BinaryOp::BitOr,
            T::CaretEqual => BinaryOp::BitXor,
            T::LessLessEqual => BinaryOp::Shl,
            T::GreaterGreaterEqual => BinaryOp::Shr,
            T::GreaterGreaterGreaterEqual => BinaryOp::UShr,
            _ => return None,
        };
        Some(AssignOp::Compound(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_ordering() {
        let (mul, _) = BinaryOp::Mul.binding_power();
        let (add, _) = BinaryOp::Add.binding_power();
        let (or, _) = BinaryOp::Or.binding_power();
        assert!(mul > add && add > or);
        let (l, r) = BinaryOp::Pow.binding_power();
        assert!(l > r);
    }

    #[test]
    fn compound_assignment_carries_operator() {
        assert_eq!(
            AssignOp::from_token(TokenKind::GreaterGreaterGreaterEqual),
            Some(AssignOp::Compound(BinaryOp::UShr))
        );
        assert_eq!(AssignOp::from_token(TokenKind::Equal), Some(AssignOp::Assign));
        assert_eq!(AssignOp::from_token(TokenKind::EqualEqual), None);
    }
}
