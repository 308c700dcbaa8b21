use tluac_bytecode::OpCode;
use tluac_lexer::Token;

/// Priority of every unary operator. Binds tighter than everything but `^`.
pub(crate) const UNARY_PRIORITY: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOpr {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Ne,
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOpr {
    pub(crate) fn from_token(token: Token) -> Option<Self> {
        Some(match token {
            Token::Plus => BinOpr::Add,
            Token::Minus => BinOpr::Sub,
            Token::Star => BinOpr::Mul,
            Token::Slash => BinOpr::Div,
            Token::Percent => BinOpr::Mod,
            Token::Caret => BinOpr::Pow,
            Token::Concat => BinOpr::Concat,
            Token::Ne => BinOpr::Ne,
            Token::Eq => BinOpr::Eq,
            Token::Lt => BinOpr::Lt,
            Token::Le => BinOpr::Le,
            Token::Gt => BinOpr::Gt,
            Token::Ge => BinOpr::Ge,
            Token::And => BinOpr::And,
            Token::Or => BinOpr::Or,
            _ => return None,
        })
    }

    /// Left priority of the operator, compared against the current limit.
    pub(crate) fn left_priority(self) -> u8 {
        self.priorities().0
    }

    /// Right priority, used as the limit when parsing the right operand.
    pub(crate) fn right_priority(self) -> u8 {
        self.priorities().1
    }

    fn priorities(self) -> (u8, u8) {
        match self {
            BinOpr::Add | BinOpr::Sub => (6, 6),
            BinOpr::Mul | BinOpr::Div | BinOpr::Mod => (7, 7),
            // Right associative.
            BinOpr::Pow => (10, 9),
            BinOpr::Concat => (5, 4),
            BinOpr::Ne | BinOpr::Eq | BinOpr::Lt | BinOpr::Le | BinOpr::Gt | BinOpr::Ge => (3, 3),
            BinOpr::And => (2, 2),
            BinOpr::Or => (1, 1),
        }
    }

    /// The arithmetic instruction for this operator, if it is one.
    pub(crate) fn arith_op(self) -> Option<OpCode> {
        Some(match self {
            BinOpr::Add => OpCode::Add,
            BinOpr::Sub => OpCode::Sub,
            BinOpr::Mul => OpCode::Mul,
            BinOpr::Div => OpCode::Div,
            BinOpr::Mod => OpCode::Mod,
            BinOpr::Pow => OpCode::Pow,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnOpr {
    Minus,
    Not,
    Len,
}

impl UnOpr {
    pub(crate) fn from_token(token: Token) -> Option<Self> {
        match token {
            Token::Minus => Some(UnOpr::Minus),
            Token::Not => Some(UnOpr::Not),
            Token::Hash => Some(UnOpr::Len),
            _ => None,
        }
    }
}
