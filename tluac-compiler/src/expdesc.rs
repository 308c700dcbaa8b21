use tluac_bytecode::Number;
use tluac_lexer::Position;

/// The head of a chain of pending jumps. Each jump in the chain links to the
/// next through the function's jump link table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct JumpList(pub(crate) Option<usize>);

impl JumpList {
    pub(crate) const EMPTY: JumpList = JumpList(None);

    pub(crate) fn single(pc: usize) -> Self {
        Self(Some(pc))
    }

    pub(crate) fn is_empty(self) -> bool {
        self.0.is_none()
    }
}

/// Where the table of an indexed expression lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableKind {
    Local,
    Upvalue,
}

/// How far an expression has been evaluated, and where its value is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ExpKind {
    /// No value, e.g. an empty expression list.
    Void,
    Nil,
    True,
    False,
    /// Constant pool entry.
    K(u32),
    /// A numeric literal not yet in the pool, kept for folding.
    Number(Number),
    /// A local variable in this register.
    Local(u32),
    /// An upvalue by index.
    Upvalue(u32),
    /// `table[key]`, with `key` an RK operand.
    Indexed {
        table: u32,
        key: u32,
        table_kind: TableKind,
    },
    /// A comparison whose result is a jump at this pc.
    Jump(usize),
    /// The instruction at this pc can still have its target register set.
    Relocable(usize),
    /// The value is in a fixed register.
    NonReloc(u32),
    /// A call instruction at this pc.
    Call(usize),
    /// A vararg instruction at this pc.
    VarArg(usize),
}

impl ExpKind {
    pub(crate) fn has_multi_ret(self) -> bool {
        matches!(self, ExpKind::Call(_) | ExpKind::VarArg(_))
    }

    /// Whether the expression can be assigned to.
    pub(crate) fn is_var(self) -> bool {
        matches!(
            self,
            ExpKind::Local(_) | ExpKind::Upvalue(_) | ExpKind::Indexed { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ExpDesc {
    pub(crate) kind: ExpKind,
    /// Jumps taken when the expression is true.
    pub(crate) t: JumpList,
    /// Jumps taken when the expression is false.
    pub(crate) f: JumpList,
    /// Where instructions discharging this expression are attributed.
    pub(crate) position: Position,
}

impl ExpDesc {
    pub(crate) fn new(kind: ExpKind, position: Position) -> Self {
        Self {
            kind,
            t: JumpList::EMPTY,
            f: JumpList::EMPTY,
            position,
        }
    }

    pub(crate) fn void() -> Self {
        Self::new(ExpKind::Void, Position::START)
    }

    pub(crate) fn has_jumps(&self) -> bool {
        self.t != self.f
    }

    /// A plain numeric literal with no pending jumps.
    pub(crate) fn as_numeral(&self) -> Option<Number> {
        match self.kind {
            ExpKind::Number(n) if self.t.is_empty() && self.f.is_empty() => Some(n),
            _ => None,
        }
    }
}
