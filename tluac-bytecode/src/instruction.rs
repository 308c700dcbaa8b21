use bytemuck::{
    Pod,
    Zeroable,
};
use derive_more::{
    From,
    Into,
};

use crate::{
    opcodes::{
        OpCode,
        OpMode,
    },
    BytecodeError,
};

pub const SIZE_OP: u32 = 6;
pub const SIZE_A: u32 = 8;
pub const SIZE_B: u32 = 9;
pub const SIZE_C: u32 = 9;
pub const SIZE_BX: u32 = SIZE_C + SIZE_B;
pub const SIZE_AX: u32 = SIZE_C + SIZE_B + SIZE_A;

pub const POS_OP: u32 = 0;
pub const POS_A: u32 = POS_OP + SIZE_OP;
pub const POS_C: u32 = POS_A + SIZE_A;
pub const POS_B: u32 = POS_C + SIZE_C;
pub const POS_BX: u32 = POS_C;
pub const POS_AX: u32 = POS_A;

pub const MAXARG_A: u32 = (1 << SIZE_A) - 1;
pub const MAXARG_B: u32 = (1 << SIZE_B) - 1;
pub const MAXARG_C: u32 = (1 << SIZE_C) - 1;
pub const MAXARG_BX: u32 = (1 << SIZE_BX) - 1;
pub const MAXARG_SBX: i32 = (MAXARG_BX >> 1) as i32;
pub const MAXARG_AX: u32 = (1 << SIZE_AX) - 1;

/// Set in an RK operand to mark it as a constant index rather than a register.
pub const BITRK: u32 = 1 << (SIZE_B - 1);
/// The largest constant index that fits in an RK operand.
pub const MAXINDEXRK: u32 = BITRK - 1;
/// "No register" marker for the `A` field.
pub const NO_REG: u32 = MAXARG_A;

/// Number of list items accumulated before a `SETLIST` flush.
pub const LFIELDS_PER_FLUSH: u32 = 50;

pub const fn is_k(rk: u32) -> bool {
    rk & BITRK != 0
}

pub const fn index_k(rk: u32) -> u32 {
    rk & !BITRK
}

pub const fn rk_as_k(index: u32) -> u32 {
    index | BITRK
}

const fn mask1(n: u32, p: u32) -> u32 {
    (!((!0u32) << n)) << p
}

const fn mask0(n: u32, p: u32) -> u32 {
    !mask1(n, p)
}

/// A single encoded instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable, From, Into)]
#[repr(transparent)]
pub struct Instruction(u32);

macro_rules! fields {
    ($($name:ident: $pos:ident, $size:ident;)*) => {
        paste::paste! {
            $(
                pub const fn $name(self) -> u32 {
                    (self.0 >> $pos) & mask1($size, 0)
                }

                pub fn [<set_ $name>](&mut self, v: u32) {
                    debug_assert!(v <= mask1($size, 0), "operand overflow");
                    self.0 = (self.0 & mask0($size, $pos)) | ((v << $pos) & mask1($size, $pos));
                }
            )*
        }
    };
}

impl Instruction {
    fields! {
        a: POS_A, SIZE_A;
        b: POS_B, SIZE_B;
        c: POS_C, SIZE_C;
        bx: POS_BX, SIZE_BX;
        ax: POS_AX, SIZE_AX;
    }

    pub fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        debug_assert_eq!(op.mode(), OpMode::ABC);
        debug_assert!(a <= MAXARG_A && b <= MAXARG_B && c <= MAXARG_C);
        Self(((op as u32) << POS_OP) | (a << POS_A) | (b << POS_B) | (c << POS_C))
    }

    pub fn abx(op: OpCode, a: u32, bx: u32) -> Self {
        debug_assert!(matches!(op.mode(), OpMode::ABx | OpMode::AsBx));
        debug_assert!(a <= MAXARG_A && bx <= MAXARG_BX);
        Self(((op as u32) << POS_OP) | (a << POS_A) | (bx << POS_BX))
    }

    pub fn asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        Self::abx(op, a, (sbx + MAXARG_SBX) as u32)
    }

    pub fn iax(op: OpCode, ax: u32) -> Self {
        debug_assert_eq!(op.mode(), OpMode::Ax);
        debug_assert!(ax <= MAXARG_AX);
        Self(((op as u32) << POS_OP) | (ax << POS_AX))
    }

    /// Decodes the opcode field.
    pub fn opcode(self) -> Result<OpCode, BytecodeError> {
        let raw = (self.0 >> POS_OP) & mask1(SIZE_OP, 0);
        OpCode::try_from(raw as u8).map_err(|_| BytecodeError::InvalidOpcode { raw })
    }

    /// Instructions built by this crate always carry a valid opcode.
    pub fn op(self) -> OpCode {
        match self.opcode() {
            Ok(op) => op,
            Err(e) => unreachable!("{e}"),
        }
    }

    pub fn is(self, op: OpCode) -> bool {
        (self.0 >> POS_OP) & mask1(SIZE_OP, 0) == op as u32
    }

    pub fn set_op(&mut self, op: OpCode) {
        self.0 = (self.0 & mask0(SIZE_OP, POS_OP)) | ((op as u32) << POS_OP);
    }

    pub const fn sbx(self) -> i32 {
        self.bx() as i32 - MAXARG_SBX
    }

    pub fn set_sbx(&mut self, sbx: i32) {
        self.set_bx((sbx + MAXARG_SBX) as u32)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self.opcode() {
            Ok(op) => op,
            Err(_) => return write!(f, "Instruction({:#010x})", self.0),
        };

        match op.mode() {
            OpMode::ABC => write!(f, "{} {} {} {}", op, self.a(), self.b(), self.c()),
            OpMode::ABx => write!(f, "{} {} {}", op, self.a(), self.bx()),
            OpMode::AsBx => write!(f, "{} {} {}", op, self.a(), self.sbx()),
            OpMode::Ax => write!(f, "{} {}", op, self.ax()),
        }
    }
}
