use num_enum::{
    IntoPrimitive,
    TryFromPrimitive,
};
use strum::{
    Display,
    EnumCount,
    EnumIter,
    IntoStaticStr,
};

/// The instruction set emitted by the compiler.
///
/// Register operands are written `R(x)`, constants `Kst(x)` and "register or
/// constant" operands `RK(x)`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
    Display,
    IntoStaticStr,
    EnumCount,
    EnumIter,
)]
#[repr(u8)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OpCode {
    /// `R(A) := R(B)`
    Move = 0,
    /// `R(A) := Kst(Bx)`
    LoadK,
    /// `R(A) := Kst(extra arg)`
    LoadKx,
    /// `R(A) := (Bool)B; if (C) pc++`
    LoadBool,
    /// `R(A), R(A+1), ..., R(A+B) := nil`
    LoadNil,
    /// `R(A) := UpValue[B]`
    GetUpval,
    /// `R(A) := UpValue[B][RK(C)]`
    GetTabUp,
    /// `R(A) := R(B)[RK(C)]`
    GetTable,
    /// `UpValue[A][RK(B)] := RK(C)`
    SetTabUp,
    /// `UpValue[B] := R(A)`
    SetUpval,
    /// `R(A)[RK(B)] := RK(C)`
    SetTable,
    /// `R(A) := {} (size = B,C)`
    NewTable,
    /// `R(A+1) := R(B); R(A) := R(B)[RK(C)]`
    #[strum(serialize = "SELF")]
    SelfOp,
    /// `R(A) := RK(B) + RK(C)`
    Add,
    /// `R(A) := RK(B) - RK(C)`
    Sub,
    /// `R(A) := RK(B) * RK(C)`
    Mul,
    /// `R(A) := RK(B) / RK(C)`
    Div,
    /// `R(A) := RK(B) % RK(C)`
    Mod,
    /// `R(A) := RK(B) ^ RK(C)`
    Pow,
    /// `R(A) := -R(B)`
    Unm,
    /// `R(A) := not R(B)`
    Not,
    /// `R(A) := length of R(B)`
    Len,
    /// `R(A) := R(B).. ... ..R(C)`
    Concat,
    /// `pc += sBx; if (A) close all upvalues >= R(A - 1)`
    Jmp,
    /// `if ((RK(B) == RK(C)) ~= A) then pc++`
    Eq,
    /// `if ((RK(B) <  RK(C)) ~= A) then pc++`
    Lt,
    /// `if ((RK(B) <= RK(C)) ~= A) then pc++`
    Le,
    /// `if not (R(A) <=> C) then pc++`
    Test,
    /// `if (R(B) <=> C) then R(A) := R(B) else pc++`
    TestSet,
    /// `R(A), ... ,R(A+C-2) := R(A)(R(A+1), ... ,R(A+B-1))`
    Call,
    /// `return R(A)(R(A+1), ... ,R(A+B-1))`
    TailCall,
    /// `return R(A), ... ,R(A+B-2)`
    Return,
    /// `R(A) += R(A+2); if R(A) <?= R(A+1) then { pc += sBx; R(A+3) = R(A) }`
    ForLoop,
    /// `R(A) -= R(A+2); pc += sBx`
    ForPrep,
    /// `R(A+3), ... ,R(A+2+C) := R(A)(R(A+1), R(A+2))`
    TForCall,
    /// `if R(A+1) ~= nil then { R(A) = R(A+1); pc += sBx }`
    TForLoop,
    /// `R(A)[(C-1)*FPF+i] := R(A+i), 1 <= i <= B`
    SetList,
    /// `R(A) := closure(KPROTO[Bx])`
    Closure,
    /// `R(A), R(A+1), ..., R(A+B-2) = vararg`
    VarArg,
    /// Extra (larger) argument for the previous opcode.
    ExtraArg,
}

/// How the operand fields of an instruction are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    ABC,
    ABx,
    AsBx,
    Ax,
}

/// What a `B` or `C` operand is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpArgMode {
    /// Not used.
    N,
    /// Used, but not as a register or constant.
    U,
    /// A register or a jump offset.
    R,
    /// A constant or register/constant.
    K,
}

struct OpProps {
    test: bool,
    sets_a: bool,
    b: OpArgMode,
    c: OpArgMode,
    mode: OpMode,
}

const fn props(test: bool, sets_a: bool, b: OpArgMode, c: OpArgMode, mode: OpMode) -> OpProps {
    OpProps {
        test,
        sets_a,
        b,
        c,
        mode,
    }
}

impl OpCode {
    const fn props(self) -> OpProps {
        use OpArgMode::*;
        use OpMode::*;

        match self {
            OpCode::Move => props(false, true, R, N, ABC),
            OpCode::LoadK => props(false, true, K, N, ABx),
            OpCode::LoadKx => props(false, true, N, N, ABx),
            OpCode::LoadBool => props(false, true, U, U, ABC),
            OpCode::LoadNil => props(false, true, U, N, ABC),
            OpCode::GetUpval => props(false, true, U, N, ABC),
            OpCode::GetTabUp => props(false, true, U, K, ABC),
            OpCode::GetTable => props(false, true, R, K, ABC),
            OpCode::SetTabUp => props(false, false, K, K, ABC),
            OpCode::SetUpval => props(false, false, U, N, ABC),
            OpCode::SetTable => props(false, false, K, K, ABC),
            OpCode::NewTable => props(false, true, U, U, ABC),
            OpCode::SelfOp => props(false, true, R, K, ABC),
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Pow => props(false, true, K, K, ABC),
            OpCode::Unm | OpCode::Not | OpCode::Len => props(false, true, R, N, ABC),
            OpCode::Concat => props(false, true, R, R, ABC),
            OpCode::Jmp => props(false, false, R, N, AsBx),
            OpCode::Eq | OpCode::Lt | OpCode::Le => props(true, false, K, K, ABC),
            OpCode::Test => props(true, false, N, U, ABC),
            OpCode::TestSet => props(true, true, R, U, ABC),
            OpCode::Call | OpCode::TailCall => props(false, true, U, U, ABC),
            OpCode::Return => props(false, false, U, N, ABC),
            OpCode::ForLoop | OpCode::ForPrep => props(false, true, R, N, AsBx),
            OpCode::TForCall => props(false, false, N, U, ABC),
            OpCode::TForLoop => props(false, true, R, N, AsBx),
            OpCode::SetList => props(false, false, U, U, ABC),
            OpCode::Closure => props(false, true, U, N, ABx),
            OpCode::VarArg => props(false, true, U, N, ABC),
            OpCode::ExtraArg => props(false, false, U, U, Ax),
        }
    }

    pub const fn mode(self) -> OpMode {
        self.props().mode
    }

    pub const fn b_mode(self) -> OpArgMode {
        self.props().b
    }

    pub const fn c_mode(self) -> OpArgMode {
        self.props().c
    }

    /// Whether the instruction writes to register `A`.
    pub const fn sets_a(self) -> bool {
        self.props().sets_a
    }

    /// Test-mode instructions are always followed by a `JMP`, which they skip
    /// when the test fails.
    pub const fn is_test(self) -> bool {
        self.props().test
    }

    /// Whether the `sBx` field of the instruction is a jump offset.
    pub const fn is_jump(self) -> bool {
        matches!(self.mode(), OpMode::AsBx)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}
