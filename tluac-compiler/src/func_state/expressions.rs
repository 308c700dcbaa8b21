use tluac_bytecode::{
    instruction::{
        rk_as_k,
        MAXINDEXRK,
        NO_REG,
    },
    Number,
    OpCode,
};
use tluac_lexer::Position;

use super::{
    CodegenError,
    FuncState,
    MULTRET,
};
use crate::{
    expdesc::{
        ExpDesc,
        ExpKind,
        JumpList,
        TableKind,
    },
    operators::{
        BinOpr,
        UnOpr,
    },
};

/// Evaluates `op` on two numeric literals. Division and modulo by zero and
/// any non-finite result are left to run time.
pub(super) fn const_fold(op: OpCode, v1: f64, v2: f64) -> Option<f64> {
    let result = match op {
        OpCode::Add => v1 + v2,
        OpCode::Sub => v1 - v2,
        OpCode::Mul => v1 * v2,
        OpCode::Div if v2 != 0.0 => v1 / v2,
        OpCode::Mod if v2 != 0.0 => v1 - (v1 / v2).floor() * v2,
        OpCode::Pow => v1.powf(v2),
        _ => return None,
    };

    if result.is_finite() {
        Some(result)
    } else {
        None
    }
}

impl FuncState {
    /// The pc of the instruction an expression refers to.
    fn exp_pc(e: &ExpDesc) -> usize {
        match e.kind {
            ExpKind::Relocable(pc) | ExpKind::Call(pc) | ExpKind::VarArg(pc) | ExpKind::Jump(pc) => {
                pc
            }
            kind => unreachable!("{kind:?} has no instruction"),
        }
    }

    /// Fixes the number of results of an open call or vararg.
    pub(crate) fn set_returns(&mut self, e: &mut ExpDesc, nresults: i32) -> Result<(), CodegenError> {
        match e.kind {
            ExpKind::Call(pc) => self.instruction_mut(pc).set_c((nresults + 1) as u32),
            ExpKind::VarArg(pc) => {
                let free_reg = self.free_reg;
                let i = self.instruction_mut(pc);
                i.set_b((nresults + 1) as u32);
                i.set_a(free_reg);
                self.reserve_regs(1)?;
            }
            _ => (),
        }
        Ok(())
    }

    pub(crate) fn set_multi_ret(&mut self, e: &mut ExpDesc) -> Result<(), CodegenError> {
        self.set_returns(e, MULTRET)
    }

    /// Truncates an open call or vararg to a single value.
    pub(crate) fn set_one_ret(&mut self, e: &mut ExpDesc) {
        match e.kind {
            ExpKind::Call(pc) => e.kind = ExpKind::NonReloc(self.instruction(pc).a()),
            ExpKind::VarArg(pc) => {
                self.instruction_mut(pc).set_b(2);
                e.kind = ExpKind::Relocable(pc);
            }
            _ => (),
        }
    }

    /// Turns variables into values: locals become fixed registers, upvalues
    /// and indexed accesses become relocatable loads.
    pub(crate) fn discharge_vars(&mut self, e: &mut ExpDesc) {
        match e.kind {
            ExpKind::Local(reg) => e.kind = ExpKind::NonReloc(reg),
            ExpKind::Upvalue(index) => {
                let pc = self.code_abc_at(OpCode::GetUpval, 0, index, 0, e.position);
                e.kind = ExpKind::Relocable(pc);
            }
            ExpKind::Indexed {
                table,
                key,
                table_kind,
            } => {
                self.free_register(key);
                let op = match table_kind {
                    TableKind::Local => {
                        self.free_register(table);
                        OpCode::GetTable
                    }
                    TableKind::Upvalue => OpCode::GetTabUp,
                };
                let pc = self.code_abc_at(op, 0, table, key, e.position);
                e.kind = ExpKind::Relocable(pc);
            }
            ExpKind::Call(_) | ExpKind::VarArg(_) => self.set_one_ret(e),
            _ => (),
        }
    }

    fn discharge_to_reg(&mut self, e: &mut ExpDesc, reg: u32) -> Result<(), CodegenError> {
        self.discharge_vars(e);
        match e.kind {
            ExpKind::Nil => self.nil(reg, 1),
            ExpKind::False | ExpKind::True => {
                self.code_abc(OpCode::LoadBool, reg, (e.kind == ExpKind::True) as u32, 0);
            }
            ExpKind::K(k) => {
                self.code_k(reg, k);
            }
            ExpKind::Number(n) => {
                let k = self.number_k(n)?;
                self.code_k(reg, k);
            }
            ExpKind::Relocable(pc) => self.instruction_mut(pc).set_a(reg),
            ExpKind::NonReloc(src) => {
                if src != reg {
                    self.code_abc(OpCode::Move, reg, src, 0);
                }
            }
            ExpKind::Void | ExpKind::Jump(_) => return Ok(()),
            kind => unreachable!("{kind:?} survived discharge_vars"),
        }
        e.kind = ExpKind::NonReloc(reg);
        Ok(())
    }

    fn discharge_to_any_reg(&mut self, e: &mut ExpDesc) -> Result<(), CodegenError> {
        if !matches!(e.kind, ExpKind::NonReloc(_)) {
            self.reserve_regs(1)?;
            self.discharge_to_reg(e, self.free_reg - 1)?;
        }
        Ok(())
    }

    fn code_load_bool(&mut self, reg: u32, b: bool, skip: bool) -> usize {
        self.get_label();
        self.code_abc(OpCode::LoadBool, reg, b as u32, skip as u32)
    }

    /// Puts the value of `e` into `reg`, resolving its pending jumps.
    fn exp_to_reg(&mut self, e: &mut ExpDesc, reg: u32) -> Result<(), CodegenError> {
        self.discharge_to_reg(e, reg)?;
        if let ExpKind::Jump(pc) = e.kind {
            self.concat(&mut e.t, JumpList::single(pc));
        }

        if e.has_jumps() {
            let mut load_false = None;
            let mut load_true = None;
            if self.need_value(e.t) || self.need_value(e.f) {
                let fj = match e.kind {
                    ExpKind::Jump(_) => JumpList::EMPTY,
                    _ => self.jump(),
                };
                load_false = Some(self.code_load_bool(reg, false, true));
                load_true = Some(self.code_load_bool(reg, true, false));
                self.patch_to_here(fj);
            }

            let end = self.get_label();
            // Without boolean loads every jump carries its own value.
            self.patch_list_aux(e.f, end, reg, load_false.unwrap_or(end));
            self.patch_list_aux(e.t, end, reg, load_true.unwrap_or(end));
        }

        e.t = JumpList::EMPTY;
        e.f = JumpList::EMPTY;
        e.kind = ExpKind::NonReloc(reg);
        Ok(())
    }

    /// Puts the value of `e` into the next free register and returns it.
    pub(crate) fn exp_to_next_reg(&mut self, e: &mut ExpDesc) -> Result<u32, CodegenError> {
        self.discharge_vars(e);
        self.free_exp(e);
        self.reserve_regs(1)?;
        let reg = self.free_reg - 1;
        self.exp_to_reg(e, reg)?;
        Ok(reg)
    }

    /// Puts the value of `e` into some register, reusing the one it is already
    /// in when possible.
    pub(crate) fn exp_to_any_reg(&mut self, e: &mut ExpDesc) -> Result<u32, CodegenError> {
        self.discharge_vars(e);
        if let ExpKind::NonReloc(reg) = e.kind {
            if !e.has_jumps() {
                return Ok(reg);
            }
            // A temporary can take the final value in place.
            if reg >= self.nactvar {
                self.exp_to_reg(e, reg)?;
                return Ok(reg);
            }
        }
        self.exp_to_next_reg(e)
    }

    /// Like [`exp_to_any_reg`](Self::exp_to_any_reg), but upvalues without
    /// pending jumps are left alone.
    pub(crate) fn exp_to_any_reg_up(&mut self, e: &mut ExpDesc) -> Result<(), CodegenError> {
        if !matches!(e.kind, ExpKind::Upvalue(_)) || e.has_jumps() {
            self.exp_to_any_reg(e)?;
        }
        Ok(())
    }

    pub(crate) fn exp_to_val(&mut self, e: &mut ExpDesc) -> Result<(), CodegenError> {
        if e.has_jumps() {
            self.exp_to_any_reg(e)?;
        } else {
            self.discharge_vars(e);
        }
        Ok(())
    }

    /// Turns `e` into an RK operand: a constant index when one fits,
    /// otherwise a register.
    pub(crate) fn exp_to_rk(&mut self, e: &mut ExpDesc) -> Result<u32, CodegenError> {
        self.exp_to_val(e)?;

        match e.kind {
            ExpKind::True | ExpKind::False | ExpKind::Nil
                if self.constant_count() <= MAXINDEXRK as usize =>
            {
                let k = match e.kind {
                    ExpKind::Nil => self.nil_k()?,
                    kind => self.bool_k(kind == ExpKind::True)?,
                };
                e.kind = ExpKind::K(k);
                return Ok(rk_as_k(k));
            }
            ExpKind::Number(n) => {
                let k = self.number_k(n)?;
                e.kind = ExpKind::K(k);
            }
            _ => (),
        }

        match e.kind {
            ExpKind::K(k) if k <= MAXINDEXRK => Ok(rk_as_k(k)),
            _ => self.exp_to_any_reg(e),
        }
    }

    /// Assigns `ex` to the variable `var`.
    pub(crate) fn store_var(&mut self, var: &ExpDesc, ex: &mut ExpDesc) -> Result<(), CodegenError> {
        match var.kind {
            ExpKind::Local(reg) => {
                self.free_exp(ex);
                return self.exp_to_reg(ex, reg);
            }
            ExpKind::Upvalue(index) => {
                let reg = self.exp_to_any_reg(ex)?;
                self.code_abc(OpCode::SetUpval, reg, index, 0);
            }
            ExpKind::Indexed {
                table,
                key,
                table_kind,
            } => {
                let op = match table_kind {
                    TableKind::Local => OpCode::SetTable,
                    TableKind::Upvalue => OpCode::SetTabUp,
                };
                let value = self.exp_to_rk(ex)?;
                self.code_abc(op, table, key, value);
            }
            kind => unreachable!("cannot assign to {kind:?}"),
        }
        self.free_exp(ex);
        Ok(())
    }

    /// `e:key(...)`: loads the method into a fresh register with `e` as its
    /// first argument.
    pub(crate) fn self_op(&mut self, e: &mut ExpDesc, key: &mut ExpDesc) -> Result<(), CodegenError> {
        let reg = self.exp_to_any_reg(e)?;
        self.free_exp(e);

        let base = self.free_reg;
        e.kind = ExpKind::NonReloc(base);
        self.reserve_regs(2)?;
        let key_rk = self.exp_to_rk(key)?;
        self.code_abc(OpCode::SelfOp, base, reg, key_rk);
        self.free_exp(key);
        Ok(())
    }

    /// Turns `t` into the indexed expression `t[k]`.
    pub(crate) fn indexed(&mut self, t: &mut ExpDesc, k: &mut ExpDesc) -> Result<(), CodegenError> {
        debug_assert!(!t.has_jumps());
        let key = self.exp_to_rk(k)?;
        let (table, table_kind) = match t.kind {
            ExpKind::Upvalue(index) => (index, TableKind::Upvalue),
            ExpKind::Local(reg) | ExpKind::NonReloc(reg) => (reg, TableKind::Local),
            kind => unreachable!("cannot index {kind:?}"),
        };
        t.kind = ExpKind::Indexed {
            table,
            key,
            table_kind,
        };
        Ok(())
    }

    // Conditions

    fn negate_condition(&mut self, e: &ExpDesc) {
        let control = self.jump_control(Self::exp_pc(e));
        let i = self.instruction_mut(control);
        debug_assert!(i.op().is_test() && !i.is(OpCode::TestSet) && !i.is(OpCode::Test));
        let a = i.a();
        i.set_a((a == 0) as u32);
    }

    /// Emits a jump taken when `e` equals `cond`.
    fn jump_on_cond(&mut self, e: &mut ExpDesc, cond: bool) -> Result<JumpList, CodegenError> {
        if let ExpKind::Relocable(pc) = e.kind {
            let i = self.instruction(pc);
            if i.is(OpCode::Not) {
                // Test the operand of the `not` directly.
                self.remove_last();
                return Ok(self.cond_jump(OpCode::Test, i.b(), 0, (!cond) as u32, e.position));
            }
        }

        self.discharge_to_any_reg(e)?;
        self.free_exp(e);
        let reg = match e.kind {
            ExpKind::NonReloc(reg) => reg,
            kind => unreachable!("{kind:?} after discharge_to_any_reg"),
        };
        Ok(self.cond_jump(OpCode::TestSet, NO_REG, reg, cond as u32, e.position))
    }

    /// Falls through when `e` is true, jumps through `e.f` otherwise.
    pub(crate) fn go_if_true(&mut self, e: &mut ExpDesc) -> Result<(), CodegenError> {
        self.discharge_vars(e);
        let pc = match e.kind {
            ExpKind::Jump(pc) => {
                self.negate_condition(e);
                JumpList::single(pc)
            }
            ExpKind::K(_) | ExpKind::Number(_) | ExpKind::True => JumpList::EMPTY,
            _ => self.jump_on_cond(e, false)?,
        };
        self.concat(&mut e.f, pc);
        self.patch_to_here(e.t);
        e.t = JumpList::EMPTY;
        Ok(())
    }

    /// Falls through when `e` is false, jumps through `e.t` otherwise.
    pub(crate) fn go_if_false(&mut self, e: &mut ExpDesc) -> Result<(), CodegenError> {
        self.discharge_vars(e);
        let pc = match e.kind {
            ExpKind::Jump(pc) => JumpList::single(pc),
            ExpKind::Nil | ExpKind::False => JumpList::EMPTY,
            _ => self.jump_on_cond(e, true)?,
        };
        self.concat(&mut e.t, pc);
        self.patch_to_here(e.f);
        e.f = JumpList::EMPTY;
        Ok(())
    }

    fn code_not(&mut self, e: &mut ExpDesc) -> Result<(), CodegenError> {
        self.discharge_vars(e);
        match e.kind {
            ExpKind::Nil | ExpKind::False => e.kind = ExpKind::True,
            ExpKind::K(_) | ExpKind::Number(_) | ExpKind::True => e.kind = ExpKind::False,
            ExpKind::Jump(_) => self.negate_condition(e),
            ExpKind::Relocable(_) | ExpKind::NonReloc(_) => {
                self.discharge_to_any_reg(e)?;
                self.free_exp(e);
                let reg = match e.kind {
                    ExpKind::NonReloc(reg) => reg,
                    kind => unreachable!("{kind:?} after discharge_to_any_reg"),
                };
                let pc = self.code_abc_at(OpCode::Not, 0, reg, 0, e.position);
                e.kind = ExpKind::Relocable(pc);
            }
            kind => unreachable!("cannot negate {kind:?}"),
        }

        std::mem::swap(&mut e.t, &mut e.f);
        self.remove_values(e.f);
        self.remove_values(e.t);
        Ok(())
    }

    // Operators

    fn code_arith(
        &mut self,
        op: OpCode,
        e1: &mut ExpDesc,
        e2: &mut ExpDesc,
        position: Position,
    ) -> Result<(), CodegenError> {
        if let (Some(v1), Some(v2)) = (e1.as_numeral(), e2.as_numeral()) {
            if let Some(result) = const_fold(op, v1.as_float(), v2.as_float()) {
                e1.kind = ExpKind::Number(Number::normalized(result));
                return Ok(());
            }
        }

        let o2 = if op != OpCode::Unm && op != OpCode::Len {
            self.exp_to_rk(e2)?
        } else {
            0
        };
        let o1 = self.exp_to_rk(e1)?;
        if o1 > o2 {
            self.free_exp(e1);
            self.free_exp(e2);
        } else {
            self.free_exp(e2);
            self.free_exp(e1);
        }

        let pc = self.code_abc(op, 0, o1, o2);
        e1.kind = ExpKind::Relocable(pc);
        self.fix_position(position);
        Ok(())
    }

    fn code_comparison(
        &mut self,
        op: OpCode,
        cond: bool,
        e1: &mut ExpDesc,
        e2: &mut ExpDesc,
        position: Position,
    ) -> Result<(), CodegenError> {
        let mut o1 = self.exp_to_rk(e1)?;
        let mut o2 = self.exp_to_rk(e2)?;
        self.free_exp(e2);
        self.free_exp(e1);

        let mut cond = cond;
        if !cond && op != OpCode::Eq {
            // `a > b` is `b < a`.
            std::mem::swap(&mut o1, &mut o2);
            cond = true;
        }

        let jump = self.cond_jump(op, cond as u32, o1, o2, position);
        e1.kind = match jump.0 {
            Some(pc) => ExpKind::Jump(pc),
            None => unreachable!("cond_jump always emits a jump"),
        };
        Ok(())
    }

    /// Applies a unary operator to `e`.
    pub(crate) fn prefix(
        &mut self,
        op: UnOpr,
        e: &mut ExpDesc,
        position: Position,
    ) -> Result<(), CodegenError> {
        let mut zero = ExpDesc::new(ExpKind::Number(Number::Integer(0)), position);
        match op {
            UnOpr::Minus => {
                if let Some(n) = e.as_numeral() {
                    e.kind = ExpKind::Number(Number::normalized(-n.as_float()));
                } else {
                    self.exp_to_any_reg(e)?;
                    self.code_arith(OpCode::Unm, e, &mut zero, position)?;
                }
            }
            UnOpr::Not => self.code_not(e)?,
            UnOpr::Len => {
                self.exp_to_any_reg(e)?;
                self.code_arith(OpCode::Len, e, &mut zero, position)?;
            }
        }
        Ok(())
    }

    /// Prepares the left operand before the right one is parsed.
    pub(crate) fn infix(&mut self, op: BinOpr, v: &mut ExpDesc) -> Result<(), CodegenError> {
        match op {
            BinOpr::And => self.go_if_true(v)?,
            BinOpr::Or => self.go_if_false(v)?,
            BinOpr::Concat => {
                self.exp_to_next_reg(v)?;
            }
            op if op.arith_op().is_some() => {
                // Literals stay unevaluated so they can be folded.
                if v.as_numeral().is_none() {
                    self.exp_to_rk(v)?;
                }
            }
            _ => {
                self.exp_to_rk(v)?;
            }
        }
        Ok(())
    }

    /// Combines both operands once the right one is parsed.
    pub(crate) fn posfix(
        &mut self,
        op: BinOpr,
        e1: &mut ExpDesc,
        e2: &mut ExpDesc,
        position: Position,
    ) -> Result<(), CodegenError> {
        match op {
            BinOpr::And => {
                debug_assert!(e1.t.is_empty());
                self.discharge_vars(e2);
                self.concat(&mut e2.f, e1.f);
                *e1 = *e2;
            }
            BinOpr::Or => {
                debug_assert!(e1.f.is_empty());
                self.discharge_vars(e2);
                self.concat(&mut e2.t, e1.t);
                *e1 = *e2;
            }
            BinOpr::Concat => {
                self.exp_to_val(e2)?;
                match e2.kind {
                    ExpKind::Relocable(pc) if self.instruction(pc).is(OpCode::Concat) => {
                        // Extend the chain `e2` already started.
                        let reg = match e1.kind {
                            ExpKind::NonReloc(reg) => reg,
                            kind => unreachable!("concat operand in {kind:?}"),
                        };
                        debug_assert_eq!(reg + 1, self.instruction(pc).b());
                        self.free_exp(e1);
                        self.instruction_mut(pc).set_b(reg);
                        e1.kind = ExpKind::Relocable(pc);
                    }
                    _ => {
                        self.exp_to_next_reg(e2)?;
                        self.code_arith(OpCode::Concat, e1, e2, position)?;
                    }
                }
            }
            BinOpr::Eq => self.code_comparison(OpCode::Eq, true, e1, e2, position)?,
            BinOpr::Lt => self.code_comparison(OpCode::Lt, true, e1, e2, position)?,
            BinOpr::Le => self.code_comparison(OpCode::Le, true, e1, e2, position)?,
            BinOpr::Ne => self.code_comparison(OpCode::Eq, false, e1, e2, position)?,
            BinOpr::Gt => self.code_comparison(OpCode::Lt, false, e1, e2, position)?,
            BinOpr::Ge => self.code_comparison(OpCode::Le, false, e1, e2, position)?,
            arith => match arith.arith_op() {
                Some(op) => self.code_arith(op, e1, e2, position)?,
                None => unreachable!("{arith:?} is not arithmetic"),
            },
        }
        Ok(())
    }
}
