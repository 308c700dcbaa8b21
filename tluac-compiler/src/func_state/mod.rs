//! Per-function code generation state.
//!
//! A [`FuncState`] owns everything that is still mutable about a function
//! while its body is being parsed: the instruction buffer, the register
//! allocator, the constant pool, the block stack and the pending jump lists.
//! The parser drives it one construct at a time and turns it into a
//! [`Prototype`] once the body closes.

use indexmap::IndexSet;
use thiserror::Error;
use tluac_bytecode::{
    instruction::{
        is_k,
        MAXARG_AX,
        MAXARG_BX,
        MAXARG_C,
        MAXARG_SBX,
        LFIELDS_PER_FLUSH,
        NO_REG,
    },
    Constant,
    Instruction,
    LocalVar,
    Number,
    OpCode,
    Prototype,
    UpvalueDesc,
};
use tluac_lexer::{
    ChunkName,
    Position,
};
use tluac_strings::{
    LuaString,
    StringTable,
    Symbol,
};

use crate::expdesc::{
    ExpDesc,
    ExpKind,
    JumpList,
};

mod expressions;

#[cfg(test)]
mod tests;

/// Registers available to one function.
pub(crate) const MAX_STACK: u32 = 250;

/// Active locals per function.
pub(crate) const MAX_VARS: u32 = 200;

/// Upvalues per function.
pub(crate) const MAX_UPVALUES: u32 = 60;

/// `B` of `RETURN`/`CALL` and `C` of `CALL` for "all values".
pub(crate) const MULTRET: i32 = -1;

/// Failures raised while emitting code. They surface as syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CodegenError {
    #[error("function or expression too complex")]
    TooComplex,
    #[error("control structure too long")]
    ControlStructureTooLong,
    #[error("constructor too long")]
    ConstructorTooLong,
    #[error("main function has more than {limit} {what}")]
    MainLimit { limit: u32, what: &'static str },
    #[error("function at line {line} has more than {limit} {what}")]
    FunctionLimit {
        line: u32,
        limit: u32,
        what: &'static str,
    },
}

impl CodegenError {
    pub(crate) fn limit(line_defined: u32, limit: u32, what: &'static str) -> Self {
        if line_defined == 0 {
            Self::MainLimit { limit, what }
        } else {
            Self::FunctionLimit {
                line: line_defined,
                limit,
                what,
            }
        }
    }

    /// Whether the message is reported without the offending token.
    pub(crate) fn is_limit(&self) -> bool {
        matches!(self, Self::MainLimit { .. } | Self::FunctionLimit { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct UpvalDesc {
    pub(crate) name: Symbol,
    pub(crate) in_stack: bool,
    pub(crate) index: u8,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LocVar {
    pub(crate) name: Symbol,
    pub(crate) start_pc: usize,
    pub(crate) end_pc: usize,
}

/// A lexical block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockCnt {
    /// Index of the first label of this block in the parser's label list.
    pub(crate) first_label: usize,
    /// Index of the first pending goto of this block.
    pub(crate) first_goto: usize,
    /// Active locals outside the block.
    pub(crate) nactvar: u32,
    /// Some local of this block is captured as an upvalue.
    pub(crate) upval: bool,
    pub(crate) is_loop: bool,
}

pub(crate) struct FuncState {
    /// Arena index of the enclosing function.
    pub(crate) parent: Option<usize>,

    code: Vec<Instruction>,
    /// Next jump in the same pending list, parallel to `code`.
    jump_links: Vec<Option<usize>>,
    line_info: Vec<u32>,
    column_info: Vec<u32>,
    constants: IndexSet<Constant>,
    pub(crate) children: Vec<Prototype>,
    pub(crate) upvalues: Vec<UpvalDesc>,
    /// Every local ever declared, in declaration order.
    pub(crate) locals: Vec<LocVar>,
    /// Declared locals by register, as indices into `locals`. Only the first
    /// `nactvar` are in scope.
    pub(crate) actvar: Vec<usize>,
    pub(crate) blocks: Vec<BlockCnt>,

    pub(crate) line_defined: u32,
    pub(crate) last_line_defined: u32,
    pub(crate) num_params: u32,
    pub(crate) is_vararg: bool,
    max_stack_size: u32,
    pub(crate) free_reg: u32,
    pub(crate) nactvar: u32,

    /// The last pc that is the target of some jump.
    last_target: usize,
    /// Jumps waiting to be patched to the next emitted instruction.
    jpc: JumpList,
    /// Set when a jump offset did not fit. Reported by `check_jumps`.
    jump_overflow: bool,
    /// Position attributed to emitted instructions.
    pub(crate) last_position: Position,
}

impl FuncState {
    pub(crate) fn new(parent: Option<usize>, line_defined: u32, position: Position) -> Self {
        Self {
            parent,
            code: vec![],
            jump_links: vec![],
            line_info: vec![],
            column_info: vec![],
            constants: IndexSet::new(),
            children: vec![],
            upvalues: vec![],
            locals: vec![],
            actvar: vec![],
            blocks: vec![],
            line_defined,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2,
            free_reg: 0,
            nactvar: 0,
            last_target: 0,
            jpc: JumpList::EMPTY,
            jump_overflow: false,
            last_position: position,
        }
    }

    pub(crate) fn pc(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn instruction(&self, pc: usize) -> Instruction {
        self.code[pc]
    }

    pub(crate) fn instruction_mut(&mut self, pc: usize) -> &mut Instruction {
        &mut self.code[pc]
    }

    pub(crate) fn limit_error(&self, limit: u32, what: &'static str) -> CodegenError {
        CodegenError::limit(self.line_defined, limit, what)
    }

    pub(crate) fn check_limit(
        &self,
        value: usize,
        limit: u32,
        what: &'static str,
    ) -> Result<(), CodegenError> {
        if value > limit as usize {
            Err(self.limit_error(limit, what))
        } else {
            Ok(())
        }
    }

    // Emission

    fn emit(&mut self, instruction: Instruction, position: Position) -> usize {
        self.discharge_jpc();
        self.code.push(instruction);
        self.jump_links.push(None);
        self.line_info.push(position.line);
        self.column_info.push(position.column);
        self.code.len() - 1
    }

    pub(crate) fn code_abc(&mut self, op: OpCode, a: u32, b: u32, c: u32) -> usize {
        self.code_abc_at(op, a, b, c, self.last_position)
    }

    pub(crate) fn code_abc_at(
        &mut self,
        op: OpCode,
        a: u32,
        b: u32,
        c: u32,
        position: Position,
    ) -> usize {
        self.emit(Instruction::abc(op, a, b, c), position)
    }

    pub(crate) fn code_abx(&mut self, op: OpCode, a: u32, bx: u32) -> usize {
        self.emit(Instruction::abx(op, a, bx), self.last_position)
    }

    /// Emits a jump-style instruction whose offset is patched later.
    pub(crate) fn code_asbx_at(&mut self, op: OpCode, a: u32, position: Position) -> usize {
        self.emit(Instruction::asbx(op, a, 0), position)
    }

    fn code_extra_arg(&mut self, value: u32) -> usize {
        self.emit(Instruction::iax(OpCode::ExtraArg, value), self.last_position)
    }

    /// Loads constant `k` into `reg`.
    pub(crate) fn code_k(&mut self, reg: u32, k: u32) -> usize {
        if k <= MAXARG_BX {
            self.code_abx(OpCode::LoadK, reg, k)
        } else {
            let pc = self.code_abx(OpCode::LoadKx, reg, 0);
            self.code_extra_arg(k);
            pc
        }
    }

    /// Drops the last instruction. Only valid when nothing jumps to it.
    fn remove_last(&mut self) {
        self.code.pop();
        self.jump_links.pop();
        self.line_info.pop();
        self.column_info.pop();
    }

    /// Attributes the last instruction to `position`.
    pub(crate) fn fix_position(&mut self, position: Position) {
        if let (Some(line), Some(column)) = (self.line_info.last_mut(), self.column_info.last_mut())
        {
            *line = position.line;
            *column = position.column;
        }
    }

    /// Sets `n` registers starting at `from` to nil, merging with a directly
    /// preceding `LOADNIL` when the ranges touch.
    pub(crate) fn nil(&mut self, from: u32, n: u32) {
        let mut from = from;
        let mut to = from + n - 1;

        if self.pc() > self.last_target {
            if let Some(previous) = self.code.last_mut() {
                if previous.is(OpCode::LoadNil) {
                    let p_from = previous.a();
                    let p_to = p_from + previous.b();
                    if (p_from <= from && from <= p_to + 1) || (from <= p_from && p_from <= to + 1)
                    {
                        from = from.min(p_from);
                        to = to.max(p_to);
                        previous.set_a(from);
                        previous.set_b(to - from);
                        return;
                    }
                }
            }
        }

        self.code_abc(OpCode::LoadNil, from, n - 1, 0);
    }

    pub(crate) fn ret(&mut self, first: u32, nret: i32) {
        self.code_abc(OpCode::Return, first, (nret + 1) as u32, 0);
    }

    // Jumps

    /// Emits an unconditional jump, folding in any jumps that were waiting to
    /// target the next instruction.
    pub(crate) fn jump(&mut self) -> JumpList {
        let jpc = std::mem::take(&mut self.jpc);
        let j = self.code_asbx_at(OpCode::Jmp, 0, self.last_position);
        let mut list = JumpList::single(j);
        self.concat(&mut list, jpc);
        list
    }

    fn cond_jump(&mut self, op: OpCode, a: u32, b: u32, c: u32, position: Position) -> JumpList {
        self.code_abc_at(op, a, b, c, position);
        self.jump()
    }

    /// Marks the current pc as a jump target and returns it.
    pub(crate) fn get_label(&mut self) -> usize {
        self.last_target = self.pc();
        self.pc()
    }

    /// Appends `other` to the end of `list`.
    pub(crate) fn concat(&mut self, list: &mut JumpList, other: JumpList) {
        let other_head = match other.0 {
            Some(head) => head,
            None => return,
        };

        match list.0 {
            None => *list = other,
            Some(mut tail) => {
                while let Some(next) = self.jump_links[tail] {
                    tail = next;
                }
                self.jump_links[tail] = Some(other_head);
            }
        }
    }

    fn fix_jump(&mut self, pc: usize, dest: usize) {
        let offset = dest as i64 - (pc as i64 + 1);
        if offset.abs() > MAXARG_SBX as i64 {
            self.jump_overflow = true;
            return;
        }
        self.code[pc].set_sbx(offset as i32);
    }

    /// Fails if some jump did not fit its offset field.
    pub(crate) fn check_jumps(&self) -> Result<(), CodegenError> {
        if self.jump_overflow {
            Err(CodegenError::ControlStructureTooLong)
        } else {
            Ok(())
        }
    }

    /// The instruction deciding whether the jump at `pc` is taken: the test
    /// before it, or the jump itself.
    fn jump_control(&self, pc: usize) -> usize {
        if pc >= 1 && self.code[pc - 1].op().is_test() {
            pc - 1
        } else {
            pc
        }
    }

    fn jump_list(&self, list: JumpList) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(list.0, move |pc| self.jump_links[*pc])
    }

    /// Whether some jump in the list does not produce a value of its own.
    fn need_value(&self, list: JumpList) -> bool {
        self.jump_list(list)
            .any(|pc| !self.code[self.jump_control(pc)].is(OpCode::TestSet))
    }

    /// Retargets a `TESTSET` controlling the jump at `node` to `reg`, or turns
    /// it into a plain `TEST` when there is no register to fill.
    fn patch_test_reg(&mut self, node: usize, reg: u32) -> bool {
        let control = self.jump_control(node);
        let i = &mut self.code[control];
        if !i.is(OpCode::TestSet) {
            return false;
        }

        if reg != NO_REG && reg != i.b() {
            i.set_a(reg);
        } else {
            *i = Instruction::abc(OpCode::Test, i.b(), 0, i.c());
        }
        true
    }

    fn remove_values(&mut self, list: JumpList) {
        let pcs = self.jump_list(list).collect::<Vec<_>>();
        for pc in pcs {
            self.patch_test_reg(pc, NO_REG);
        }
    }

    /// Patches every jump in `list`: value-producing tests go to `vtarget`
    /// with their value in `reg`, everything else to `dtarget`.
    fn patch_list_aux(
        &mut self,
        list: JumpList,
        vtarget: usize,
        reg: u32,
        dtarget: usize,
    ) {
        let mut node = list.0;
        while let Some(pc) = node {
            node = self.jump_links[pc].take();
            if self.patch_test_reg(pc, reg) {
                self.fix_jump(pc, vtarget);
            } else {
                self.fix_jump(pc, dtarget);
            }
        }
    }

    fn discharge_jpc(&mut self) {
        let jpc = std::mem::take(&mut self.jpc);
        let pc = self.pc();
        self.patch_list_aux(jpc, pc, NO_REG, pc);
    }

    pub(crate) fn patch_to_here(&mut self, list: JumpList) {
        self.get_label();
        let mut jpc = self.jpc;
        self.concat(&mut jpc, list);
        self.jpc = jpc;
    }

    pub(crate) fn patch_list(&mut self, list: JumpList, target: usize) {
        if target == self.pc() {
            self.patch_to_here(list);
        } else {
            debug_assert!(target < self.pc());
            self.patch_list_aux(list, target, NO_REG, target);
        }
    }

    /// Makes every jump in `list` close upvalues from register `level` up.
    pub(crate) fn patch_close(&mut self, list: JumpList, level: u32) {
        let pcs = self.jump_list(list).collect::<Vec<_>>();
        for pc in pcs {
            let i = &mut self.code[pc];
            debug_assert!(i.is(OpCode::Jmp) && (i.a() == 0 || i.a() >= level + 1));
            i.set_a(level + 1);
        }
    }

    // Registers

    pub(crate) fn check_stack(&mut self, n: u32) -> Result<(), CodegenError> {
        let new_stack = self.free_reg + n;
        if new_stack > self.max_stack_size {
            if new_stack >= MAX_STACK {
                return Err(CodegenError::TooComplex);
            }
            self.max_stack_size = new_stack;
        }
        Ok(())
    }

    pub(crate) fn reserve_regs(&mut self, n: u32) -> Result<(), CodegenError> {
        self.check_stack(n)?;
        self.free_reg += n;
        Ok(())
    }

    fn free_register(&mut self, reg: u32) {
        if !is_k(reg) && reg >= self.nactvar {
            self.free_reg -= 1;
            debug_assert_eq!(reg, self.free_reg, "registers are freed out of order");
        }
    }

    fn free_exp(&mut self, e: &ExpDesc) {
        if let ExpKind::NonReloc(reg) = e.kind {
            self.free_register(reg);
        }
    }

    // Constants

    pub(crate) fn add_constant(&mut self, k: Constant) -> Result<u32, CodegenError> {
        let (index, _) = self.constants.insert_full(k);
        if index > MAXARG_AX as usize {
            return Err(self.limit_error(MAXARG_AX, "constants"));
        }
        Ok(index as u32)
    }

    pub(crate) fn string_k(&mut self, s: LuaString) -> Result<u32, CodegenError> {
        self.add_constant(Constant::String(s))
    }

    pub(crate) fn number_k(&mut self, n: Number) -> Result<u32, CodegenError> {
        self.add_constant(Constant::from(n))
    }

    fn bool_k(&mut self, b: bool) -> Result<u32, CodegenError> {
        self.add_constant(Constant::Boolean(b))
    }

    fn nil_k(&mut self) -> Result<u32, CodegenError> {
        self.add_constant(Constant::Nil)
    }

    pub(crate) fn constant_count(&self) -> usize {
        self.constants.len()
    }

    // Variables

    pub(crate) fn new_local(&mut self, name: Symbol) -> Result<(), CodegenError> {
        self.check_limit(self.actvar.len() + 1, MAX_VARS, "local variables")?;
        self.locals.push(LocVar {
            name,
            start_pc: 0,
            end_pc: 0,
        });
        self.actvar.push(self.locals.len() - 1);
        Ok(())
    }

    /// Brings the next `n` declared locals into scope.
    pub(crate) fn adjust_local_vars(&mut self, n: u32) {
        let pc = self.pc();
        for _ in 0..n {
            let local = self.actvar[self.nactvar as usize];
            self.locals[local].start_pc = pc;
            self.nactvar += 1;
        }
    }

    /// Ends the scope of every local above `to_level`.
    pub(crate) fn remove_vars(&mut self, to_level: u32) {
        let pc = self.pc();
        while self.nactvar > to_level {
            self.nactvar -= 1;
            let local = self.actvar[self.nactvar as usize];
            self.locals[local].end_pc = pc;
        }
        self.actvar.truncate(to_level as usize);
    }

    /// The active local at `level`.
    pub(crate) fn local_at(&self, level: u32) -> &LocVar {
        &self.locals[self.actvar[level as usize]]
    }

    pub(crate) fn local_at_mut(&mut self, level: u32) -> &mut LocVar {
        &mut self.locals[self.actvar[level as usize]]
    }

    /// The register of the innermost active local called `name`.
    pub(crate) fn search_var(&self, name: Symbol) -> Option<u32> {
        (0..self.nactvar)
            .rev()
            .find(|level| self.local_at(*level).name == name)
    }

    pub(crate) fn search_upvalue(&self, name: Symbol) -> Option<u32> {
        self.upvalues
            .iter()
            .position(|upval| upval.name == name)
            .map(|index| index as u32)
    }

    /// Adds an upvalue referring to `source` in the enclosing function.
    pub(crate) fn new_upvalue(&mut self, name: Symbol, source: ExpKind) -> Result<u32, CodegenError> {
        self.check_limit(self.upvalues.len() + 1, MAX_UPVALUES, "upvalues")?;
        let (in_stack, index) = match source {
            ExpKind::Local(reg) => (true, reg),
            ExpKind::Upvalue(index) => (false, index),
            kind => unreachable!("{kind:?} cannot be captured"),
        };
        self.upvalues.push(UpvalDesc {
            name,
            in_stack,
            index: index as u8,
        });
        Ok(self.upvalues.len() as u32 - 1)
    }

    /// Marks the block declaring the local at `level` as captured.
    pub(crate) fn mark_upvalue(&mut self, level: u32) {
        if let Some(block) = self.blocks.iter_mut().rev().find(|bl| bl.nactvar <= level) {
            block.upval = true;
        }
    }

    // Tables

    /// Stores `to_store` pending list items (or everything up to the top for
    /// `MULTRET`) into the table at `base`.
    pub(crate) fn set_list(
        &mut self,
        base: u32,
        nelems: u32,
        to_store: i32,
    ) -> Result<(), CodegenError> {
        let c = (nelems - 1) / LFIELDS_PER_FLUSH + 1;
        let b = if to_store == MULTRET { 0 } else { to_store as u32 };
        if c <= MAXARG_C {
            self.code_abc(OpCode::SetList, base, b, c);
        } else if c <= MAXARG_AX {
            self.code_abc(OpCode::SetList, base, b, 0);
            self.code_extra_arg(c);
        } else {
            return Err(CodegenError::ConstructorTooLong);
        }
        self.free_reg = base + 1;
        Ok(())
    }

    // Closing

    /// Emits the implicit `return` at the end of a body, unless the body
    /// already ends in a `return` that nothing jumps past.
    pub(crate) fn final_return(&mut self) {
        let ends_in_return = self.code.last().map_or(false, |i| i.is(OpCode::Return));
        if ends_in_return && self.jpc.is_empty() && self.last_target < self.pc() {
            return;
        }
        self.ret(0, 0);
    }

    pub(crate) fn into_prototype(self, strings: &StringTable, chunk: &ChunkName) -> Prototype {
        debug_assert!(self.jpc.is_empty(), "unpatched jumps at end of function");

        Prototype {
            source: chunk.source().clone(),
            short_source: chunk.short().to_string(),
            constants: self.constants.into_iter().collect(),
            code: self.code,
            children: self.children,
            num_params: self.num_params as u8,
            is_vararg: self.is_vararg,
            max_stack_size: self.max_stack_size as u8,
            upvalues: self
                .upvalues
                .into_iter()
                .map(|upval| UpvalueDesc {
                    name: Some(strings.get(upval.name).clone()),
                    in_stack: upval.in_stack,
                    index: upval.index,
                })
                .collect(),
            line_defined: self.line_defined,
            last_line_defined: self.last_line_defined,
            line_info: self.line_info,
            column_info: self.column_info,
            locals: self
                .locals
                .into_iter()
                .map(|local| LocalVar {
                    name: strings.get(local.name).clone(),
                    start_pc: local.start_pc,
                    end_pc: local.end_pc,
                })
                .collect(),
        }
    }
}
