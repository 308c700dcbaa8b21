use tluac_bytecode::{
    Number,
    OpCode,
};
use tluac_lexer::{
    Position,
    Token,
};
use tluac_strings::Symbol;

use crate::{
    expdesc::{
        ExpKind,
        JumpList,
    },
    parser::{
        ParseResult,
        Parser,
    },
};

impl Parser<'_> {
    /// Parses a loop condition. Returns the jumps taken when it is false.
    fn cond(&mut self) -> ParseResult<JumpList> {
        let mut v = self.expression()?;
        if v.kind == ExpKind::Nil {
            v.kind = ExpKind::False;
        }
        self.fs_mut().go_if_true(&mut v)?;
        Ok(v.f)
    }

    pub(super) fn while_stat(&mut self, line: u32) -> ParseResult {
        self.next()?;
        let while_init = self.fs_mut().get_label();
        let cond_exit = self.cond()?;

        self.enter_block(true);
        self.check_next(Token::Do)?;
        self.block()?;
        let fs = self.fs_mut();
        let back = fs.jump();
        fs.patch_list(back, while_init);
        self.check_match(Token::End, Token::While, line)?;
        self.leave_block()?;

        self.fs_mut().patch_to_here(cond_exit);
        Ok(())
    }

    /// The condition of `repeat ... until` sees the body's locals, so the
    /// scope block stays open until after it.
    pub(super) fn repeat_stat(&mut self, line: u32) -> ParseResult {
        let repeat_init = self.fs_mut().get_label();
        self.enter_block(true);
        self.enter_block(false);
        self.next()?;
        self.statement_list()?;
        self.check_match(Token::Until, Token::Repeat, line)?;

        let cond_exit = self.cond()?;
        let scope = self.current_block();
        if scope.upval {
            self.fs_mut().patch_close(cond_exit, scope.nactvar);
        }
        self.leave_block()?;
        self.fs_mut().patch_list(cond_exit, repeat_init);
        self.leave_block()
    }

    pub(super) fn for_stat(&mut self, line: u32) -> ParseResult {
        let position = self.lexer.position();
        self.enter_block(true);
        self.next()?;

        let name = self.str_check_name()?;
        match self.lexer.token() {
            Token::Assign => self.for_num(name, position)?,
            Token::Comma | Token::In => self.for_list(name)?,
            _ => return Err(self.lexer.syntax_error("'=' or 'in' expected").into()),
        }

        self.check_match(Token::End, Token::For, line)?;
        self.leave_block()
    }

    /// `for v = e1, e2 [, e3] do block end`
    fn for_num(&mut self, name: Symbol, position: Position) -> ParseResult {
        let base = self.fs().free_reg;
        self.new_local_literal("(for index)")?;
        self.new_local_literal("(for limit)")?;
        self.new_local_literal("(for step)")?;
        self.fs_mut().new_local(name)?;

        self.check_next(Token::Assign)?;
        self.exp1()?;
        self.check_next(Token::Comma)?;
        self.exp1()?;
        if self.test_next(Token::Comma)? {
            self.exp1()?;
        } else {
            let fs = self.fs_mut();
            let one = fs.number_k(Number::Integer(1))?;
            fs.code_k(fs.free_reg, one);
            fs.reserve_regs(1)?;
        }

        self.for_body(base, position, 1, true)
    }

    /// `for v1, v2, ... in explist do block end`
    fn for_list(&mut self, first: Symbol) -> ParseResult {
        let base = self.fs().free_reg;
        self.new_local_literal("(for generator)")?;
        self.new_local_literal("(for state)")?;
        self.new_local_literal("(for control)")?;
        self.fs_mut().new_local(first)?;

        let mut nvars = 1;
        while self.test_next(Token::Comma)? {
            let name = self.str_check_name()?;
            self.fs_mut().new_local(name)?;
            nvars += 1;
        }

        self.check_next(Token::In)?;
        // The loop instructions belong to the line the iterator list starts on.
        let position = self.lexer.position();
        let (mut e, nexps) = self.exp_list()?;
        self.adjust_assign(3, nexps, &mut e)?;
        // The generator call needs room for its function and two arguments.
        self.fs_mut().check_stack(3)?;

        self.for_body(base, position, nvars, false)
    }

    fn exp1(&mut self) -> ParseResult {
        let mut e = self.expression()?;
        self.fs_mut().exp_to_next_reg(&mut e)?;
        Ok(())
    }

    fn for_body(&mut self, base: u32, position: Position, nvars: u32, numeric: bool) -> ParseResult {
        self.fs_mut().adjust_local_vars(3);
        self.check_next(Token::Do)?;

        let fs = self.fs_mut();
        let prep = if numeric {
            JumpList::single(fs.code_asbx_at(OpCode::ForPrep, base, fs.last_position))
        } else {
            fs.jump()
        };

        self.enter_block(false);
        let fs = self.fs_mut();
        fs.adjust_local_vars(nvars);
        fs.reserve_regs(nvars)?;
        self.block()?;
        self.leave_block()?;

        let fs = self.fs_mut();
        let prep_pc = match prep.0 {
            Some(pc) => pc,
            None => unreachable!("loop prologue emits a jump"),
        };
        fs.patch_to_here(prep);
        let end_for = if numeric {
            fs.code_asbx_at(OpCode::ForLoop, base, position)
        } else {
            fs.code_abc_at(OpCode::TForCall, base, 0, nvars, position);
            fs.code_asbx_at(OpCode::TForLoop, base + 2, position)
        };
        fs.patch_list(JumpList::single(end_for), prep_pc + 1);
        Ok(())
    }
}
