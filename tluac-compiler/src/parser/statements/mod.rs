use tluac_bytecode::OpCode;
use tluac_lexer::Token;

use super::{
    ParseResult,
    Parser,
};
use crate::{
    expdesc::{
        ExpDesc,
        ExpKind,
    },
    func_state::MULTRET,
};

mod assignment;
mod if_statement;
mod labels;
mod loops;

impl Parser<'_> {
    /// Parses statements up to the end of the enclosing block. A `return` must
    /// be the last one.
    pub(super) fn statement_list(&mut self) -> ParseResult {
        while !self.block_follow(true) {
            if self.lexer.token() == Token::Return {
                return self.statement();
            }
            self.statement()?;
        }
        Ok(())
    }

    pub(super) fn statement(&mut self) -> ParseResult {
        let line = self.lexer.line();
        self.enter_level()?;

        match self.lexer.token() {
            Token::Semicolon => self.next()?,
            Token::If => self.if_stat(line)?,
            Token::While => self.while_stat(line)?,
            Token::Do => {
                self.next()?;
                self.block()?;
                self.check_match(Token::End, Token::Do, line)?;
            }
            Token::For => self.for_stat(line)?,
            Token::Repeat => self.repeat_stat(line)?,
            Token::Function => self.func_stat()?,
            Token::Local => {
                self.next()?;
                if self.test_next(Token::Function)? {
                    self.local_func()?;
                } else {
                    self.local_stat()?;
                }
            }
            Token::DoubleColon => {
                self.next()?;
                let name = self.str_check_name()?;
                self.label_stat(name, line)?;
            }
            Token::Return => {
                self.next()?;
                self.return_stat()?;
            }
            Token::Break => {
                let jumps = self.fs_mut().jump();
                self.break_stat(jumps)?;
            }
            Token::Name(_) if self.is_goto()? => {
                let jumps = self.fs_mut().jump();
                self.goto_stat(jumps)?;
            }
            _ => self.expr_stat()?,
        }

        let fs = self.fs_mut();
        debug_assert!(fs.free_reg >= fs.nactvar);
        fs.free_reg = fs.nactvar;
        self.leave_level();
        Ok(())
    }

    fn expr_stat(&mut self) -> ParseResult {
        let v = self.suffixed_exp()?;
        if matches!(self.lexer.token(), Token::Assign | Token::Comma) {
            let mut targets = vec![v];
            return self.assignment(&mut targets);
        }

        match v.kind {
            ExpKind::Call(pc) => {
                // Statement calls discard their results.
                self.fs_mut().instruction_mut(pc).set_c(1);
                Ok(())
            }
            _ => Err(self.lexer.syntax_error("syntax error").into()),
        }
    }

    fn local_stat(&mut self) -> ParseResult {
        let mut nvars = 0;
        loop {
            let name = self.str_check_name()?;
            self.fs_mut().new_local(name)?;
            nvars += 1;
            if !self.test_next(Token::Comma)? {
                break;
            }
        }

        let (mut e, nexps) = if self.test_next(Token::Assign)? {
            self.exp_list()?
        } else {
            (ExpDesc::void(), 0)
        };
        self.adjust_assign(nvars, nexps, &mut e)?;
        self.fs_mut().adjust_local_vars(nvars);
        Ok(())
    }

    /// `local function f` is visible inside its own body.
    fn local_func(&mut self) -> ParseResult {
        let name = self.str_check_name()?;
        let fs = self.fs_mut();
        fs.new_local(name)?;
        fs.adjust_local_vars(1);

        let line = self.lexer.line();
        let b = self.body(false, line)?;

        let fs = self.fs_mut();
        let reg = match b.kind {
            ExpKind::NonReloc(reg) => reg,
            kind => unreachable!("closure left in {kind:?}"),
        };
        // Debug information only sees the variable once the closure exists.
        let pc = fs.pc();
        fs.local_at_mut(reg).start_pc = pc;
        Ok(())
    }

    fn func_stat(&mut self) -> ParseResult {
        let position = self.lexer.position();
        self.next()?;

        let (v, is_method) = self.func_name()?;
        let mut b = self.body(is_method, position.line)?;
        let fs = self.fs_mut();
        fs.store_var(&v, &mut b)?;
        fs.fix_position(position);
        Ok(())
    }

    /// `Name {'.' Name} [':' Name]`
    fn func_name(&mut self) -> ParseResult<(ExpDesc, bool)> {
        let mut v = self.single_var()?;
        while self.lexer.token() == Token::Dot {
            self.field_sel(&mut v)?;
        }

        let is_method = self.lexer.token() == Token::Colon;
        if is_method {
            self.field_sel(&mut v)?;
        }
        Ok((v, is_method))
    }

    fn return_stat(&mut self) -> ParseResult {
        let (first, nret) = if self.block_follow(true) || self.lexer.token() == Token::Semicolon {
            (0, 0)
        } else {
            let (mut e, nexps) = self.exp_list()?;
            let fs = self.fs_mut();
            if e.kind.has_multi_ret() {
                fs.set_multi_ret(&mut e)?;
                if let (ExpKind::Call(pc), 1) = (e.kind, nexps) {
                    fs.instruction_mut(pc).set_op(OpCode::TailCall);
                    debug_assert_eq!(fs.instruction(pc).a(), fs.nactvar);
                }
                (fs.nactvar, MULTRET)
            } else if nexps == 1 {
                (fs.exp_to_any_reg(&mut e)?, 1)
            } else {
                fs.exp_to_next_reg(&mut e)?;
                let first = fs.nactvar;
                debug_assert_eq!(nexps, fs.free_reg - first);
                (first, nexps as i32)
            }
        };

        self.fs_mut().ret(first, nret);
        self.test_next(Token::Semicolon)?;
        Ok(())
    }

    /// Makes `nexps` values in `e` fill exactly `nvars` registers, padding
    /// with nil or dropping extras.
    pub(super) fn adjust_assign(&mut self, nvars: u32, nexps: u32, e: &mut ExpDesc) -> ParseResult {
        let fs = self.fs_mut();
        let mut extra = nvars as i32 - nexps as i32;

        if e.kind.has_multi_ret() {
            extra = (extra + 1).max(0);
            fs.set_returns(e, extra)?;
            if extra > 1 {
                fs.reserve_regs(extra as u32 - 1)?;
            }
        } else {
            if e.kind != ExpKind::Void {
                fs.exp_to_next_reg(e)?;
            }
            if extra > 0 {
                let reg = fs.free_reg;
                fs.reserve_regs(extra as u32)?;
                fs.nil(reg, extra as u32);
            }
        }

        if nexps > nvars {
            fs.free_reg -= nexps - nvars;
        }
        Ok(())
    }
}
