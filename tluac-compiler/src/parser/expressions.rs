use tluac_bytecode::OpCode;
use tluac_lexer::{
    Position,
    Token,
};
use tluac_strings::Symbol;

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
    operators::{
        BinOpr,
        UnOpr,
        UNARY_PRIORITY,
    },
};

impl Parser<'_> {
    pub(super) fn expression(&mut self) -> ParseResult<ExpDesc> {
        self.subexpr(0).map(|(e, _)| e)
    }

    /// Parses `exp {',' exp}`. Every expression but the last is moved to the
    /// next free register; the last is returned undischarged along with the
    /// count.
    pub(super) fn exp_list(&mut self) -> ParseResult<(ExpDesc, u32)> {
        let mut n = 1;
        let mut e = self.expression()?;
        while self.test_next(Token::Comma)? {
            self.fs_mut().exp_to_next_reg(&mut e)?;
            e = self.expression()?;
            n += 1;
        }
        Ok((e, n))
    }

    /// Parses a chain of binary operators whose left priority is above
    /// `limit`. Returns the first operator that was not consumed.
    fn subexpr(&mut self, limit: u8) -> ParseResult<(ExpDesc, Option<BinOpr>)> {
        self.enter_level()?;

        let mut v = match UnOpr::from_token(self.lexer.token()) {
            Some(op) => {
                let position = self.lexer.position();
                self.next()?;
                let (mut v, _) = self.subexpr(UNARY_PRIORITY)?;
                self.fs_mut().prefix(op, &mut v, position)?;
                v
            }
            None => self.simple_exp()?,
        };

        let mut op = BinOpr::from_token(self.lexer.token());
        while let Some(current) = op.filter(|op| op.left_priority() > limit) {
            let position = self.lexer.position();
            self.next()?;
            self.fs_mut().infix(current, &mut v)?;

            let (mut v2, next) = self.subexpr(current.right_priority())?;
            self.fs_mut().posfix(current, &mut v, &mut v2, position)?;
            op = next;
        }

        self.leave_level();
        Ok((v, op))
    }

    fn simple_exp(&mut self) -> ParseResult<ExpDesc> {
        let position = self.lexer.position();
        let kind = match self.lexer.token() {
            Token::Number(n) => ExpKind::Number(n),
            Token::String(s) => {
                let e = self.code_string(s, position)?;
                self.next()?;
                return Ok(e);
            }
            Token::Nil => ExpKind::Nil,
            Token::True => ExpKind::True,
            Token::False => ExpKind::False,
            Token::Dots => {
                if !self.fs().is_vararg {
                    return Err(self
                        .lexer
                        .syntax_error("cannot use '...' outside a vararg function")
                        .into());
                }
                ExpKind::VarArg(self.fs_mut().code_abc(OpCode::VarArg, 0, 1, 0))
            }
            Token::LBrace => return self.constructor(),
            Token::Function => {
                self.next()?;
                let line = self.lexer.line();
                return self.body(false, line);
            }
            _ => return self.suffixed_exp(),
        };

        self.next()?;
        Ok(ExpDesc::new(kind, position))
    }

    /// A name or a parenthesized expression.
    fn primary_exp(&mut self) -> ParseResult<ExpDesc> {
        match self.lexer.token() {
            Token::LParen => {
                let line = self.lexer.line();
                self.next()?;
                let mut v = self.expression()?;
                self.check_match(Token::RParen, Token::LParen, line)?;
                // Parentheses truncate calls and varargs to one value.
                self.fs_mut().discharge_vars(&mut v);
                Ok(v)
            }
            Token::Name(_) => self.single_var(),
            _ => Err(self.lexer.syntax_error("unexpected symbol").into()),
        }
    }

    /// `primaryexp { '.' NAME | '[' exp ']' | ':' NAME funcargs | funcargs }`
    pub(super) fn suffixed_exp(&mut self) -> ParseResult<ExpDesc> {
        let line = self.lexer.line();
        let mut v = self.primary_exp()?;

        loop {
            match self.lexer.token() {
                Token::Dot => self.field_sel(&mut v)?,
                Token::LBracket => {
                    self.fs_mut().exp_to_any_reg_up(&mut v)?;
                    v.position = self.lexer.position();
                    let mut key = self.yindex()?;
                    self.fs_mut().indexed(&mut v, &mut key)?;
                }
                Token::Colon => {
                    let position = self.lexer.position();
                    self.next()?;
                    let mut key = self.check_name()?;
                    v.position = position;
                    self.fs_mut().self_op(&mut v, &mut key)?;
                    self.funcargs(&mut v, line)?;
                }
                Token::LParen | Token::String(_) | Token::LBrace => {
                    self.fs_mut().exp_to_next_reg(&mut v)?;
                    self.funcargs(&mut v, line)?;
                }
                _ => return Ok(v),
            }
        }
    }

    /// `'.' NAME` or `':' NAME` applied to `v`.
    pub(super) fn field_sel(&mut self, v: &mut ExpDesc) -> ParseResult {
        self.fs_mut().exp_to_any_reg_up(v)?;
        let position = self.lexer.position();
        self.next()?;
        let mut key = self.check_name()?;
        v.position = position;
        self.fs_mut().indexed(v, &mut key)?;
        Ok(())
    }

    /// `'[' exp ']'`
    pub(super) fn yindex(&mut self) -> ParseResult<ExpDesc> {
        self.next()?;
        let mut v = self.expression()?;
        self.fs_mut().exp_to_val(&mut v)?;
        self.check_next(Token::RBracket)?;
        Ok(v)
    }

    /// Call arguments for the function in `f`, which must already be in its
    /// own register. `line` is where the called expression started.
    fn funcargs(&mut self, f: &mut ExpDesc, line: u32) -> ParseResult {
        let position = self.lexer.position();
        let mut args = match self.lexer.token() {
            Token::LParen => {
                self.next()?;
                let args = if self.lexer.token() == Token::RParen {
                    ExpDesc::new(ExpKind::Void, position)
                } else {
                    let (mut args, _) = self.exp_list()?;
                    self.fs_mut().set_multi_ret(&mut args)?;
                    args
                };
                self.check_match(Token::RParen, Token::LParen, line)?;
                args
            }
            Token::LBrace => self.constructor()?,
            Token::String(s) => {
                let args = self.code_string(s, position)?;
                self.next()?;
                args
            }
            _ => {
                return Err(self
                    .lexer
                    .syntax_error("function arguments expected")
                    .into())
            }
        };

        let base = match f.kind {
            ExpKind::NonReloc(reg) => reg,
            kind => unreachable!("called expression left in {kind:?}"),
        };
        let fs = self.fs_mut();
        let nparams = if args.kind.has_multi_ret() {
            MULTRET
        } else {
            if args.kind != ExpKind::Void {
                fs.exp_to_next_reg(&mut args)?;
            }
            (fs.free_reg - (base + 1)) as i32
        };

        // Attributed to the line the called expression started on.
        let pc = fs.code_abc_at(
            OpCode::Call,
            base,
            (nparams + 1) as u32,
            2,
            Position { line, ..position },
        );
        *f = ExpDesc::new(ExpKind::Call(pc), f.position);
        // The call leaves one result in `base`.
        fs.free_reg = base + 1;
        Ok(())
    }

    pub(super) fn code_string(&mut self, s: Symbol, position: Position) -> ParseResult<ExpDesc> {
        let s = self.lexer.strings().get(s).clone();
        let k = self.fs_mut().string_k(s)?;
        Ok(ExpDesc::new(ExpKind::K(k), position))
    }

    /// A name used as a string constant.
    pub(super) fn check_name(&mut self) -> ParseResult<ExpDesc> {
        let position = self.lexer.position();
        let name = self.str_check_name()?;
        self.code_string(name, position)
    }
}
