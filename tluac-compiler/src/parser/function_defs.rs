use tluac_lexer::Token;

use super::{
    ParseResult,
    Parser,
};
use crate::expdesc::ExpDesc;

impl Parser<'_> {
    /// `'(' parlist ')' block END`, compiled into a child prototype. Leaves the
    /// closure in the next free register of the enclosing function.
    pub(super) fn body(&mut self, is_method: bool, line: u32) -> ParseResult<ExpDesc> {
        let position = self.lexer.position();
        self.open_func(line)?;
        self.check_next(Token::LParen)?;
        if is_method {
            self.new_local_literal("self")?;
            self.fs_mut().adjust_local_vars(1);
        }
        self.par_list()?;
        self.check_next(Token::RParen)?;

        self.statement_list()?;
        let last_line = self.lexer.line();
        self.fs_mut().last_line_defined = last_line;
        self.check_match(Token::End, Token::Function, line)?;

        let proto = self.close_func()?;
        self.code_closure(proto, position)
    }

    fn par_list(&mut self) -> ParseResult {
        let mut nparams = 0;
        if self.lexer.token() != Token::RParen {
            loop {
                match self.lexer.token() {
                    Token::Name(name) => {
                        self.next()?;
                        self.fs_mut().new_local(name)?;
                        nparams += 1;
                    }
                    Token::Dots => {
                        self.next()?;
                        self.fs_mut().is_vararg = true;
                    }
                    _ => {
                        return Err(self
                            .lexer
                            .syntax_error("<name> or '...' expected")
                            .into())
                    }
                }

                if self.fs().is_vararg || !self.test_next(Token::Comma)? {
                    break;
                }
            }
        }

        let fs = self.fs_mut();
        fs.adjust_local_vars(nparams);
        fs.num_params = fs.nactvar;
        fs.reserve_regs(fs.nactvar)?;
        Ok(())
    }
}
