use tluac_lexer::Token;

use crate::{
    expdesc::JumpList,
    parser::{
        ParseResult,
        Parser,
    },
};

impl Parser<'_> {
    pub(super) fn if_stat(&mut self, line: u32) -> ParseResult {
        let mut escape = JumpList::EMPTY;
        self.test_then_block(&mut escape)?;
        while self.lexer.token() == Token::ElseIf {
            self.test_then_block(&mut escape)?;
        }
        if self.test_next(Token::Else)? {
            self.block()?;
        }
        self.check_match(Token::End, Token::If, line)?;
        self.fs_mut().patch_to_here(escape);
        Ok(())
    }

    /// `[if | elseif] cond then block`. Jumps leaving the whole statement are
    /// collected in `escape`.
    fn test_then_block(&mut self, escape: &mut JumpList) -> ParseResult {
        self.next()?;
        let mut v = self.expression()?;
        self.check_next(Token::Then)?;

        let is_break = self.lexer.token() == Token::Break;
        let jump_false = if is_break || self.is_goto()? {
            // `if cond then break end` jumps straight out on a true condition.
            self.fs_mut().go_if_false(&mut v)?;
            self.enter_block(false);
            if is_break {
                self.break_stat(v.t)?;
            } else {
                self.goto_stat(v.t)?;
            }
            while self.test_next(Token::Semicolon)? {}

            if self.block_follow(false) {
                return self.leave_block();
            }
            self.fs_mut().jump()
        } else {
            self.fs_mut().go_if_true(&mut v)?;
            self.enter_block(false);
            v.f
        };

        self.statement_list()?;
        self.leave_block()?;
        if matches!(self.lexer.token(), Token::Else | Token::ElseIf) {
            let fs = self.fs_mut();
            let j = fs.jump();
            fs.concat(escape, j);
        }
        self.fs_mut().patch_to_here(jump_false);
        Ok(())
    }
}
