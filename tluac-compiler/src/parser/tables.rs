use tluac_bytecode::{
    instruction::LFIELDS_PER_FLUSH,
    OpCode,
};
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

/// State of a table constructor being parsed.
struct Constructor {
    /// The table, in a fixed register.
    table: u32,
    /// Last list item read, not yet stored.
    pending: ExpDesc,
    /// List items so far.
    array: u32,
    /// Record items so far.
    hash: u32,
    /// List items waiting for a `SETLIST`.
    to_store: u32,
}

impl Parser<'_> {
    /// `'{' [ field { sep field } [sep] ] '}'`
    pub(super) fn constructor(&mut self) -> ParseResult<ExpDesc> {
        let line = self.lexer.line();
        let position = self.lexer.position();
        let fs = self.fs_mut();
        let pc = fs.code_abc(OpCode::NewTable, 0, 0, 0);
        let mut t = ExpDesc::new(ExpKind::Relocable(pc), position);
        let table = fs.exp_to_next_reg(&mut t)?;

        let mut cc = Constructor {
            table,
            pending: ExpDesc::void(),
            array: 0,
            hash: 0,
            to_store: 0,
        };

        self.check_next(Token::LBrace)?;
        loop {
            if self.lexer.token() == Token::RBrace {
                break;
            }
            self.close_list_field(&mut cc)?;
            self.field(&mut cc)?;
            if !(self.test_next(Token::Comma)? || self.test_next(Token::Semicolon)?) {
                break;
            }
        }
        self.check_match(Token::RBrace, Token::LBrace, line)?;
        self.last_list_field(&mut cc)?;

        let new_table = self.fs_mut().instruction_mut(pc);
        new_table.set_b(int_to_fb(cc.array));
        new_table.set_c(int_to_fb(cc.hash));
        Ok(t)
    }

    fn field(&mut self, cc: &mut Constructor) -> ParseResult {
        match self.lexer.token() {
            Token::Name(_) => {
                if self.lexer.lookahead()? == Token::Assign {
                    self.record_field(cc)
                } else {
                    self.list_field(cc)
                }
            }
            Token::LBracket => self.record_field(cc),
            _ => self.list_field(cc),
        }
    }

    /// `(NAME | '[' exp ']') '=' exp`
    fn record_field(&mut self, cc: &mut Constructor) -> ParseResult {
        let reg = self.fs().free_reg;
        let mut key = if let Token::Name(_) = self.lexer.token() {
            self.fs()
                .check_limit(cc.hash as usize, i32::MAX as u32, "items in a constructor")?;
            self.check_name()?
        } else {
            self.yindex()?
        };
        cc.hash += 1;
        self.check_next(Token::Assign)?;

        let rk_key = self.fs_mut().exp_to_rk(&mut key)?;
        let mut value = self.expression()?;
        let fs = self.fs_mut();
        let rk_value = fs.exp_to_rk(&mut value)?;
        fs.code_abc(OpCode::SetTable, cc.table, rk_key, rk_value);
        fs.free_reg = reg;
        Ok(())
    }

    fn list_field(&mut self, cc: &mut Constructor) -> ParseResult {
        cc.pending = self.expression()?;
        self.fs()
            .check_limit(cc.array as usize, i32::MAX as u32, "items in a constructor")?;
        cc.array += 1;
        cc.to_store += 1;
        Ok(())
    }

    /// Moves the pending list item to its register, flushing a full batch.
    fn close_list_field(&mut self, cc: &mut Constructor) -> ParseResult {
        if cc.pending.kind == ExpKind::Void {
            return Ok(());
        }

        let fs = self.fs_mut();
        fs.exp_to_next_reg(&mut cc.pending)?;
        cc.pending = ExpDesc::void();
        if cc.to_store == LFIELDS_PER_FLUSH {
            fs.set_list(cc.table, cc.array, cc.to_store as i32)?;
            cc.to_store = 0;
        }
        Ok(())
    }

    /// Stores the remaining list items. A trailing call or `...` contributes
    /// all of its values.
    fn last_list_field(&mut self, cc: &mut Constructor) -> ParseResult {
        if cc.to_store == 0 {
            return Ok(());
        }

        let fs = self.fs_mut();
        if cc.pending.kind.has_multi_ret() {
            fs.set_multi_ret(&mut cc.pending)?;
            fs.set_list(cc.table, cc.array, MULTRET)?;
            // The open call is not counted in the array size hint.
            cc.array -= 1;
        } else {
            if cc.pending.kind != ExpKind::Void {
                fs.exp_to_next_reg(&mut cc.pending)?;
            }
            fs.set_list(cc.table, cc.array, cc.to_store as i32)?;
        }
        Ok(())
    }
}

/// Encodes `x` as the "floating point byte" used for table size hints:
/// `eeeeexxx`, meaning `(1xxx) * 2^(eeeee - 1)` when `eeeee` is non-zero and
/// `xxx` otherwise. Rounds up.
pub(crate) fn int_to_fb(mut x: u32) -> u32 {
    if x < 8 {
        return x;
    }

    let mut e = 0;
    while x >= 0x10 {
        x = (x + 1) >> 1;
        e += 1;
    }
    ((e + 1) << 3) | (x - 8)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::int_to_fb;

    fn fb_to_int(x: u32) -> u32 {
        let e = (x >> 3) & 0x1f;
        if e == 0 {
            x
        } else {
            ((x & 7) + 8) << (e - 1)
        }
    }

    #[test]
    fn small_sizes_are_exact() {
        for x in 0..16 {
            assert_eq!(fb_to_int(int_to_fb(x)), x);
        }
    }

    #[test]
    fn large_sizes_round_up() {
        assert_eq!(int_to_fb(17), 0x11);
        assert_eq!(fb_to_int(int_to_fb(17)), 18);
        assert_eq!(fb_to_int(int_to_fb(100)), 104);
        assert!(fb_to_int(int_to_fb(1000)) >= 1000);
    }
}
