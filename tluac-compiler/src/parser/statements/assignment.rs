use tluac_bytecode::OpCode;
use tluac_lexer::Token;

use crate::{
    expdesc::{
        ExpDesc,
        ExpKind,
        TableKind,
    },
    parser::{
        ParseResult,
        Parser,
        MAX_LEVELS,
    },
};

impl Parser<'_> {
    /// Parses the rest of `targets = exps`. The last entry of `targets` is the
    /// target just parsed; earlier ones are to its left.
    pub(super) fn assignment(&mut self, targets: &mut Vec<ExpDesc>) -> ParseResult {
        let nvars = targets.len() as u32;
        if !targets[targets.len() - 1].kind.is_var() {
            return Err(self.lexer.syntax_error("syntax error").into());
        }

        if self.test_next(Token::Comma)? {
            let next = self.suffixed_exp()?;
            if !matches!(next.kind, ExpKind::Indexed { .. }) {
                self.check_conflict(targets, &next)?;
            }
            self.fs().check_limit(
                (nvars + self.levels) as usize,
                MAX_LEVELS,
                "syntax levels",
            )?;

            targets.push(next);
            self.assignment(targets)?;
            targets.pop();
        } else {
            self.check_next(Token::Assign)?;
            let (mut e, nexps) = self.exp_list()?;
            if nexps == nvars {
                let fs = self.fs_mut();
                fs.set_one_ret(&mut e);
                let target = targets[targets.len() - 1];
                fs.store_var(&target, &mut e)?;
                return Ok(());
            }
            self.adjust_assign(nvars, nexps, &mut e)?;
        }

        // Values sit on top of the stack; take the last one.
        let target = targets[targets.len() - 1];
        let fs = self.fs_mut();
        let mut e = ExpDesc::new(ExpKind::NonReloc(fs.free_reg - 1), target.position);
        fs.store_var(&target, &mut e)?;
        Ok(())
    }

    /// In `a[i], i = ...` the store to `i` happens before the store to `a[i]`.
    /// When `v` is a table or index register used by an earlier target, that
    /// target is redirected to a copy taken now.
    fn check_conflict(&mut self, targets: &mut [ExpDesc], v: &ExpDesc) -> ParseResult {
        let fs = self.fs_mut();
        let extra = fs.free_reg;
        let mut conflict = false;

        for target in targets.iter_mut() {
            if let ExpKind::Indexed {
                table,
                key,
                table_kind,
            } = &mut target.kind
            {
                let same_table = match (v.kind, *table_kind) {
                    (ExpKind::Local(reg), TableKind::Local) => *table == reg,
                    (ExpKind::Upvalue(index), TableKind::Upvalue) => *table == index,
                    _ => false,
                };
                if same_table {
                    conflict = true;
                    *table_kind = TableKind::Local;
                    *table = extra;
                }

                if let ExpKind::Local(reg) = v.kind {
                    if *key == reg {
                        conflict = true;
                        *key = extra;
                    }
                }
            }
        }

        if conflict {
            match v.kind {
                ExpKind::Local(reg) => fs.code_abc(OpCode::Move, extra, reg, 0),
                ExpKind::Upvalue(index) => fs.code_abc(OpCode::GetUpval, extra, index, 0),
                kind => unreachable!("{kind:?} cannot conflict"),
            };
            fs.reserve_regs(1)?;
        }
        Ok(())
    }
}
