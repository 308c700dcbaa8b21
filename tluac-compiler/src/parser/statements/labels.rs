use tluac_lexer::{
    SyntaxError,
    Token,
};
use tluac_strings::Symbol;

use crate::{
    expdesc::JumpList,
    parser::{
        ParseResult,
        Parser,
    },
};

impl Parser<'_> {
    /// `goto` is an ordinary name unless another name follows it.
    pub(super) fn is_goto(&mut self) -> ParseResult<bool> {
        match self.lexer.token() {
            Token::Name(name) if name == self.goto_name => {
                Ok(matches!(self.lexer.lookahead()?, Token::Name(_)))
            }
            _ => Ok(false),
        }
    }

    /// `goto Name`, with the jump already emitted.
    pub(super) fn goto_stat(&mut self, jumps: JumpList) -> ParseResult {
        // The lookahead that recognised `goto` may already be on a later line.
        let line = self.lexer.position().line;
        self.next()?;
        let name = self.str_check_name()?;
        self.goto_label(name, line, jumps)
    }

    /// `break`, with the jump already emitted. It becomes a goto to the
    /// implicit label closing the innermost loop.
    pub(super) fn break_stat(&mut self, jumps: JumpList) -> ParseResult {
        let line = self.lexer.position().line;
        if !self.fs().blocks.iter().any(|bl| bl.is_loop) {
            return Err(SyntaxError {
                line,
                ..self.lexer.error(format!("break outside loop at line {line}"))
            }
            .into());
        }

        self.next()?;
        self.goto_label(self.break_name, line, jumps)
    }

    fn goto_label(&mut self, name: Symbol, line: u32, jumps: JumpList) -> ParseResult {
        let index = self.new_goto(name, line, jumps)?;
        self.find_label(index)?;
        Ok(())
    }

    /// `:: Name ::`, with the name already read.
    pub(super) fn label_stat(&mut self, name: Symbol, line: u32) -> ParseResult {
        self.check_repeated(name)?;
        self.check_next(Token::DoubleColon)?;

        let pc = self.fs_mut().get_label();
        let label = self.new_label(name, line, pc)?;

        // Other no-op statements may follow a label.
        while matches!(self.lexer.token(), Token::Semicolon | Token::DoubleColon) {
            self.statement()?;
        }

        if self.block_follow(false) {
            // Locals of the block are already dead at its end.
            let nactvar = self.current_block().nactvar;
            self.labels[label].nactvar = nactvar;
        }
        self.find_gotos(label)
    }
}
