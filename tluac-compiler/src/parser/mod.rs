//! Single-pass recursive descent parser.
//!
//! The parser never builds a syntax tree. Each construct is turned into code
//! as soon as it is recognised, by driving the [`FuncState`] of the function
//! currently being parsed. Nested function bodies push a new state onto
//! `funcs` and pop it into a finished [`Prototype`] when their `end` is
//! reached.

use derive_more::From;
use tluac_bytecode::{
    instruction::MAXARG_BX,
    OpCode,
    Prototype,
};
use tluac_lexer::{
    ChunkName,
    Lexer,
    Position,
    SyntaxError,
    Token,
};
use tluac_strings::Symbol;
use tracing::trace;

use crate::{
    expdesc::{
        ExpDesc,
        ExpKind,
        JumpList,
    },
    func_state::{
        BlockCnt,
        CodegenError,
        FuncState,
    },
};

mod expressions;
mod function_defs;
mod statements;
mod tables;

/// Nesting depth of statements and expressions.
const MAX_LEVELS: u32 = 200;

/// Labels plus pending gotos alive at once.
const MAX_LABELS: u32 = i16::MAX as u32;

/// Boxed so that every `ParseResult` in the recursive descent stays small.
#[derive(Debug, From)]
pub(crate) enum ParseError {
    #[from(ignore)]
    Syntax(Box<SyntaxError>),
    Codegen(CodegenError),
}

impl From<SyntaxError> for ParseError {
    fn from(err: SyntaxError) -> Self {
        ParseError::Syntax(Box::new(err))
    }
}

pub(crate) type ParseResult<T = ()> = Result<T, ParseError>;

/// A label visible in the current block or one of its parents.
#[derive(Debug, Clone, Copy)]
struct Label {
    name: Symbol,
    pc: usize,
    line: u32,
    /// Active locals at the label.
    nactvar: u32,
}

/// A `goto` or `break` that has not found its label yet.
#[derive(Debug, Clone, Copy)]
struct PendingGoto {
    name: Symbol,
    jumps: JumpList,
    line: u32,
    /// Active locals at the jump.
    nactvar: u32,
}

pub(crate) struct Parser<'src> {
    lexer: Lexer<'src>,
    chunk: ChunkName,
    /// Functions being compiled, innermost last.
    funcs: Vec<FuncState>,
    labels: Vec<Label>,
    gotos: Vec<PendingGoto>,
    levels: u32,

    env_name: Symbol,
    break_name: Symbol,
    goto_name: Symbol,
}

impl<'src> Parser<'src> {
    pub(crate) fn new(mut lexer: Lexer<'src>, chunk: ChunkName) -> Self {
        let strings = lexer.strings_mut();
        let env_name = strings.intern("_ENV");
        let break_name = strings.intern("break");
        let goto_name = strings.intern("goto");

        Self {
            lexer,
            chunk,
            funcs: vec![],
            labels: vec![],
            gotos: vec![],
            levels: 0,
            env_name,
            break_name,
            goto_name,
        }
    }

    /// Compiles the whole chunk into its main function.
    pub(crate) fn parse(mut self) -> Result<Prototype, SyntaxError> {
        match self.main_function() {
            Ok(proto) => Ok(proto),
            Err(ParseError::Syntax(err)) => Err(*err),
            Err(ParseError::Codegen(err)) if err.is_limit() => {
                Err(self.lexer.error(err.to_string()))
            }
            Err(ParseError::Codegen(err)) => Err(self.lexer.syntax_error(err.to_string())),
        }
    }

    fn main_function(&mut self) -> ParseResult<Prototype> {
        self.open_func(0)?;
        self.fs_mut().is_vararg = true;
        let env = self.env_name;
        self.fs_mut().new_upvalue(env, ExpKind::Local(0))?;

        self.next()?;
        self.statement_list()?;
        self.check(Token::Eof)?;
        self.close_func()
    }

    // Functions

    fn fs(&self) -> &FuncState {
        match self.funcs.last() {
            Some(fs) => fs,
            None => unreachable!("no function is open"),
        }
    }

    fn fs_mut(&mut self) -> &mut FuncState {
        match self.funcs.last_mut() {
            Some(fs) => fs,
            None => unreachable!("no function is open"),
        }
    }

    fn open_func(&mut self, line_defined: u32) -> ParseResult {
        let parent = self.funcs.len().checked_sub(1);
        if let Some(parent) = parent.map(|index| &self.funcs[index]) {
            parent.check_limit(parent.children.len(), MAXARG_BX, "functions")?;
        }

        trace!(line_defined, depth = self.funcs.len(), "open function");
        self.funcs.push(FuncState::new(
            parent,
            line_defined,
            self.lexer.last_position(),
        ));
        self.enter_block(false);
        Ok(())
    }

    fn close_func(&mut self) -> ParseResult<Prototype> {
        self.fs_mut().final_return();
        self.leave_block()?;
        self.fs().check_jumps()?;

        let fs = match self.funcs.pop() {
            Some(fs) => fs,
            None => unreachable!("no function is open"),
        };
        debug_assert!(fs.blocks.is_empty());
        let proto = fs.into_prototype(self.lexer.strings(), &self.chunk);

        if let Some(parent) = self.funcs.last_mut() {
            parent.last_position = self.lexer.last_position();
        }
        trace!(
            line_defined = proto.line_defined,
            instructions = proto.code.len(),
            constants = proto.constants.len(),
            "close function"
        );
        Ok(proto)
    }

    /// Emits the `CLOSURE` for a finished child prototype.
    fn code_closure(&mut self, proto: Prototype, position: Position) -> ParseResult<ExpDesc> {
        let fs = self.fs_mut();
        fs.children.push(proto);
        let index = fs.children.len() as u32 - 1;
        let pc = fs.code_abx(OpCode::Closure, 0, index);
        let mut e = ExpDesc::new(ExpKind::Relocable(pc), position);
        fs.exp_to_next_reg(&mut e)?;
        Ok(e)
    }

    // Tokens

    fn next(&mut self) -> ParseResult {
        self.lexer.next_token()?;
        let last_position = self.lexer.last_position();
        if let Some(fs) = self.funcs.last_mut() {
            fs.last_position = last_position;
        }
        Ok(())
    }

    fn test_next(&mut self, token: Token) -> ParseResult<bool> {
        if self.lexer.token() == token {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn error_expected(&self, token: Token) -> ParseError {
        self.lexer.syntax_error(format!("{token} expected")).into()
    }

    fn check(&self, token: Token) -> ParseResult {
        if self.lexer.token() == token {
            Ok(())
        } else {
            Err(self.error_expected(token))
        }
    }

    fn check_next(&mut self, token: Token) -> ParseResult {
        self.check(token)?;
        self.next()
    }

    /// Expects `what` closing the `who` opened at `line`.
    fn check_match(&mut self, what: Token, who: Token, line: u32) -> ParseResult {
        if self.test_next(what)? {
            return Ok(());
        }

        if line == self.lexer.line() {
            Err(self.error_expected(what))
        } else {
            Err(self
                .lexer
                .syntax_error(format!("{what} expected (to close {who} at line {line})"))
                .into())
        }
    }

    fn str_check_name(&mut self) -> ParseResult<Symbol> {
        match self.lexer.token() {
            Token::Name(name) => {
                self.next()?;
                Ok(name)
            }
            _ => Err(self.lexer.syntax_error("<name> expected").into()),
        }
    }

    fn block_follow(&self, with_until: bool) -> bool {
        match self.lexer.token() {
            Token::Else | Token::ElseIf | Token::End | Token::Eof => true,
            Token::Until => with_until,
            _ => false,
        }
    }

    fn enter_level(&mut self) -> ParseResult {
        self.levels += 1;
        self.fs()
            .check_limit(self.levels as usize, MAX_LEVELS, "syntax levels")?;
        Ok(())
    }

    fn leave_level(&mut self) {
        self.levels -= 1;
    }

    // Variables

    fn new_local_literal(&mut self, name: &str) -> ParseResult {
        let name = self.lexer.strings_mut().intern(name);
        self.fs_mut().new_local(name)?;
        Ok(())
    }

    /// Resolves `name` in the function at `index` and its parents. `None`
    /// means the name is global.
    fn single_var_aux(
        &mut self,
        index: Option<usize>,
        name: Symbol,
        base: bool,
    ) -> ParseResult<Option<ExpKind>> {
        let index = match index {
            Some(index) => index,
            None => return Ok(None),
        };

        if let Some(reg) = self.funcs[index].search_var(name) {
            if !base {
                self.funcs[index].mark_upvalue(reg);
            }
            return Ok(Some(ExpKind::Local(reg)));
        }

        let upvalue = match self.funcs[index].search_upvalue(name) {
            Some(upvalue) => upvalue,
            None => {
                let parent = self.funcs[index].parent;
                match self.single_var_aux(parent, name, false)? {
                    Some(source) => self.funcs[index].new_upvalue(name, source)?,
                    None => return Ok(None),
                }
            }
        };
        Ok(Some(ExpKind::Upvalue(upvalue)))
    }

    /// Parses a variable name. Globals become `_ENV[name]`.
    fn single_var(&mut self) -> ParseResult<ExpDesc> {
        let position = self.lexer.position();
        let name = self.str_check_name()?;
        let current = Some(self.funcs.len() - 1);

        if let Some(kind) = self.single_var_aux(current, name, true)? {
            return Ok(ExpDesc::new(kind, position));
        }

        let env = match self.single_var_aux(current, self.env_name, true)? {
            Some(env) => env,
            None => unreachable!("_ENV is always in scope"),
        };
        let mut var = ExpDesc::new(env, position);
        let mut key = self.code_string(name, position)?;
        self.fs_mut().indexed(&mut var, &mut key)?;
        Ok(var)
    }

    // Blocks

    fn enter_block(&mut self, is_loop: bool) {
        let first_label = self.labels.len();
        let first_goto = self.gotos.len();
        let fs = self.fs_mut();
        debug_assert_eq!(fs.free_reg, fs.nactvar);
        let nactvar = fs.nactvar;
        fs.blocks.push(BlockCnt {
            first_label,
            first_goto,
            nactvar,
            upval: false,
            is_loop,
        });
    }

    fn leave_block(&mut self) -> ParseResult {
        let bl = match self.fs().blocks.last() {
            Some(bl) => *bl,
            None => unreachable!("no block is open"),
        };
        let has_parent = self.fs().blocks.len() > 1;

        if has_parent && bl.upval {
            let fs = self.fs_mut();
            let j = fs.jump();
            fs.patch_close(j, bl.nactvar);
            fs.patch_to_here(j);
        }

        if bl.is_loop {
            self.break_label()?;
        }

        let fs = self.fs_mut();
        fs.blocks.pop();
        fs.remove_vars(bl.nactvar);
        debug_assert_eq!(bl.nactvar, fs.nactvar);
        fs.free_reg = fs.nactvar;
        self.labels.truncate(bl.first_label);

        if has_parent {
            self.move_gotos_out(bl)?;
        } else if bl.first_goto < self.gotos.len() {
            return Err(self.undefined_goto(self.gotos[bl.first_goto]));
        }
        Ok(())
    }

    fn block(&mut self) -> ParseResult {
        self.enter_block(false);
        self.statement_list()?;
        self.leave_block()
    }

    // Labels and gotos

    fn undefined_goto(&self, goto: PendingGoto) -> ParseError {
        let message = if goto.name == self.break_name {
            format!("break outside loop at line {}", goto.line)
        } else {
            format!(
                "no visible label '{}' for <goto> at line {}",
                self.lexer.strings().get(goto.name),
                goto.line
            )
        };
        SyntaxError {
            line: goto.line,
            ..self.lexer.error(message)
        }
        .into()
    }

    fn current_block(&self) -> BlockCnt {
        match self.fs().blocks.last() {
            Some(bl) => *bl,
            None => unreachable!("no block is open"),
        }
    }

    /// Patches the pending goto at `index` to `label` and forgets it.
    fn close_goto(&mut self, index: usize, label: Label) -> ParseResult {
        let goto = self.gotos[index];
        debug_assert!(goto.name == label.name);

        if goto.nactvar < label.nactvar {
            let local = self.fs().local_at(goto.nactvar).name;
            let message = format!(
                "<goto {}> at line {} jumps into the scope of local '{}'",
                self.lexer.strings().get(goto.name),
                goto.line,
                self.lexer.strings().get(local),
            );
            return Err(SyntaxError {
                line: goto.line,
                ..self.lexer.error(message)
            }
            .into());
        }

        self.fs_mut().patch_list(goto.jumps, label.pc);
        self.gotos.remove(index);
        Ok(())
    }

    /// Tries to resolve the pending goto at `index` against the labels of the
    /// current block.
    fn find_label(&mut self, index: usize) -> ParseResult<bool> {
        let bl = self.current_block();
        let goto = self.gotos[index];

        let label = match self.labels[bl.first_label..]
            .iter()
            .find(|label| label.name == goto.name)
        {
            Some(label) => *label,
            None => return Ok(false),
        };

        if goto.nactvar > label.nactvar {
            self.fs_mut().patch_close(goto.jumps, label.nactvar);
        }
        self.close_goto(index, label)?;
        Ok(true)
    }

    fn new_label(&mut self, name: Symbol, line: u32, pc: usize) -> ParseResult<usize> {
        self.fs().check_limit(
            self.labels.len() + self.gotos.len() + 1,
            MAX_LABELS,
            "labels/gotos",
        )?;
        let nactvar = self.fs().nactvar;
        self.labels.push(Label {
            name,
            pc,
            line,
            nactvar,
        });
        Ok(self.labels.len() - 1)
    }

    fn new_goto(&mut self, name: Symbol, line: u32, jumps: JumpList) -> ParseResult<usize> {
        self.fs().check_limit(
            self.labels.len() + self.gotos.len() + 1,
            MAX_LABELS,
            "labels/gotos",
        )?;
        let nactvar = self.fs().nactvar;
        self.gotos.push(PendingGoto {
            name,
            jumps,
            line,
            nactvar,
        });
        Ok(self.gotos.len() - 1)
    }

    /// Resolves pending gotos of the current block that target the label at
    /// `label`.
    fn find_gotos(&mut self, label: usize) -> ParseResult {
        let label = self.labels[label];
        let mut i = self.current_block().first_goto;
        while i < self.gotos.len() {
            if self.gotos[i].name == label.name {
                self.close_goto(i, label)?;
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    /// Moves the pending gotos of a block that just closed into the enclosing
    /// block, closing upvalues when they leave the scope of captured locals.
    fn move_gotos_out(&mut self, bl: BlockCnt) -> ParseResult {
        let mut i = bl.first_goto;
        while i < self.gotos.len() {
            if self.gotos[i].nactvar > bl.nactvar {
                if bl.upval {
                    let jumps = self.gotos[i].jumps;
                    self.fs_mut().patch_close(jumps, bl.nactvar);
                }
                self.gotos[i].nactvar = bl.nactvar;
            }
            if !self.find_label(i)? {
                i += 1;
            }
        }
        Ok(())
    }

    /// Creates the implicit `break` label at the end of a loop.
    fn break_label(&mut self) -> ParseResult {
        let pc = self.fs().pc();
        let label = self.new_label(self.break_name, 0, pc)?;
        self.find_gotos(label)
    }

    /// Fails if `name` is already a label visible in this function.
    fn check_repeated(&self, name: Symbol) -> ParseResult {
        let first = match self.fs().blocks.first() {
            Some(bl) => bl.first_label,
            None => unreachable!("no block is open"),
        };

        match self.labels[first..].iter().find(|label| label.name == name) {
            Some(label) => {
                let message = format!(
                    "label '{}' already defined on line {}",
                    self.lexer.strings().get(name),
                    label.line
                );
                Err(self.lexer.error(message).into())
            }
            None => Ok(()),
        }
    }
}
