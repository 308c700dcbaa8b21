use std::ops::Range;

use bstr::ByteSlice;
use logos::{
    Lexer as RawLexer,
    Logos,
};
use strum::IntoStaticStr;
use tluac_bytecode::Number;
use tluac_strings::{
    StringTable,
    Symbol,
};

use crate::{
    ChunkName,
    Position,
    SyntaxError,
};

pub mod numbers;
mod strings;

#[cfg(test)]
mod tests;

/// Lines past this count are rejected.
const MAX_LINES: u32 = i32::MAX as u32 - 2;

/// Failures detected inside a token callback. The callback bumps the lexer to
/// the point of failure so the token slice is the text reported in the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LexError {
    UnfinishedString,
    UnfinishedStringAtEof,
    MalformedNumber,
    InvalidLongDelimiter,
    NestedLongBracket,
    UnfinishedLongString,
    UnfinishedLongComment,
    HexDigitExpected,
    MissingOpenBrace,
    MissingCloseBrace,
    Utf8ValueTooLarge,
    EscapeTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Lexed<T> {
    Valid(T),
    Invalid(LexError),
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(extras = StringTable)]
pub(crate) enum RawToken {
    #[regex(br"[_A-Za-z][_A-Za-z0-9]*", |lex| lex.extras.intern(lex.slice()))]
    Name(Symbol),

    #[regex(br#"["']"#, strings::lex_string)]
    String(Lexed<Symbol>),

    #[regex(br"\[=*\[", strings::lex_long_string)]
    LongString(Lexed<Symbol>),

    /// `[=` not followed by more `=` and a second `[`.
    #[regex(br"\[=+")]
    InvalidLongDelimiter,

    #[regex(br"[0-9]", numbers::lex_numeral)]
    #[regex(br"\.[0-9]", numbers::lex_numeral)]
    Number(Lexed<Number>),

    #[regex(br"[\n\r\t\x0B\x0C ]+")]
    Whitespace,

    /// A line comment, or a long comment when a long bracket follows `--`.
    #[token(b"--", strings::lex_comment)]
    Comment(Lexed<()>),

    #[token(b"and")]
    And,
    #[token(b"break")]
    Break,
    #[token(b"do")]
    Do,
    #[token(b"else")]
    Else,
    #[token(b"elseif")]
    ElseIf,
    #[token(b"end")]
    End,
    #[token(b"false")]
    False,
    #[token(b"for")]
    For,
    #[token(b"function")]
    Function,
    #[token(b"if")]
    If,
    #[token(b"in")]
    In,
    #[token(b"local")]
    Local,
    #[token(b"nil")]
    Nil,
    #[token(b"not")]
    Not,
    #[token(b"or")]
    Or,
    #[token(b"repeat")]
    Repeat,
    #[token(b"return")]
    Return,
    #[token(b"then")]
    Then,
    #[token(b"true")]
    True,
    #[token(b"until")]
    Until,
    #[token(b"while")]
    While,

    #[token(b"..")]
    Concat,
    #[token(b"...")]
    Dots,
    #[token(b"==")]
    Eq,
    #[token(b">=")]
    Ge,
    #[token(b"<=")]
    Le,
    #[token(b"~=")]
    Ne,
    #[token(b"::")]
    DoubleColon,

    #[token(b"+")]
    Plus,
    #[token(b"-")]
    Minus,
    #[token(b"*")]
    Star,
    #[token(b"/")]
    Slash,
    #[token(b"%")]
    Percent,
    #[token(b"^")]
    Caret,
    #[token(b"#")]
    Hash,
    #[token(b"=")]
    Assign,
    #[token(b"<")]
    Lt,
    #[token(b">")]
    Gt,
    #[token(b"(")]
    LParen,
    #[token(b")")]
    RParen,
    #[token(b"{")]
    LBrace,
    #[token(b"}")]
    RBrace,
    #[token(b"[")]
    LBracket,
    #[token(b"]")]
    RBracket,
    #[token(b";")]
    Semicolon,
    #[token(b":")]
    Colon,
    #[token(b",")]
    Comma,
    #[token(b".")]
    Dot,

    #[error]
    Error,
}

/// A token as seen by the parser.
///
/// `goto` lexes as a [`Token::Name`]; the parser recognises it from context.
#[derive(Debug, Clone, Copy, PartialEq, IntoStaticStr)]
pub enum Token {
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "do")]
    Do,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "elseif")]
    ElseIf,
    #[strum(serialize = "end")]
    End,
    #[strum(serialize = "false")]
    False,
    #[strum(serialize = "for")]
    For,
    #[strum(serialize = "function")]
    Function,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "local")]
    Local,
    #[strum(serialize = "nil")]
    Nil,
    #[strum(serialize = "not")]
    Not,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "repeat")]
    Repeat,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "then")]
    Then,
    #[strum(serialize = "true")]
    True,
    #[strum(serialize = "until")]
    Until,
    #[strum(serialize = "while")]
    While,

    #[strum(serialize = "..")]
    Concat,
    #[strum(serialize = "...")]
    Dots,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "~=")]
    Ne,
    #[strum(serialize = "::")]
    DoubleColon,

    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "/")]
    Slash,
    #[strum(serialize = "%")]
    Percent,
    #[strum(serialize = "^")]
    Caret,
    #[strum(serialize = "#")]
    Hash,
    #[strum(serialize = "=")]
    Assign,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "(")]
    LParen,
    #[strum(serialize = ")")]
    RParen,
    #[strum(serialize = "{")]
    LBrace,
    #[strum(serialize = "}")]
    RBrace,
    #[strum(serialize = "[")]
    LBracket,
    #[strum(serialize = "]")]
    RBracket,
    #[strum(serialize = ";")]
    Semicolon,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ".")]
    Dot,

    #[strum(serialize = "<name>")]
    Name(Symbol),
    #[strum(serialize = "<string>")]
    String(Symbol),
    #[strum(serialize = "<number>")]
    Number(Number),
    /// Any byte that does not start a Lua token.
    #[strum(serialize = "<char>")]
    Char(u8),
    #[strum(serialize = "<eof>")]
    Eof,
}

impl Token {
    /// Whether this token closes a block.
    pub fn is_block_end(self) -> bool {
        matches!(
            self,
            Token::Else | Token::ElseIf | Token::End | Token::Until | Token::Eof
        )
    }
}

/// Tokens are displayed the way they are quoted in error messages.
impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Token::Char(c @ b' '..=b'~') => write!(f, "'{}'", c as char),
            Token::Char(c) => write!(f, "'<\\{c}>'"),
            Token::Name(_) | Token::String(_) | Token::Number(_) | Token::Eof => {
                f.write_str((*self).into())
            }
            token => write!(f, "'{}'", <&'static str>::from(token)),
        }
    }
}

impl RawToken {
    /// The parser-facing token, or `None` for trivia and malformed input.
    fn token(self) -> Option<Token> {
        Some(match self {
            RawToken::Name(name) => Token::Name(name),
            RawToken::String(Lexed::Valid(s)) | RawToken::LongString(Lexed::Valid(s)) => {
                Token::String(s)
            }
            RawToken::Number(Lexed::Valid(n)) => Token::Number(n),
            RawToken::And => Token::And,
            RawToken::Break => Token::Break,
            RawToken::Do => Token::Do,
            RawToken::Else => Token::Else,
            RawToken::ElseIf => Token::ElseIf,
            RawToken::End => Token::End,
            RawToken::False => Token::False,
            RawToken::For => Token::For,
            RawToken::Function => Token::Function,
            RawToken::If => Token::If,
            RawToken::In => Token::In,
            RawToken::Local => Token::Local,
            RawToken::Nil => Token::Nil,
            RawToken::Not => Token::Not,
            RawToken::Or => Token::Or,
            RawToken::Repeat => Token::Repeat,
            RawToken::Return => Token::Return,
            RawToken::Then => Token::Then,
            RawToken::True => Token::True,
            RawToken::Until => Token::Until,
            RawToken::While => Token::While,
            RawToken::Concat => Token::Concat,
            RawToken::Dots => Token::Dots,
            RawToken::Eq => Token::Eq,
            RawToken::Ge => Token::Ge,
            RawToken::Le => Token::Le,
            RawToken::Ne => Token::Ne,
            RawToken::DoubleColon => Token::DoubleColon,
            RawToken::Plus => Token::Plus,
            RawToken::Minus => Token::Minus,
            RawToken::Star => Token::Star,
            RawToken::Slash => Token::Slash,
            RawToken::Percent => Token::Percent,
            RawToken::Caret => Token::Caret,
            RawToken::Hash => Token::Hash,
            RawToken::Assign => Token::Assign,
            RawToken::Lt => Token::Lt,
            RawToken::Gt => Token::Gt,
            RawToken::LParen => Token::LParen,
            RawToken::RParen => Token::RParen,
            RawToken::LBrace => Token::LBrace,
            RawToken::RBrace => Token::RBrace,
            RawToken::LBracket => Token::LBracket,
            RawToken::RBracket => Token::RBracket,
            RawToken::Semicolon => Token::Semicolon,
            RawToken::Colon => Token::Colon,
            RawToken::Comma => Token::Comma,
            RawToken::Dot => Token::Dot,
            RawToken::String(Lexed::Invalid(_))
            | RawToken::LongString(Lexed::Invalid(_))
            | RawToken::Number(Lexed::Invalid(_))
            | RawToken::InvalidLongDelimiter
            | RawToken::Whitespace
            | RawToken::Comment(_)
            | RawToken::Error => return None,
        })
    }
}

/// A token together with where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub position: Position,
    pub span: Range<usize>,
}

/// Turns Lua source into [`Token`]s with one token of lookahead.
pub struct Lexer<'src> {
    raw: RawLexer<'src, RawToken>,
    chunk: String,
    line: u32,
    line_start: usize,
    /// Byte offset just past the last token read.
    cursor: usize,
    current: Lexeme,
    ahead: Option<Lexeme>,
    last_position: Position,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src [u8], chunk: &ChunkName) -> Self {
        Self::with_strings(src, chunk, StringTable::default())
    }

    pub fn with_strings(src: &'src [u8], chunk: &ChunkName, strings: StringTable) -> Self {
        Self {
            raw: RawToken::lexer_with_extras(src, strings),
            chunk: chunk.short().to_string(),
            line: 1,
            line_start: 0,
            cursor: 0,
            current: Lexeme {
                token: Token::Eof,
                position: Position::START,
                span: 0..0,
            },
            ahead: None,
            last_position: Position::START,
        }
    }

    /// Skips a leading `#` line. Must be called before the first token is
    /// read.
    pub fn skip_shebang(&mut self) {
        debug_assert_eq!(self.cursor, 0);
        let remain = self.raw.remainder();
        if remain.first() == Some(&b'#') {
            let len = remain.find_byteset(b"\r\n").unwrap_or(remain.len());
            self.raw.bump(len);
            self.cursor = len;
        }
    }

    /// Advances to the next token.
    pub fn next_token(&mut self) -> Result<(), SyntaxError> {
        self.last_position = self.cursor_position();
        self.current = match self.ahead.take() {
            Some(ahead) => ahead,
            None => self.lex()?,
        };
        Ok(())
    }

    /// Peeks at the token after the current one.
    pub fn lookahead(&mut self) -> Result<Token, SyntaxError> {
        if self.ahead.is_none() {
            self.ahead = Some(self.lex()?);
        }

        Ok(self
            .ahead
            .as_ref()
            .map(|lexeme| lexeme.token)
            .unwrap_or(Token::Eof))
    }

    pub fn token(&self) -> Token {
        self.current.token
    }

    pub fn lexeme(&self) -> &Lexeme {
        &self.current
    }

    /// Position of the first byte of the current token.
    pub fn position(&self) -> Position {
        self.current.position
    }

    /// Where the lexer stood when the current token was requested, i.e. just
    /// past the previous token.
    pub fn last_position(&self) -> Position {
        self.last_position
    }

    /// The line the lexer has read up to.
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn chunk(&self) -> &str {
        &self.chunk
    }

    pub fn strings(&self) -> &StringTable {
        &self.raw.extras
    }

    pub fn strings_mut(&mut self) -> &mut StringTable {
        &mut self.raw.extras
    }

    pub fn into_strings(self) -> StringTable {
        self.raw.extras
    }

    /// An error attributed to the current token.
    pub fn syntax_error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            chunk: self.chunk.clone(),
            line: self.line,
            column: self.current.position.column,
            message: message.into(),
            near: Some(self.near_text(&self.current)),
            span: self.current.span.clone(),
        }
    }

    /// An error that is not attributed to any token.
    pub fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            near: None,
            ..self.syntax_error(message)
        }
    }

    fn near_text(&self, lexeme: &Lexeme) -> String {
        match lexeme.token {
            Token::Name(_) | Token::String(_) | Token::Number(_) => {
                let text = self
                    .raw
                    .source()
                    .get(lexeme.span.clone())
                    .unwrap_or_default();
                format!("'{}'", text.to_str_lossy())
            }
            token => token.to_string(),
        }
    }

    fn cursor_position(&self) -> Position {
        self.position_of(self.cursor)
    }

    fn position_of(&self, offset: usize) -> Position {
        Position {
            line: self.line,
            column: (offset.saturating_sub(self.line_start) + 1) as u32,
        }
    }

    fn lex(&mut self) -> Result<Lexeme, SyntaxError> {
        loop {
            let raw = match self.raw.next() {
                Some(raw) => raw,
                None => {
                    let end = self.raw.source().len();
                    self.cursor = end;
                    return Ok(Lexeme {
                        token: Token::Eof,
                        position: self.position_of(end),
                        span: end..end,
                    });
                }
            };

            let span = self.raw.span();
            let position = self.position_of(span.start);
            self.track_lines(span.clone())?;
            self.cursor = span.end;

            let error = match raw {
                RawToken::Whitespace | RawToken::Comment(Lexed::Valid(())) => continue,
                RawToken::Error => {
                    let byte = self.raw.slice().first().copied().unwrap_or_default();
                    return Ok(Lexeme {
                        token: Token::Char(byte),
                        position,
                        span,
                    });
                }
                RawToken::InvalidLongDelimiter => LexError::InvalidLongDelimiter,
                RawToken::String(Lexed::Invalid(e))
                | RawToken::LongString(Lexed::Invalid(e))
                | RawToken::Comment(Lexed::Invalid(e))
                | RawToken::Number(Lexed::Invalid(e)) => e,
                raw => match raw.token() {
                    Some(token) => {
                        return Ok(Lexeme {
                            token,
                            position,
                            span,
                        })
                    }
                    None => unreachable!("trivia and errors are handled above"),
                },
            };

            return Err(self.lex_error(error, position, span));
        }
    }

    fn lex_error(&self, error: LexError, start: Position, span: Range<usize>) -> SyntaxError {
        let text = || {
            let text = self.raw.source().get(span.clone()).unwrap_or_default();
            format!("'{}'", text.to_str_lossy())
        };
        let eof = || "<eof>".to_string();

        let (message, near) = match error {
            LexError::UnfinishedString => ("unfinished string".to_string(), text()),
            LexError::UnfinishedStringAtEof => ("unfinished string".to_string(), eof()),
            LexError::MalformedNumber => ("malformed number".to_string(), text()),
            LexError::InvalidLongDelimiter => {
                ("invalid long string delimiter".to_string(), text())
            }
            LexError::NestedLongBracket => (
                "nesting of [[...]] is deprecated".to_string(),
                "'['".to_string(),
            ),
            LexError::UnfinishedLongString => (
                format!("unfinished long string (started at line {})", start.line),
                eof(),
            ),
            LexError::UnfinishedLongComment => (
                format!("unfinished long comment (started at line {})", start.line),
                eof(),
            ),
            LexError::HexDigitExpected => ("hexadecimal digit expected".to_string(), text()),
            LexError::MissingOpenBrace => ("missing '{'".to_string(), text()),
            LexError::MissingCloseBrace => ("missing '}'".to_string(), text()),
            LexError::Utf8ValueTooLarge => ("UTF-8 value too large".to_string(), text()),
            LexError::EscapeTooLarge => ("escape sequence too large".to_string(), text()),
        };

        SyntaxError {
            chunk: self.chunk.clone(),
            line: self.line,
            column: self.cursor_position().column,
            message,
            near: Some(near),
            span,
        }
    }

    /// Counts the line breaks in `span`. Each of `\n`, `\r`, `\r\n` and `\n\r`
    /// is a single break.
    fn track_lines(&mut self, span: Range<usize>) -> Result<(), SyntaxError> {
        let src = self.raw.source();
        let mut i = span.start;
        while i < span.end {
            let byte = src[i];
            i += 1;
            if byte != b'\n' && byte != b'\r' {
                continue;
            }

            if i < span.end && matches!(src[i], b'\n' | b'\r') && src[i] != byte {
                i += 1;
            }

            self.line += 1;
            self.line_start = i;
            if self.line >= MAX_LINES {
                return Err(SyntaxError {
                    chunk: self.chunk.clone(),
                    line: self.line,
                    column: 1,
                    message: "chunk has too many lines".to_string(),
                    near: None,
                    span: i..i,
                });
            }
        }

        Ok(())
    }
}
