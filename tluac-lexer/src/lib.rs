use derive_more::Display;

mod chunk;
mod errors;
pub mod lexer;

pub use chunk::ChunkName;
pub use errors::SyntaxError;
pub use lexer::{
    numbers::parse_numeral,
    Lexeme,
    Lexer,
    Token,
};

/// A 1-based source position. Columns count bytes, not characters.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "{}:{}", line, column)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const START: Position = Position { line: 1, column: 1 };
}

impl Default for Position {
    fn default() -> Self {
        Self::START
    }
}
