//! Single-pass compiler from Lua source to register bytecode.
//!
//! ```
//! use tluac_compiler::compile;
//!
//! let proto = compile("return 1 + 2").unwrap();
//! assert_eq!(proto.code.len(), 2);
//! ```

use strum::{
    Display,
    EnumString,
};
use thiserror::Error;
use tluac_bytecode::Prototype;
use tluac_lexer::{
    ChunkName,
    Lexer,
    SyntaxError,
};
use tracing::{
    instrument,
    warn,
    Span,
};

mod expdesc;
mod func_state;
mod operators;
mod parser;


use parser::Parser;

/// First byte of a precompiled chunk.
pub const BINARY_SIGNATURE: u8 = 0x1b;

/// Stack given to the parser thread. Enough for the deepest nesting the
/// syntax level limit allows, even in unoptimized builds.
const PARSE_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("attempt to load a {kind} chunk (mode is {mode})")]
    Mode { kind: &'static str, mode: ChunkMode },
    /// Precompiled chunks are recognised but cannot be loaded.
    #[error("attempt to load a binary chunk")]
    BinaryChunk,
}

/// Which kinds of chunk may be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
pub enum ChunkMode {
    #[strum(serialize = "t")]
    Text,
    #[strum(serialize = "b")]
    Binary,
    #[default]
    #[strum(to_string = "bt", serialize = "tb")]
    Both,
}

impl ChunkMode {
    fn allows_text(self) -> bool {
        matches!(self, ChunkMode::Text | ChunkMode::Both)
    }

    fn allows_binary(self) -> bool {
        matches!(self, ChunkMode::Binary | ChunkMode::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    name: String,
    mode: ChunkMode,
    strip_debug: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            name: "?".to_string(),
            mode: ChunkMode::default(),
            strip_debug: false,
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chunk name, e.g. `@script.lua` or `=stdin`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn mode(mut self, mode: ChunkMode) -> Self {
        self.mode = mode;
        self
    }

    /// Drop line, column, local and upvalue name information.
    pub fn strip_debug(mut self, strip_debug: bool) -> Self {
        self.strip_debug = strip_debug;
        self
    }
}

/// Compiles a chunk with the default options.
pub fn compile(src: impl AsRef<[u8]>) -> Result<Prototype, CompileError> {
    compile_with(src, &CompileOptions::default())
}

#[instrument(level = "trace", skip(src), fields(src_bytes = src.as_ref().len()))]
pub fn compile_with(
    src: impl AsRef<[u8]>,
    options: &CompileOptions,
) -> Result<Prototype, CompileError> {
    let src = src.as_ref();

    if src.first() == Some(&BINARY_SIGNATURE) {
        if !options.mode.allows_binary() {
            return Err(CompileError::Mode {
                kind: "binary",
                mode: options.mode,
            });
        }
        return Err(CompileError::BinaryChunk);
    }
    if !options.mode.allows_text() {
        return Err(CompileError::Mode {
            kind: "text",
            mode: options.mode,
        });
    }

    let span = Span::current();
    let parse = || {
        let _entered = span.enter();
        let chunk = ChunkName::new(&options.name);
        let mut lexer = Lexer::new(src, &chunk);
        lexer.skip_shebang();
        Parser::new(lexer, chunk).parse()
    };

    // Nesting depth is bounded by the syntax level limit, not by the
    // caller's stack.
    let mut proto = std::thread::scope(|scope| {
        let spawned = std::thread::Builder::new()
            .name("tluac-parse".to_string())
            .stack_size(PARSE_STACK_SIZE)
            .spawn_scoped(scope, parse);
        match spawned {
            Ok(handle) => handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
            Err(err) => {
                warn!(%err, "could not start the parser thread");
                parse()
            }
        }
    })?;
    if options.strip_debug {
        proto.strip();
    }
    Ok(proto)
}
