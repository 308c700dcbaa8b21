//! Compiles Lua 5.2 source into [`Prototype`] trees of register bytecode.
//!
//! ```
//! let proto = tluac::compile("local x = 10 return x * 2").unwrap();
//! assert!(proto.to_string().contains("RETURN"));
//! ```

use std::path::Path;

use thiserror::Error;
use tracing::instrument;

pub use tluac_bytecode::{
    instruction,
    opcodes,
    Constant,
    Instruction,
    Listing,
    LocalVar,
    Number,
    OpCode,
    Prototype,
    UpvalueDesc,
};
pub use tluac_compiler::{
    compile,
    compile_with,
    ChunkMode,
    CompileError,
    CompileOptions,
};
pub use tluac_lexer::{
    ChunkName,
    Position,
    SyntaxError,
};
pub use tluac_strings::LuaString;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Reads and compiles a source file. The chunk is named `@path`, overriding
/// any name in `options`.
#[instrument(level = "trace", skip_all, fields(path = %path.as_ref().display()))]
pub fn compile_file(
    path: impl AsRef<Path>,
    options: &CompileOptions,
) -> Result<Prototype, LoadError> {
    let path = path.as_ref();
    let src = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let options = options.clone().name(format!("@{}", path.display()));
    Ok(compile_with(src, &options)?)
}
