use bstr::ByteSlice;
use tluac_strings::LuaString;

const NAME_LENGTH: usize = 30;
const FILE_LENGTH: usize = NAME_LENGTH - 8;
const STRING_LENGTH: usize = NAME_LENGTH - 17;

/// The name a chunk was loaded under, along with the shortened form used in
/// error messages and listings.
///
/// Names starting with `=` are used verbatim, names starting with `@` are file
/// names and anything else is treated as the source text itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkName {
    source: LuaString,
    short: String,
}

impl ChunkName {
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        let source = LuaString::from(name.as_ref());
        let short = shorten(name.as_ref());
        Self { source, short }
    }

    pub fn source(&self) -> &LuaString {
        &self.source
    }

    pub fn short(&self) -> &str {
        &self.short
    }
}

impl Default for ChunkName {
    fn default() -> Self {
        Self::new("?")
    }
}

fn shorten(name: &[u8]) -> String {
    match name {
        [b'=', rest @ ..] => {
            let len = rest.len().min(NAME_LENGTH - 1);
            rest[..len].to_str_lossy().into_owned()
        }
        [b'@', rest @ ..] if rest.len() > FILE_LENGTH => {
            format!("...{}", rest[rest.len() - FILE_LENGTH..].to_str_lossy())
        }
        [b'@', rest @ ..] => rest.to_str_lossy().into_owned(),
        _ => {
            let (mut len, mut truncate) = match name.find_byteset(b"\r\n") {
                Some(newline) => (newline, true),
                None => (name.len(), false),
            };

            if len > STRING_LENGTH {
                len = STRING_LENGTH;
                truncate = true;
            }

            format!(
                "[string \"{}{}\"]",
                name[..len].to_str_lossy(),
                if truncate { "..." } else { "" }
            )
        }
    }
}
