use std::hash::{
    Hash,
    Hasher,
};

use derive_more::From;
use tluac_strings::LuaString;

use crate::{
    number::format_g14,
    Number,
};

/// An entry in a prototype's constant pool.
///
/// Equality is structural, with floats compared by their bit patterns so that
/// the pool can deduplicate through a hash map. `0.0` and `-0.0` are therefore
/// distinct entries, as are different NaN payloads.
#[derive(Debug, Clone, From)]
pub enum Constant {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(LuaString),
}

impl From<Number> for Constant {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Self::Integer(i),
            Number::Float(f) => match Number::normalized(f) {
                Number::Integer(i) => Self::Integer(i),
                Number::Float(f) => Self::Number(f),
            },
        }
    }
}

impl From<&str> for Constant {
    fn from(s: &str) -> Self {
        Self::String(LuaString::from(s))
    }
}

impl Constant {
    pub fn type_name(&self) -> &'static str {
        match self {
            Constant::Nil => "nil",
            Constant::Boolean(_) => "boolean",
            Constant::Integer(_) | Constant::Number(_) => "number",
            Constant::String(_) => "string",
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match *self {
            Constant::Integer(i) => Some(Number::Integer(i)),
            Constant::Number(f) => Some(Number::Float(f)),
            _ => None,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Nil, Constant::Nil) => true,
            (Constant::Boolean(l), Constant::Boolean(r)) => l == r,
            (Constant::Integer(l), Constant::Integer(r)) => l == r,
            (Constant::Number(l), Constant::Number(r)) => l.to_bits() == r.to_bits(),
            (Constant::String(l), Constant::String(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Constant::Nil => (),
            Constant::Boolean(b) => b.hash(state),
            Constant::Integer(i) => i.hash(state),
            Constant::Number(f) => f.to_bits().hash(state),
            Constant::String(s) => s.hash(state),
        }
    }
}

/// Renders constants the way `luac -l` prints them: strings are quoted and
/// escaped, numbers use `%.14g`.
impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Nil => f.write_str("nil"),
            Constant::Boolean(b) => write!(f, "{b}"),
            Constant::Integer(i) => write!(f, "{i}"),
            Constant::Number(n) => f.write_str(&format_g14(*n)),
            Constant::String(s) => write_quoted(f, s.as_slice()),
        }
    }
}

fn write_quoted(f: &mut std::fmt::Formatter<'_>, bytes: &[u8]) -> std::fmt::Result {
    f.write_str("\"")?;
    for &b in bytes {
        match b {
            b'"' => f.write_str("\\\"")?,
            b'\\' => f.write_str("\\\\")?,
            0x07 => f.write_str("\\a")?,
            0x08 => f.write_str("\\b")?,
            0x0c => f.write_str("\\f")?,
            b'\t' => f.write_str("\\t")?,
            b'\r' => f.write_str("\\r")?,
            b'\n' => f.write_str("\\n")?,
            0x0b => f.write_str("\\v")?,
            b' '..=b'~' => write!(f, "{}", b as char)?,
            _ => write!(f, "\\{b:03}")?,
        }
    }
    f.write_str("\"")
}
