use std::{
    borrow::Borrow,
    fmt,
};

use bstr::{
    BStr,
    BString,
    ByteSlice,
};
use derive_more::{
    Deref,
    DerefMut,
    From,
    Into,
};
use indexmap::IndexSet;

#[cfg(test)]
mod tests;

/// An owned Lua string. Lua strings are arbitrary byte sequences, so this is
/// not guaranteed to be valid utf8.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deref, DerefMut, From, Into)]
pub struct LuaString(BString);

impl fmt::Debug for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Borrow<BStr> for LuaString {
    fn borrow(&self) -> &BStr {
        self.0.as_bstr()
    }
}

impl Borrow<[u8]> for LuaString {
    fn borrow(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl<'s> From<&'s LuaString> for &'s BStr {
    fn from(val: &'s LuaString) -> Self {
        val.0.as_bstr()
    }
}

impl From<&[u8]> for LuaString {
    fn from(s: &[u8]) -> Self {
        Self(BString::from(s))
    }
}

impl From<Vec<u8>> for LuaString {
    fn from(s: Vec<u8>) -> Self {
        Self(BString::from(s))
    }
}

impl From<&str> for LuaString {
    fn from(s: &str) -> Self {
        Self(BString::from(s))
    }
}

/// A handle to a string stored in a [`StringTable`].
///
/// Two symbols from the same table are equal exactly when the strings they
/// refer to are equal, so names can be compared without touching their bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct Symbol(usize);

impl Symbol {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Interns every identifier and string literal seen while compiling one chunk.
#[derive(Debug, Default, Clone)]
pub struct StringTable {
    strings: IndexSet<LuaString>,
}

impl StringTable {
    pub fn intern(&mut self, bytes: impl AsRef<[u8]>) -> Symbol {
        let bytes = bytes.as_ref();
        if let Some(id) = self.strings.get_index_of(bytes) {
            Symbol(id)
        } else {
            Symbol(self.strings.insert_full(LuaString::from(bytes)).0)
        }
    }

    /// Looks up a symbol produced by this table.
    ///
    /// # Panics
    /// If `symbol` came from a different table.
    pub fn get(&self, symbol: Symbol) -> &LuaString {
        &self.strings[symbol.0]
    }

    /// Returns the symbol for `bytes` if it has already been interned.
    pub fn find(&self, bytes: impl AsRef<[u8]>) -> Option<Symbol> {
        self.strings.get_index_of(bytes.as_ref()).map(Symbol)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
