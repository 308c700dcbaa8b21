use bstr::ByteSlice;
use logos::Lexer;
use tluac_strings::Symbol;
use tracing::trace;

use super::{
    LexError,
    Lexed,
    RawToken,
};

const MAX_UNICODE: u32 = 0x10FFFF;

fn is_lua_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}

fn is_newline(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// Length of the line break starting at `at`, treating `\r\n` and `\n\r` as
/// one break.
fn newline_len(src: &[u8], at: usize) -> usize {
    match src.get(at..at + 2) {
        Some([b'\r', b'\n'] | [b'\n', b'\r']) => 2,
        _ => 1,
    }
}

fn hex_value(b: u8) -> Option<u32> {
    char::from(b).to_digit(16)
}

pub(super) fn bump_to_end_of_line(lexer: &mut Lexer<RawToken>) {
    let remain = lexer.remainder();
    let line_len = remain.find_byteset(b"\r\n").unwrap_or(remain.len());
    lexer.bump(line_len);
}

/// Lexes a short string. The lexer is positioned just after the opening quote.
pub(super) fn lex_string(lexer: &mut Lexer<RawToken>) -> Lexed<Symbol> {
    let delim = lexer.slice()[0];
    let src = lexer.remainder();

    let mut string = Vec::new();
    let mut i = 0;

    // On failure, `i` is the end of the text quoted in the error message.
    let result = loop {
        let byte = match src.get(i) {
            Some(byte) => *byte,
            None => break Err(LexError::UnfinishedStringAtEof),
        };

        if byte == delim {
            i += 1;
            break Ok(());
        }

        match byte {
            b'\n' | b'\r' => break Err(LexError::UnfinishedString),
            b'\\' => i += 1,
            _ => {
                string.push(byte);
                i += 1;
                continue;
            }
        }

        let escape = match src.get(i) {
            Some(escape) => *escape,
            // Reported as an unfinished string on the next iteration.
            None => continue,
        };

        match escape {
            b'a' => string.push(0x07),
            b'b' => string.push(0x08),
            b'f' => string.push(0x0C),
            b'n' => string.push(b'\n'),
            b'r' => string.push(b'\r'),
            b't' => string.push(b'\t'),
            b'v' => string.push(0x0B),
            b'x' => {
                let mut value = 0;
                for _ in 0..2 {
                    i += 1;
                    match src.get(i).copied().and_then(hex_value) {
                        Some(digit) => value = value * 16 + digit,
                        None => break,
                    }
                }
                match src.get(i).copied().and_then(hex_value) {
                    Some(_) => string.push(value as u8),
                    None => {
                        i = (i + 1).min(src.len());
                        break Err(LexError::HexDigitExpected);
                    }
                }
            }
            b'u' => match read_utf8_escape(src, &mut i) {
                Ok(value) => {
                    let (len, bytes) = encode_utf8_raw(value);
                    string.extend_from_slice(&bytes[..len]);
                }
                Err(e) => {
                    i = (i + 1).min(src.len());
                    break Err(e);
                }
            },
            b'\n' | b'\r' => {
                string.push(b'\n');
                i += newline_len(src, i);
                continue;
            }
            b'z' => {
                i += 1;
                while i < src.len() && is_lua_space(src[i]) {
                    i += 1;
                }
                continue;
            }
            b'0'..=b'9' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 && i < src.len() && src[i].is_ascii_digit() {
                    value = value * 10 + u32::from(src[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                if value > u8::MAX as u32 {
                    i = (i + 1).min(src.len());
                    break Err(LexError::EscapeTooLarge);
                }
                string.push(value as u8);
                continue;
            }
            // Covers `\\`, `\"` and `\'`. Unknown escapes keep the escaped byte.
            other => string.push(other),
        }

        i += 1;
    };

    lexer.bump(i);
    match result {
        Ok(()) => Lexed::Valid(lexer.extras.intern(string)),
        Err(e) => Lexed::Invalid(e),
    }
}

/// Reads `\u{XXX}` with `*i` on the `u`. On success `*i` is left on the
/// closing brace, on failure on the offending byte.
fn read_utf8_escape(src: &[u8], i: &mut usize) -> Result<u32, LexError> {
    *i += 1;
    if src.get(*i) != Some(&b'{') {
        return Err(LexError::MissingOpenBrace);
    }

    *i += 1;
    let mut value = match src.get(*i).copied().and_then(hex_value) {
        Some(digit) => digit,
        None => return Err(LexError::HexDigitExpected),
    };

    loop {
        *i += 1;
        let digit = match src.get(*i).copied().and_then(hex_value) {
            Some(digit) => digit,
            None => break,
        };

        value = (value << 4) | digit;
        if value > MAX_UNICODE {
            return Err(LexError::Utf8ValueTooLarge);
        }
    }

    if src.get(*i) != Some(&b'}') {
        return Err(LexError::MissingCloseBrace);
    }

    Ok(value)
}

/// Encodes a code point as utf8 without rejecting surrogates.
fn encode_utf8_raw(val: u32) -> (usize, [u8; 4]) {
    #[rustfmt::skip]
    mod tag {
    pub const CONT: u8    = 0b10000000;
    pub const TWO_B: u8   = 0b11000000;
    pub const THREE_B: u8 = 0b11100000;
    pub const FOUR_B: u8  = 0b11110000;
    }

    #[rustfmt::skip]
    mod mask {
    pub const CONT: u32    = 0b00111111;
    pub const TWO_B: u32   = 0b00011111;
    pub const THREE_B: u32 = 0b00001111;
    pub const FOUR_B: u32  = 0b00000111;
    }

    debug_assert!(val <= MAX_UNICODE);
    if val < 0x80 {
        (1, [val as u8, 0, 0, 0])
    } else if val < 0x800 {
        (
            2,
            [
                (val >> 6 & mask::TWO_B) as u8 | tag::TWO_B,
                (val & mask::CONT) as u8 | tag::CONT,
                0,
                0,
            ],
        )
    } else if val < 0x10000 {
        (
            3,
            [
                (val >> 12 & mask::THREE_B) as u8 | tag::THREE_B,
                (val >> 6 & mask::CONT) as u8 | tag::CONT,
                (val & mask::CONT) as u8 | tag::CONT,
                0,
            ],
        )
    } else {
        (
            4,
            [
                (val >> 18 & mask::FOUR_B) as u8 | tag::FOUR_B,
                (val >> 12 & mask::CONT) as u8 | tag::CONT,
                (val >> 6 & mask::CONT) as u8 | tag::CONT,
                (val & mask::CONT) as u8 | tag::CONT,
            ],
        )
    }
}

/// Scans the body of a long bracket of the given level, returning the
/// contents with every line break normalized to `\n`. The lexer is left just
/// past the closing bracket, or at the point of failure.
fn scan_long_bracket(lexer: &mut Lexer<RawToken>, level: usize) -> Result<Vec<u8>, LexError> {
    trace!(equals = level, "long bracket");

    let src = lexer.remainder();
    let mut contents = Vec::new();
    let mut i = 0;

    if src.first().copied().map_or(false, is_newline) {
        i += newline_len(src, 0);
    }

    while i < src.len() {
        match src[i] {
            b']' => {
                let equals = src[i + 1..].iter().take_while(|&&b| b == b'=').count();
                if equals == level && src.get(i + 1 + equals) == Some(&b']') {
                    lexer.bump(i + equals + 2);
                    return Ok(contents);
                }
                contents.push(b']');
                contents.extend(std::iter::repeat(b'=').take(equals));
                i += 1 + equals;
            }
            b'[' if level == 0 && src.get(i + 1) == Some(&b'[') => {
                lexer.bump(i + 2);
                return Err(LexError::NestedLongBracket);
            }
            b'\n' | b'\r' => {
                contents.push(b'\n');
                i += newline_len(src, i);
            }
            byte => {
                contents.push(byte);
                i += 1;
            }
        }
    }

    lexer.bump(src.len());
    Err(LexError::UnfinishedLongString)
}

pub(super) fn lex_long_string(lexer: &mut Lexer<RawToken>) -> Lexed<Symbol> {
    // len([[) == 2
    let level = lexer.slice().len() - 2;
    match scan_long_bracket(lexer, level) {
        Ok(contents) => Lexed::Valid(lexer.extras.intern(contents)),
        Err(e) => Lexed::Invalid(e),
    }
}

/// Lexes a comment with the lexer just past its `--`. The comment is long only
/// when a complete opening bracket follows; `--[` or `--[==` alone start a line
/// comment.
pub(super) fn lex_comment(lexer: &mut Lexer<RawToken>) -> Lexed<()> {
    let remain = lexer.remainder();
    let level = remain.strip_prefix(b"[").and_then(|rest| {
        let equals = rest.iter().take_while(|&&b| b == b'=').count();
        (rest.get(equals) == Some(&b'[')).then(|| equals)
    });

    let level = match level {
        Some(level) => level,
        None => {
            bump_to_end_of_line(lexer);
            return Lexed::Valid(());
        }
    };

    // len([[) == 2
    lexer.bump(level + 2);
    match scan_long_bracket(lexer, level) {
        Ok(_) => Lexed::Valid(()),
        Err(LexError::UnfinishedLongString) => Lexed::Invalid(LexError::UnfinishedLongComment),
        Err(e) => Lexed::Invalid(e),
    }
}
