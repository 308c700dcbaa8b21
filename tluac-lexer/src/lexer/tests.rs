use pretty_assertions::assert_eq;
use tluac_bytecode::Number;
use tluac_strings::LuaString;

use crate::{
    parse_numeral,
    ChunkName,
    Lexer,
    Position,
    SyntaxError,
    Token,
};

fn lex_all(src: &str) -> Result<(Vec<Token>, Lexer<'_>), SyntaxError> {
    let chunk = ChunkName::new("=test");
    let mut lexer = Lexer::new(src.as_bytes(), &chunk);
    let mut tokens = vec![];
    loop {
        lexer.next_token()?;
        tokens.push(lexer.token());
        if lexer.token() == Token::Eof {
            return Ok((tokens, lexer));
        }
    }
}

fn lex_err(src: &str) -> String {
    match lex_all(src) {
        Ok((tokens, _)) => panic!("expected an error, got {tokens:?}"),
        Err(e) => e.to_string(),
    }
}

fn string_at(lexer: &Lexer<'_>, token: Token) -> LuaString {
    match token {
        Token::Name(s) | Token::String(s) => lexer.strings().get(s).clone(),
        other => panic!("not a string token: {other:?}"),
    }
}

#[test]
fn keywords_and_names() -> anyhow::Result<()> {
    let (tokens, lexer) = lex_all("local goto = x_1 and not nil")?;

    assert_eq!(tokens[0], Token::Local);
    assert_eq!(string_at(&lexer, tokens[1]), LuaString::from("goto"));
    assert_eq!(tokens[2], Token::Assign);
    assert_eq!(string_at(&lexer, tokens[3]), LuaString::from("x_1"));
    assert_eq!(&tokens[4..], &[Token::And, Token::Not, Token::Nil, Token::Eof]);

    Ok(())
}

#[test]
fn names_are_interned() -> anyhow::Result<()> {
    let (tokens, _) = lex_all("abc 'abc' abc")?;

    match (tokens[0], tokens[1], tokens[2]) {
        (Token::Name(a), Token::String(b), Token::Name(c)) => {
            assert_eq!(a, b);
            assert_eq!(a, c);
        }
        other => panic!("unexpected tokens {other:?}"),
    }

    Ok(())
}

#[test]
fn punctuation() -> anyhow::Result<()> {
    let (tokens, _) = lex_all("a.b..c...d==e~=f<=g>=h::i;#j[k]{}()%^@~")?;
    let punct = tokens
        .into_iter()
        .filter(|t| !matches!(t, Token::Name(_)))
        .collect::<Vec<_>>();

    assert_eq!(
        punct,
        vec![
            Token::Dot,
            Token::Concat,
            Token::Dots,
            Token::Eq,
            Token::Ne,
            Token::Le,
            Token::Ge,
            Token::DoubleColon,
            Token::Semicolon,
            Token::Hash,
            Token::LBracket,
            Token::RBracket,
            Token::LBrace,
            Token::RBrace,
            Token::LParen,
            Token::RParen,
            Token::Percent,
            Token::Caret,
            Token::Char(b'@'),
            Token::Char(b'~'),
            Token::Eof,
        ]
    );

    Ok(())
}

#[test]
fn numerals() -> anyhow::Result<()> {
    let (tokens, _) = lex_all(
        "3 345 0xff 0xBEBADA 3.0 3.1416 314.16e-2 0.31416E1 34e1 0x0.1E 0xA23p-4 \
         0X1.921FB54442D18P+1 .5 9223372036854775808",
    )?;

    let numbers = tokens
        .into_iter()
        .filter_map(|t| match t {
            Token::Number(n) => Some(n),
            _ => None,
        })
        .collect::<Vec<_>>();

    assert_eq!(
        numbers,
        vec![
            Number::Integer(3),
            Number::Integer(345),
            Number::Integer(255),
            Number::Integer(0xBEBADA),
            Number::Float(3.0),
            Number::Float(3.1416),
            Number::Float(3.1416),
            Number::Float(3.1416),
            Number::Float(340.0),
            Number::Float(0.1171875),
            Number::Float(162.1875),
            Number::Float(std::f64::consts::PI),
            Number::Float(0.5),
            Number::Float(9223372036854775808.0),
        ]
    );

    Ok(())
}

#[test]
fn numeral_parsing() {
    assert_eq!(parse_numeral(b"0x10"), Some(Number::Integer(16)));
    assert_eq!(parse_numeral(b"1e2"), Some(Number::Float(100.0)));
    assert_eq!(parse_numeral(b"0x.8"), Some(Number::Float(0.5)));
    assert_eq!(parse_numeral(b"0x"), None);
    assert_eq!(parse_numeral(b"1e"), None);
    assert_eq!(parse_numeral(b"3..2"), None);
    assert_eq!(parse_numeral(b"0x1p"), None);
}

#[test]
fn short_string_escapes() -> anyhow::Result<()> {
    let (tokens, lexer) =
        lex_all(r#"'a\tb\65\x41\u{48}\u{20AC}\z   c' "\"q\"\\" 'x\
y' "\q""#)?;

    assert_eq!(
        string_at(&lexer, tokens[0]),
        LuaString::from("a\tbAAH\u{20AC}c")
    );
    assert_eq!(string_at(&lexer, tokens[1]), LuaString::from("\"q\"\\"));
    assert_eq!(string_at(&lexer, tokens[2]), LuaString::from("x\ny"));
    assert_eq!(string_at(&lexer, tokens[3]), LuaString::from("q"));

    Ok(())
}

#[test]
fn long_strings() -> anyhow::Result<()> {
    let (tokens, lexer) = lex_all("[==[\nline1\r\nline2]]]==] [[]] [=[a]]]=]")?;

    assert_eq!(
        string_at(&lexer, tokens[0]),
        LuaString::from("line1\nline2]]")
    );
    assert_eq!(string_at(&lexer, tokens[1]), LuaString::from(""));
    assert_eq!(string_at(&lexer, tokens[2]), LuaString::from("a]]"));

    Ok(())
}

#[test]
fn comments_are_skipped() -> anyhow::Result<()> {
    let chunk = ChunkName::new("=test");
    let src = "-- line\n--[==[ long\n]] still ]==] x --[ not long\ny";
    let mut lexer = Lexer::new(src.as_bytes(), &chunk);

    lexer.next_token()?;
    assert!(matches!(lexer.token(), Token::Name(_)));
    assert_eq!(lexer.position(), Position { line: 3, column: 15 });

    lexer.next_token()?;
    assert!(matches!(lexer.token(), Token::Name(_)));
    assert_eq!(lexer.position().line, 4);

    Ok(())
}

#[test]
fn bracket_after_dashes_can_start_a_line_comment() -> anyhow::Result<()> {
    for src in ["x --[ not long\ny", "x --[x\ny", "x --[==x ]]\ny", "x --\ny"] {
        let (tokens, lexer) = lex_all(src)?;
        assert_eq!(tokens.len(), 3, "{src:?} gave {tokens:?}");
        assert_eq!(string_at(&lexer, tokens[0]), LuaString::from("x"));
        assert_eq!(string_at(&lexer, tokens[1]), LuaString::from("y"));
        assert_eq!(tokens[2], Token::Eof);
    }

    let (tokens, _) = lex_all("--[x\nreturn")?;
    assert_eq!(tokens, vec![Token::Return, Token::Eof]);
    Ok(())
}

#[test]
fn line_breaks() -> anyhow::Result<()> {
    let chunk = ChunkName::new("=test");
    let mut lexer = Lexer::new(b"a\r\nb\n\rc\rd\n\ne", &chunk);

    let mut lines = vec![];
    loop {
        lexer.next_token()?;
        if lexer.token() == Token::Eof {
            break;
        }
        lines.push(lexer.position().line);
    }

    assert_eq!(lines, vec![1, 2, 3, 4, 6]);
    Ok(())
}

#[test]
fn lookahead_keeps_current() -> anyhow::Result<()> {
    let chunk = ChunkName::new("=test");
    let mut lexer = Lexer::new(b"goto  top", &chunk);

    lexer.next_token()?;
    assert!(matches!(lexer.lookahead()?, Token::Name(_)));
    assert!(matches!(lexer.token(), Token::Name(_)));
    assert_eq!(lexer.position(), Position { line: 1, column: 1 });

    lexer.next_token()?;
    assert_eq!(lexer.position(), Position { line: 1, column: 7 });
    // The cursor had already moved past the lookahead token.
    assert_eq!(lexer.last_position(), Position { line: 1, column: 10 });

    lexer.next_token()?;
    assert_eq!(lexer.token(), Token::Eof);
    Ok(())
}

#[test]
fn last_position_follows_previous_token() -> anyhow::Result<()> {
    let chunk = ChunkName::new("=test");
    let mut lexer = Lexer::new(b"x =\n  42", &chunk);

    lexer.next_token()?;
    lexer.next_token()?;
    assert_eq!(lexer.last_position(), Position { line: 1, column: 2 });

    lexer.next_token()?;
    assert_eq!(lexer.last_position(), Position { line: 1, column: 4 });
    assert_eq!(lexer.position(), Position { line: 2, column: 3 });

    Ok(())
}

#[test]
fn shebang_is_skipped() -> anyhow::Result<()> {
    let chunk = ChunkName::new("=test");
    let mut lexer = Lexer::new(b"#!/usr/bin/lua\nreturn", &chunk);
    lexer.skip_shebang();

    lexer.next_token()?;
    assert_eq!(lexer.token(), Token::Return);
    assert_eq!(lexer.position().line, 2);
    Ok(())
}

#[test]
fn string_errors() {
    assert_eq!(
        lex_err("x = \"abc"),
        "test:1: unfinished string near <eof>"
    );
    assert_eq!(
        lex_err("x = \"abc\n\""),
        "test:1: unfinished string near '\"abc'"
    );
    assert_eq!(
        lex_err(r#""\xzz""#),
        r#"test:1: hexadecimal digit expected near '"\xz'"#
    );
    assert_eq!(
        lex_err(r#""\u{110000}""#),
        r#"test:1: UTF-8 value too large near '"\u{110000'"#
    );
    assert_eq!(
        lex_err(r#""\u123""#),
        r#"test:1: missing '{' near '"\u1'"#
    );
    assert_eq!(
        lex_err(r#""\u{12""#),
        r#"test:1: missing '}' near '"\u{12"'"#
    );
    assert_eq!(
        lex_err(r#""\300""#),
        r#"test:1: escape sequence too large near '"\300"'"#
    );
}

#[test]
fn bracket_errors() {
    assert_eq!(
        lex_err("x = [==x"),
        "test:1: invalid long string delimiter near '[=='"
    );
    assert_eq!(
        lex_err("x = [[ a [[ b ]]"),
        "test:1: nesting of [[...]] is deprecated near '['"
    );
    assert_eq!(
        lex_err("--[[ unterminated\n\n"),
        "test:3: unfinished long comment (started at line 1) near <eof>"
    );
    assert_eq!(
        lex_err("\n[=[ unterminated"),
        "test:2: unfinished long string (started at line 2) near <eof>"
    );
}

#[test]
fn malformed_numbers() {
    assert_eq!(lex_err("x = 3..2"), "test:1: malformed number near '3..2'");
    assert_eq!(lex_err("x = 0x"), "test:1: malformed number near '0x'");
    assert_eq!(lex_err("x = 1e+"), "test:1: malformed number near '1e+'");
    assert_eq!(lex_err("x = 12ab"), "test:1: malformed number near '12ab'");
}

#[test]
fn token_display() {
    assert_eq!(Token::End.to_string(), "'end'");
    assert_eq!(Token::Concat.to_string(), "'..'");
    assert_eq!(Token::Eof.to_string(), "<eof>");
    assert_eq!(Token::Number(Number::Integer(1)).to_string(), "<number>");
    assert_eq!(Token::Char(b'$').to_string(), "'$'");
}

#[test]
fn syntax_error_near_current_token() -> anyhow::Result<()> {
    let chunk = ChunkName::new("@script.lua");
    let mut lexer = Lexer::new(b"local\n  x 'str'", &chunk);

    lexer.next_token()?;
    lexer.next_token()?;
    lexer.next_token()?;
    let err = lexer.syntax_error("'=' expected");
    assert_eq!(err.to_string(), "script.lua:2: '=' expected near ''str''");
    assert_eq!(err.span, 10..15);

    assert_eq!(lexer.error("oops").to_string(), "script.lua:2: oops");
    Ok(())
}

#[cfg(feature = "rendered-errors")]
#[test]
fn builds_reports() {
    let err = lex_all("x = 'abc").err().expect("unfinished string");
    let mut out = vec![];
    err.build_report()
        .write(ariadne::Source::from("x = 'abc"), &mut out)
        .expect("report renders");

    let rendered = String::from_utf8_lossy(&out);
    assert!(rendered.contains("unfinished string"));
}
