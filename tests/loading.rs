use indoc::indoc;
use pretty_assertions::assert_eq;
use tluac::{
    compile,
    compile_file,
    compile_with,
    ChunkMode,
    CompileError,
    CompileOptions,
    LoadError,
};
use tracing_subscriber::filter::LevelFilter;

fn error_text(src: &str, options: &CompileOptions) -> String {
    match compile_with(src, options) {
        Ok(proto) => panic!("compiled to\n{proto}"),
        Err(err) => err.to_string(),
    }
}

#[test]
fn chunk_modes() -> anyhow::Result<()> {
    assert_eq!("t".parse::<ChunkMode>()?, ChunkMode::Text);
    assert_eq!("b".parse::<ChunkMode>()?, ChunkMode::Binary);
    assert_eq!("bt".parse::<ChunkMode>()?, ChunkMode::Both);
    assert_eq!(ChunkMode::default().to_string(), "bt");

    let binary_only = CompileOptions::new().mode(ChunkMode::Binary);
    assert_eq!(
        error_text("return 1", &binary_only),
        "attempt to load a text chunk (mode is b)"
    );

    let text_only = CompileOptions::new().mode(ChunkMode::Text);
    assert!(compile_with("return 1", &text_only).is_ok());
    assert_eq!(
        error_text("\x1bLua", &text_only),
        "attempt to load a binary chunk (mode is t)"
    );
    Ok(())
}

#[test]
fn binary_chunks_are_rejected() {
    assert_eq!(compile("\x1bLuaR"), Err(CompileError::BinaryChunk));
}

#[test]
fn chunk_names_in_errors() {
    let cases = [
        ("=stdin", "stdin:1:"),
        ("@script.lua", "script.lua:1:"),
        (
            "@/a/very/long/path/to/some/script.lua",
            "...ath/to/some/script.lua:1:",
        ),
        ("x = ", "[string \"x = \"]:1:"),
        ("local a\nx = ", "[string \"local a...\"]:1:"),
    ];

    for (name, prefix) in cases {
        let options = CompileOptions::new().name(name);
        let text = error_text("x = ", &options);
        assert!(text.starts_with(prefix), "{name:?} gave {text:?}");
    }
}

#[test]
fn shebang_lines_are_skipped() -> anyhow::Result<()> {
    let src = indoc! {"
        #!/usr/bin/env lua
        return 1
    "};
    let proto = compile(src)?;
    assert_eq!(proto.line_info, vec![2, 2]);

    let err = compile("#!/bin/lua\nreturn +")
        .err()
        .ok_or_else(|| anyhow::anyhow!("compiled"))?;
    assert_eq!(err.to_string(), "[string \"?\"]:2: unexpected symbol near '+'");
    Ok(())
}

#[test]
fn stripping_debug_info() -> anyhow::Result<()> {
    let src = indoc! {"
        local x = 1
        local function f() return x end
        return f
    "};
    let full = compile(src)?;
    let stripped = compile_with(src, &CompileOptions::new().strip_debug(true))?;

    assert_eq!(stripped.code, full.code);
    assert_eq!(stripped.constants, full.constants);
    assert!(stripped.line_info.is_empty());
    assert!(stripped.column_info.is_empty());
    assert!(stripped.locals.is_empty());
    assert!(stripped.upvalues.iter().all(|upval| upval.name.is_none()));

    let child = &stripped.children[0];
    assert!(child.line_info.is_empty());
    assert_eq!(child.upvalues[0].name, None);
    assert!(child.upvalues[0].in_stack);
    Ok(())
}

#[test]
fn compiling_files() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("tluac-{}-ok.lua", std::process::id()));
    std::fs::write(&path, "return ...")?;
    let proto = compile_file(&path, &CompileOptions::default())?;
    std::fs::remove_file(&path)?;
    assert_eq!(proto.source.to_string(), format!("@{}", path.display()));

    let path = std::env::temp_dir().join(format!("tluac-{}-bad.lua", std::process::id()));
    std::fs::write(&path, "return return")?;
    let err = compile_file(&path, &CompileOptions::default());
    std::fs::remove_file(&path)?;
    match err {
        Err(LoadError::Compile(CompileError::Syntax(err))) => {
            assert_eq!(err.line, 1);
            assert_eq!(err.near.as_deref(), Some("'return'"));
        }
        other => panic!("unexpected result {other:?}"),
    }

    let missing = std::env::temp_dir().join("tluac-does-not-exist.lua");
    match compile_file(&missing, &CompileOptions::default()) {
        Err(LoadError::Io { path, .. }) => assert_eq!(path, missing.display().to_string()),
        other => panic!("unexpected result {other:?}"),
    }
    Ok(())
}

#[test]
fn compiles_with_tracing_enabled() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .try_init();

    let proto = compile("local function f() return function() end end")?;
    assert_eq!(proto.function_count(), 3);
    Ok(())
}
