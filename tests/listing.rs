use indoc::indoc;
use pretty_assertions::assert_eq;
use tluac::{
    compile_with,
    CompileOptions,
    Listing,
};

#[test]
fn instructions_only() -> anyhow::Result<()> {
    let options = CompileOptions::new().name("=test");
    let proto = compile_with("local x = 10 return x * 2", &options)?;

    let expected = indoc! {"

        main <test:0,0> (3 instructions, 12 bytes at test:0)
        0 param, 2 slots, 1 upvalues, 1 locals, 2 constants, 0 functions
        \t1\t[1]\tLOADK    \t0 -1\t; 10
        \t2\t[1]\tMUL      \t1 0 -2\t; - 2
        \t3\t[1]\tRETURN   \t1 2
    "};
    assert_eq!(proto.to_string(), expected);
    Ok(())
}

#[test]
fn full_listing() -> anyhow::Result<()> {
    let options = CompileOptions::new().name("=test");
    let proto = compile_with("local x = 10 return x * 2", &options)?;

    let listing = Listing::new(&proto).full(true).to_string();
    let tables = indoc! {"
        constants (2) for test:0:
        \t1\t10
        \t2\t2
        locals (1) for test:0:
        \t0\tx\t2\t4
        upvalues (1) for test:0:
        \t0\t_ENV\t1\t0
    "};
    assert!(listing.ends_with(tables), "{listing}");
    Ok(())
}

#[test]
fn nested_functions_follow_their_parent() -> anyhow::Result<()> {
    let src = indoc! {"
        local function f(a)
            return a
        end
        return f
    "};
    let options = CompileOptions::new().name("@demo.lua");
    let proto = compile_with(src, &options)?;
    let listing = proto.to_string();

    let main = listing
        .find("main <demo.lua:0,0>")
        .ok_or_else(|| anyhow::anyhow!("no main header in {listing}"))?;
    let child = listing
        .find("function <demo.lua:1,3>")
        .ok_or_else(|| anyhow::anyhow!("no function header in {listing}"))?;
    assert!(main < child);
    assert!(listing.contains("CLOSURE  \t0 0\t; demo.lua:1"), "{listing}");
    Ok(())
}

#[test]
fn columns() -> anyhow::Result<()> {
    let proto = compile_with("x = 1", &CompileOptions::new().name("=cols"))?;
    let listing = Listing::new(&proto).columns(true).to_string();
    assert!(listing.contains("[1/"), "{listing}");
    Ok(())
}
