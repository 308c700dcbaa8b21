use pretty_assertions::assert_eq;
use tluac::{
    compile,
    CompileError,
    Constant,
    Instruction,
    LuaString,
    OpCode,
};

#[test]
fn constant_addition() -> anyhow::Result<()> {
    let proto = compile("return 1+1")?;

    assert!(proto.children.is_empty());
    assert_eq!(proto.constants, vec![Constant::Integer(2)]);
    assert_eq!(
        proto.code,
        vec![
            Instruction::abx(OpCode::LoadK, 0, 0),
            Instruction::abc(OpCode::Return, 0, 2, 0),
        ]
    );

    Ok(())
}

#[test]
fn local_function_sees_itself() -> anyhow::Result<()> {
    let proto = compile("local function f() return f end")?;

    let f = &proto.children[0];
    assert_eq!(f.upvalues.len(), 1);
    assert_eq!(f.upvalues[0].name, Some(LuaString::from("f")));
    assert!(f.upvalues[0].in_stack);
    assert_eq!(f.upvalues[0].index, 0);
    assert_eq!(
        f.code,
        vec![
            Instruction::abc(OpCode::GetUpval, 0, 0, 0),
            Instruction::abc(OpCode::Return, 0, 2, 0),
        ]
    );
    // No global lookup anywhere.
    assert!(proto.constants.is_empty());
    assert!(f.constants.is_empty());

    Ok(())
}

#[test]
fn top_level_break() {
    let result = compile("break");
    match result {
        Err(CompileError::Syntax(err)) => {
            assert_eq!(err.to_string(), "[string \"?\"]:1: break outside loop at line 1")
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
}

#[test]
fn empty_numeric_for() -> anyhow::Result<()> {
    let proto = compile("for i=1,10 do end")?;

    let ops = proto.code.iter().map(|i| i.op()).collect::<Vec<_>>();
    assert_eq!(
        ops,
        vec![
            OpCode::LoadK,
            OpCode::LoadK,
            OpCode::LoadK,
            OpCode::ForPrep,
            OpCode::ForLoop,
            OpCode::Return,
        ]
    );
    assert_eq!(proto.code[3].sbx(), 0);
    assert_eq!(proto.code[4].sbx(), -1);

    let names = proto
        .locals
        .iter()
        .map(|local| local.name.to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec!["(for index)", "(for limit)", "(for step)", "i"]
    );

    Ok(())
}

#[test]
fn too_many_locals() {
    let names = (0..251).map(|i| format!("v{i}")).collect::<Vec<_>>();
    let src = format!("local {}", names.join(", "));

    match compile(src) {
        Err(CompileError::Syntax(err)) => {
            assert_eq!(err.message, "main function has more than 200 local variables")
        }
        other => panic!("expected a limit error, got {other:?}"),
    }
}

#[test]
fn too_many_registers() {
    // Under the local limit, but the call arguments run out of registers.
    let names = (0..180).map(|i| format!("v{i}")).collect::<Vec<_>>();
    let values = vec!["1"; 100].join(", ");
    let src = format!("local {} = 1 f({values})", names.join(", "));

    match compile(src) {
        Err(CompileError::Syntax(err)) => {
            assert_eq!(err.message, "function or expression too complex")
        }
        other => panic!("expected a limit error, got {other:?}"),
    }
}
