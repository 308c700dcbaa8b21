use indoc::indoc;
use pretty_assertions::assert_eq;
use tluac::{
    compile,
    instruction::{
        index_k,
        is_k,
    },
    opcodes::{
        OpArgMode,
        OpMode,
    },
    Constant,
    OpCode,
    Prototype,
};

const PROGRAM: &str = indoc! {r#"
    local Account = {}
    Account.__index = Account

    function Account.new(owner, ...)
        local self = setmetatable({ owner = owner, balance = 0, log = { ... } }, Account)
        return self
    end

    function Account:deposit(v)
        if v <= 0 then
            error("deposit must be positive")
        elseif v > 1e6 and not self.trusted then
            return false
        end
        self.balance = self.balance + v
        self.log[#self.log + 1] = "deposit " .. v
        return true
    end

    local function sum(t)
        local total = 0
        for i = 1, #t do
            total = total + t[i]
        end
        return total
    end

    local counters = {}
    for k, v in pairs({ a = 1, b = 2, c = 3 }) do
        counters[#counters + 1] = function() return k, v end
    end

    local n = 0
    repeat
        local step = n % 3 == 0 and 2 or 1
        n = n + step
        if n > 50 then break end
    until n >= 20

    do
        local i = 1
        ::again::
        if i < 10 then
            i = i * 2
            goto again
        end
    end

    local a, b = sum({ 1, 2, 3 }), -n ^ 2
    return Account, a, b, counters, ...
"#};

fn functions(proto: &Prototype) -> Vec<&Prototype> {
    let mut all = vec![proto];
    for child in proto.children.iter() {
        all.extend(functions(child));
    }
    all
}

#[test]
fn compilation_is_deterministic() -> anyhow::Result<()> {
    let first = compile(PROGRAM)?;
    let second = compile(PROGRAM)?;
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
    Ok(())
}

#[test]
fn constants_are_deduplicated() -> anyhow::Result<()> {
    let proto = compile(indoc! {r#"
        local a, b, c = "k", "k", 1.5
        t.k = 1.5
        return "k", x, x, 2, 2.0
    "#})?;

    assert_eq!(
        proto.constants,
        vec![
            Constant::from("k"),
            Constant::Number(1.5),
            Constant::from("t"),
            Constant::from("x"),
            Constant::Integer(2),
        ]
    );
    Ok(())
}

#[test]
fn wide_integral_floats_share_the_integer_constant() -> anyhow::Result<()> {
    let proto = compile("return 1099511627776, 1099511627776.0, 2^40")?;
    assert_eq!(proto.constants, vec![Constant::Integer(1 << 40)]);

    let proto = compile("return 9007199254740993.0, 0.5")?;
    assert_eq!(
        proto.constants,
        vec![Constant::Integer(9007199254740992), Constant::Number(0.5)]
    );
    Ok(())
}

#[test]
fn operands_fit_the_frame() -> anyhow::Result<()> {
    let proto = compile(PROGRAM)?;

    for f in functions(&proto) {
        let frame = u32::from(f.max_stack_size);
        assert!(frame <= 250);

        for (pc, instr) in f.code.iter().enumerate() {
            let op = instr.op();
            let context = || format!("{} at pc {} of {}", op, pc + 1, f.id());

            if op.sets_a() || matches!(op, OpCode::SetTable | OpCode::Test | OpCode::TForCall) {
                assert!(instr.a() < frame, "{}", context());
            }

            if op.mode() == OpMode::ABC {
                for (mode, operand) in [(op.b_mode(), instr.b()), (op.c_mode(), instr.c())] {
                    match mode {
                        OpArgMode::R => assert!(operand < frame, "{}", context()),
                        OpArgMode::K if is_k(operand) => {
                            assert!((index_k(operand) as usize) < f.constants.len(), "{}", context())
                        }
                        OpArgMode::K => assert!(operand < frame, "{}", context()),
                        _ => (),
                    }
                }
            }

            if op == OpCode::LoadK {
                assert!((instr.bx() as usize) < f.constants.len(), "{}", context());
            }
            if op == OpCode::Closure {
                assert!((instr.bx() as usize) < f.children.len(), "{}", context());
            }
        }
    }
    Ok(())
}

#[test]
fn every_jump_is_patched() -> anyhow::Result<()> {
    let proto = compile(PROGRAM)?;

    for f in functions(&proto) {
        for (pc, instr) in f.code.iter().enumerate() {
            let op = instr.op();
            if op.is_jump() {
                let target = pc as i64 + 1 + instr.sbx() as i64;
                assert!(
                    (0..f.code.len() as i64).contains(&target),
                    "{op} at pc {} of {} jumps to {target}",
                    pc + 1,
                    f.id()
                );
                // No jump in this program targets itself.
                assert_ne!(instr.sbx(), -1);
            }
            if op.is_test() {
                assert_eq!(f.code[pc + 1].op(), OpCode::Jmp);
            }
        }
    }
    Ok(())
}

#[test]
fn debug_info_is_parallel_to_code() -> anyhow::Result<()> {
    let proto = compile(PROGRAM)?;

    for f in functions(&proto) {
        assert_eq!(f.line_info.len(), f.code.len());
        assert_eq!(f.column_info.len(), f.code.len());
        assert!(f.line_info.iter().all(|&line| line >= 1));
        for local in f.locals.iter() {
            assert!(local.start_pc <= local.end_pc);
            assert!(local.end_pc <= f.code.len());
        }
    }
    Ok(())
}

#[test]
fn block_locals_are_not_visible_after_the_block() -> anyhow::Result<()> {
    let proto = compile("do local x = 1 end return x")?;

    assert_eq!(proto.code[1].op(), OpCode::GetTabUp);
    assert_eq!(proto.constants, vec![Constant::Integer(1), Constant::from("x")]);
    Ok(())
}

#[test]
fn captured_locals_are_closed_at_block_exit() -> anyhow::Result<()> {
    let proto = compile("do local x = 1 f = function() return x end end")?;

    let closes = proto
        .code
        .iter()
        .filter(|i| i.is(OpCode::Jmp) && i.a() > 0)
        .collect::<Vec<_>>();
    assert_eq!(closes.len(), 1);
    // Closes everything from register 0 up.
    assert_eq!(closes[0].a(), 1);

    let uncaptured = compile("do local x = 1 f = function() return 1 end end")?;
    assert!(!uncaptured.code.iter().any(|i| i.is(OpCode::Jmp)));
    Ok(())
}

#[test]
fn numeric_constants_are_folded() -> anyhow::Result<()> {
    let proto = compile("return 1 + 2")?;
    assert_eq!(proto.code.len(), 2);
    assert_eq!(proto.code[0].op(), OpCode::LoadK);
    assert_eq!(proto.constants, vec![Constant::Integer(3)]);

    let proto = compile("return 2 ^ 0.5 * 2, 7 % 4, -(3 - 5)")?;
    assert_eq!(
        proto.constants,
        vec![
            Constant::Number(2f64.powf(0.5) * 2.0),
            Constant::Integer(3),
            Constant::Integer(2),
        ]
    );
    assert!(proto.code[..proto.code.len() - 1]
        .iter()
        .all(|i| i.is(OpCode::LoadK)));
    Ok(())
}

#[test]
fn non_finite_results_are_not_folded() -> anyhow::Result<()> {
    for (src, op) in [
        ("return 1/0", OpCode::Div),
        ("return 0/0", OpCode::Div),
        ("return 1 % 0", OpCode::Mod),
    ] {
        let proto = compile(src)?;
        let ops = proto.code.iter().map(|i| i.op()).collect::<Vec<_>>();
        assert_eq!(ops, vec![op, OpCode::Return], "{src}");
    }
    Ok(())
}

#[test]
fn length_is_never_folded() -> anyhow::Result<()> {
    let proto = compile(r#"return #"abc""#)?;
    let ops = proto.code.iter().map(|i| i.op()).collect::<Vec<_>>();
    assert_eq!(ops, vec![OpCode::LoadK, OpCode::Len, OpCode::Return]);
    Ok(())
}
