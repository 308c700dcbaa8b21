use pretty_assertions::assert_eq;
use tluac_bytecode::{
    Instruction,
    Number,
    OpCode,
};
use tluac_lexer::Position;
use tluac_strings::LuaString;

use super::{
    expressions::const_fold,
    CodegenError,
    FuncState,
};
use crate::expdesc::JumpList;

fn main_state() -> FuncState {
    FuncState::new(None, 0, Position::START)
}

#[test]
fn adjacent_nils_merge() {
    let mut fs = main_state();
    fs.nil(0, 2);
    fs.nil(2, 1);
    fs.nil(1, 1);

    assert_eq!(fs.pc(), 1);
    assert_eq!(fs.instruction(0), Instruction::abc(OpCode::LoadNil, 0, 2, 0));
}

#[test]
fn nils_do_not_merge_across_labels() {
    let mut fs = main_state();
    fs.nil(0, 1);
    fs.get_label();
    fs.nil(1, 1);

    assert_eq!(fs.pc(), 2);
}

#[test]
fn disjoint_nils_do_not_merge() {
    let mut fs = main_state();
    fs.nil(0, 1);
    fs.nil(3, 1);

    assert_eq!(fs.pc(), 2);
    assert_eq!(fs.instruction(1), Instruction::abc(OpCode::LoadNil, 3, 0, 0));
}

#[test]
fn jump_lists_patch_to_next_instruction() {
    let mut fs = main_state();
    let mut list = fs.jump();
    let second = fs.jump();
    fs.concat(&mut list, second);
    fs.patch_to_here(list);
    fs.ret(0, 0);

    assert_eq!(fs.instruction(0).sbx(), 1);
    assert_eq!(fs.instruction(1).sbx(), 0);
    assert!(fs.check_jumps().is_ok());
}

#[test]
fn backward_jumps() {
    let mut fs = main_state();
    let start = fs.get_label();
    fs.code_abc(OpCode::Move, 1, 0, 0);
    let back = fs.jump();
    fs.patch_list(back, start);

    assert_eq!(fs.instruction(1).sbx(), -2);
}

#[test]
fn concat_with_empty_lists() {
    let mut fs = main_state();
    let mut list = JumpList::EMPTY;
    fs.concat(&mut list, JumpList::EMPTY);
    assert!(list.is_empty());

    let j = fs.jump();
    fs.concat(&mut list, j);
    assert_eq!(list, j);
}

#[test]
fn close_level_is_stored_plus_one() {
    let mut fs = main_state();
    let j = fs.jump();
    fs.patch_close(j, 3);
    fs.patch_to_here(j);
    fs.ret(0, 0);

    assert_eq!(fs.instruction(0).a(), 4);
}

#[test]
fn stack_limit() {
    let mut fs = main_state();
    assert_eq!(fs.reserve_regs(249), Ok(()));
    assert_eq!(fs.reserve_regs(1), Err(CodegenError::TooComplex));
}

#[test]
fn constants_are_deduplicated() -> anyhow::Result<()> {
    let mut fs = main_state();
    let one = fs.number_k(Number::Integer(1))?;
    let two = fs.number_k(Number::Float(2.5))?;
    let s = fs.string_k(LuaString::from("1"))?;

    assert_eq!(fs.number_k(Number::Float(1.0))?, one);
    assert_eq!(fs.number_k(Number::Float(2.5))?, two);
    assert_eq!(fs.string_k(LuaString::from("1"))?, s);
    assert_eq!(fs.constant_count(), 3);

    // Negative zero is not zero.
    let zero = fs.number_k(Number::Integer(0))?;
    assert_ne!(fs.number_k(Number::Float(-0.0))?, zero);
    Ok(())
}

#[test]
fn folding_skips_non_finite_results() {
    assert_eq!(const_fold(OpCode::Add, 1.0, 2.0), Some(3.0));
    assert_eq!(const_fold(OpCode::Mod, -1.0, 3.0), Some(2.0));
    assert_eq!(const_fold(OpCode::Mod, 5.5, 2.0), Some(1.5));
    assert_eq!(const_fold(OpCode::Pow, 2.0, 10.0), Some(1024.0));
    assert_eq!(const_fold(OpCode::Div, 1.0, 0.0), None);
    assert_eq!(const_fold(OpCode::Mod, 1.0, 0.0), None);
    assert_eq!(const_fold(OpCode::Pow, 10.0, 400.0), None);
    assert_eq!(const_fold(OpCode::Len, 1.0, 0.0), None);
}

#[test]
fn final_return_elided_after_return() {
    let mut fs = main_state();
    fs.ret(0, 1);
    fs.final_return();
    assert_eq!(fs.pc(), 1);

    let mut fs = main_state();
    fs.final_return();
    assert_eq!(fs.pc(), 1);
    assert_eq!(fs.instruction(0), Instruction::abc(OpCode::Return, 0, 1, 0));
}

#[test]
fn final_return_kept_when_jumped_to() {
    let mut fs = main_state();
    let j = fs.jump();
    fs.ret(0, 1);
    fs.patch_to_here(j);
    fs.final_return();

    assert_eq!(fs.pc(), 3);
    assert_eq!(fs.instruction(0).sbx(), 1);
}

#[test]
fn large_constant_indices_use_extra_arg() {
    let mut fs = main_state();
    fs.code_k(0, 1 << 20);

    assert_eq!(fs.pc(), 2);
    assert!(fs.instruction(0).is(OpCode::LoadKx));
    assert_eq!(fs.instruction(1), Instruction::iax(OpCode::ExtraArg, 1 << 20));
}
