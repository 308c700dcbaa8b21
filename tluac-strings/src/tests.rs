use pretty_assertions::assert_eq;

use crate::{
    LuaString,
    StringTable,
};

#[test]
fn interning_is_stable() {
    let mut table = StringTable::default();

    let a = table.intern("local");
    let b = table.intern(b"x".as_slice());
    let c = table.intern(String::from("local"));

    assert_eq!(a, c);
    assert!(a != b);
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(b), &LuaString::from("x"));
}

#[test]
fn find_does_not_insert() {
    let mut table = StringTable::default();
    assert_eq!(table.find("_ENV"), None);

    let env = table.intern("_ENV");
    assert_eq!(table.find("_ENV"), Some(env));
    assert_eq!(table.len(), 1);
}

#[test]
fn non_utf8_bytes_survive() {
    let mut table = StringTable::default();
    let sym = table.intern([0xffu8, 0x00, b'a']);

    assert_eq!(table.get(sym).as_slice(), &[0xff, 0x00, b'a']);
}
