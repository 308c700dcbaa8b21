//! `luac -l`-style listings of compiled prototypes.

use std::fmt::{
    self,
    Write,
};

use crate::{
    instruction::{
        index_k,
        is_k,
    },
    opcodes::{
        OpArgMode,
        OpCode,
        OpMode,
    },
    Prototype,
};

/// Options for rendering a [`Prototype`] listing.
///
/// `Display` for `Prototype` is equivalent to `Listing::new(proto)`, which
/// prints only the instructions of each function.
#[derive(Debug, Clone, Copy)]
pub struct Listing<'p> {
    proto: &'p Prototype,
    full: bool,
    columns: bool,
}

impl<'p> Listing<'p> {
    pub fn new(proto: &'p Prototype) -> Self {
        Self {
            proto,
            full: false,
            columns: false,
        }
    }

    /// Also print the constant, local and upvalue tables (`luac -l -l`).
    pub fn full(mut self, full: bool) -> Self {
        self.full = full;
        self
    }

    /// Print `[line/column]` rather than `[line]` for each instruction.
    pub fn columns(mut self, columns: bool) -> Self {
        self.columns = columns;
        self
    }
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_function(f, self.proto, self.full, self.columns)
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Listing::new(self).fmt(f)
    }
}

fn write_function(
    out: &mut impl Write,
    proto: &Prototype,
    full: bool,
    columns: bool,
) -> fmt::Result {
    write_header(out, proto)?;
    for pc in 0..proto.code.len() {
        write_instruction(out, proto, pc, columns)?;
        out.write_char('\n')?;
    }

    if full {
        write_constants(out, proto)?;
        write_locals(out, proto)?;
        write_upvalues(out, proto)?;
    }

    for child in proto.children.iter() {
        write_function(out, child, full, columns)?;
    }

    Ok(())
}

fn write_header(out: &mut impl Write, proto: &Prototype) -> fmt::Result {
    let source = match proto.source.first() {
        Some(b'@' | b'=') => String::from_utf8_lossy(&proto.source[1..]).into_owned(),
        Some(0x1b) => "(bstring)".to_string(),
        _ => "(string)".to_string(),
    };

    writeln!(
        out,
        "\n{} <{}:{},{}> ({} instructions, {} bytes at {})",
        if proto.is_main() { "main" } else { "function" },
        source,
        proto.line_defined,
        proto.last_line_defined,
        proto.code.len(),
        proto.code.len() * 4,
        proto.id(),
    )?;
    writeln!(
        out,
        "{} param, {} slots, {} upvalues, {} locals, {} constants, {} functions",
        proto.num_params,
        proto.max_stack_size,
        proto.upvalues.len(),
        proto.locals.len(),
        proto.constants.len(),
        proto.children.len(),
    )
}

fn constant(out: &mut impl Write, proto: &Prototype, index: u32) -> fmt::Result {
    match proto.constants.get(index as usize) {
        Some(k) => write!(out, "{k}"),
        None => out.write_char('?'),
    }
}

fn upvalue_name(out: &mut impl Write, proto: &Prototype, index: u32) -> fmt::Result {
    match proto
        .upvalues
        .get(index as usize)
        .and_then(|upval| upval.name.as_ref())
    {
        Some(name) => write!(out, "{name}"),
        None => out.write_char('-'),
    }
}

/// Constants are printed as negative numbers, starting at -1.
fn my_k(index: u32) -> i64 {
    -1 - index as i64
}

fn rk(value: u32) -> i64 {
    if is_k(value) {
        my_k(index_k(value))
    } else {
        value as i64
    }
}

fn write_instruction(
    out: &mut impl Write,
    proto: &Prototype,
    pc: usize,
    columns: bool,
) -> fmt::Result {
    let instr = proto.code[pc];
    write!(out, "\t{}\t", pc + 1)?;

    match (proto.line_at(pc), proto.column_at(pc)) {
        (Some(line), Some(column)) if columns && line > 0 && column > 0 => {
            write!(out, "[{line}/{column}]")?
        }
        (Some(line), _) if line > 0 => write!(out, "[{line}]")?,
        _ => out.write_str("[-]")?,
    }

    let op = match instr.opcode() {
        Ok(op) => op,
        Err(_) => return write!(out, "\t{:#010x}", instr.raw()),
    };

    write!(out, "\t{:<9}\t", op.name())?;

    let (a, b, c) = (instr.a(), instr.b(), instr.c());
    match op.mode() {
        OpMode::ABC => {
            write!(out, "{a}")?;
            if op.b_mode() != OpArgMode::N {
                write!(out, " {}", rk(b))?;
            }
            if op.c_mode() != OpArgMode::N {
                write!(out, " {}", rk(c))?;
            }
        }
        OpMode::ABx => {
            write!(out, "{a}")?;
            match op.b_mode() {
                OpArgMode::K => write!(out, " {}", my_k(instr.bx()))?,
                OpArgMode::U => write!(out, " {}", instr.bx())?,
                _ => (),
            }
        }
        OpMode::AsBx => write!(out, "{} {}", a, instr.sbx())?,
        OpMode::Ax => write!(out, "{}", my_k(instr.ax()))?,
    }

    match op {
        OpCode::LoadK => {
            out.write_str("\t; ")?;
            constant(out, proto, instr.bx())?;
        }
        OpCode::GetUpval | OpCode::SetUpval => {
            out.write_str("\t; ")?;
            upvalue_name(out, proto, b)?;
        }
        OpCode::GetTabUp => {
            out.write_str("\t; ")?;
            upvalue_name(out, proto, b)?;
            if is_k(c) {
                out.write_char(' ')?;
                constant(out, proto, index_k(c))?;
            }
        }
        OpCode::SetTabUp => {
            out.write_str("\t; ")?;
            upvalue_name(out, proto, a)?;
            if is_k(b) {
                out.write_char(' ')?;
                constant(out, proto, index_k(b))?;
            }
            if is_k(c) {
                out.write_char(' ')?;
                constant(out, proto, index_k(c))?;
            }
        }
        OpCode::GetTable | OpCode::SelfOp => {
            if is_k(c) {
                out.write_str("\t; ")?;
                constant(out, proto, index_k(c))?;
            }
        }
        OpCode::SetTable
        | OpCode::Add
        | OpCode::Sub
        | OpCode::Mul
        | OpCode::Div
        | OpCode::Mod
        | OpCode::Pow
        | OpCode::Eq
        | OpCode::Lt
        | OpCode::Le => {
            if is_k(b) || is_k(c) {
                out.write_str("\t; ")?;
                if is_k(b) {
                    constant(out, proto, index_k(b))?;
                } else {
                    out.write_char('-')?;
                }
                out.write_char(' ')?;
                if is_k(c) {
                    constant(out, proto, index_k(c))?;
                } else {
                    out.write_char('-')?;
                }
            }
        }
        OpCode::Jmp | OpCode::ForLoop | OpCode::ForPrep | OpCode::TForLoop => {
            write!(out, "\t; to {}", instr.sbx() as i64 + pc as i64 + 2)?;
        }
        OpCode::Closure => match proto.children.get(instr.bx() as usize) {
            Some(child) => write!(out, "\t; {}", child.id())?,
            None => out.write_str("\t; ?")?,
        },
        OpCode::SetList => {
            if c == 0 {
                match proto.code.get(pc + 1) {
                    Some(extra) => write!(out, "\t; {}", extra.ax())?,
                    None => out.write_str("\t; ?")?,
                }
            } else {
                write!(out, "\t; {c}")?;
            }
        }
        OpCode::ExtraArg => {
            out.write_str("\t; ")?;
            constant(out, proto, instr.ax())?;
        }
        _ => (),
    }

    Ok(())
}

fn write_constants(out: &mut impl Write, proto: &Prototype) -> fmt::Result {
    writeln!(
        out,
        "constants ({}) for {}:",
        proto.constants.len(),
        proto.id()
    )?;
    for (i, k) in proto.constants.iter().enumerate() {
        writeln!(out, "\t{}\t{}", i + 1, k)?;
    }
    Ok(())
}

fn write_locals(out: &mut impl Write, proto: &Prototype) -> fmt::Result {
    writeln!(out, "locals ({}) for {}:", proto.locals.len(), proto.id())?;
    for (i, local) in proto.locals.iter().enumerate() {
        writeln!(
            out,
            "\t{}\t{}\t{}\t{}",
            i,
            local.name,
            local.start_pc + 1,
            local.end_pc + 1
        )?;
    }
    Ok(())
}

fn write_upvalues(out: &mut impl Write, proto: &Prototype) -> fmt::Result {
    writeln!(
        out,
        "upvalues ({}) for {}:",
        proto.upvalues.len(),
        proto.id()
    )?;
    for (i, upval) in proto.upvalues.iter().enumerate() {
        match &upval.name {
            Some(name) => write!(out, "\t{i}\t{name}")?,
            None => write!(out, "\t{i}\t-")?,
        }
        writeln!(out, "\t{}\t{}", u8::from(upval.in_stack), upval.index)?;
    }
    Ok(())
}
