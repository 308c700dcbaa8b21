use tluac_strings::LuaString;

use crate::{
    Constant,
    Instruction,
};

/// Where a closure finds one of its upvalues when it is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Debug name, dropped by [`Prototype::strip`].
    pub name: Option<LuaString>,
    /// `true` if the upvalue is a register of the enclosing function, `false`
    /// if it is one of the enclosing function's own upvalues.
    pub in_stack: bool,
    pub index: u8,
}

/// Live range of a local variable, in instruction indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    pub name: LuaString,
    pub start_pc: usize,
    pub end_pc: usize,
}

/// The compiled form of one Lua function.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    /// The full chunk name, e.g. `@script.lua` or `=stdin`.
    pub source: LuaString,
    /// The chunk name as it appears in messages and listings.
    pub short_source: String,
    pub constants: Vec<Constant>,
    pub code: Vec<Instruction>,
    pub children: Vec<Prototype>,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,
    pub upvalues: Vec<UpvalueDesc>,
    pub line_defined: u32,
    pub last_line_defined: u32,
    /// Source line of each instruction. Empty when stripped, otherwise the same
    /// length as `code`.
    pub line_info: Vec<u32>,
    /// Source column of each instruction, parallel to `line_info`.
    pub column_info: Vec<u32>,
    pub locals: Vec<LocalVar>,
}

impl Prototype {
    /// Whether this is the main function of a chunk.
    pub fn is_main(&self) -> bool {
        self.line_defined == 0
    }

    /// The raw instruction words.
    pub fn code_words(&self) -> &[u32] {
        bytemuck::cast_slice(&self.code)
    }

    pub fn line_at(&self, pc: usize) -> Option<u32> {
        self.line_info.get(pc).copied()
    }

    pub fn column_at(&self, pc: usize) -> Option<u32> {
        self.column_info.get(pc).copied()
    }

    /// Name of the local variable `n` (1-based) live at `pc`, in the order the
    /// locals were declared.
    pub fn local_name(&self, n: usize, pc: usize) -> Option<&LuaString> {
        self.locals
            .iter()
            .take_while(|local| local.start_pc <= pc)
            .filter(|local| pc < local.end_pc)
            .nth(n.checked_sub(1)?)
            .map(|local| &local.name)
    }

    /// A short identifier of the form `source:line`.
    pub fn id(&self) -> String {
        format!("{}:{}", self.short_source, self.line_defined)
    }

    /// Removes all debug information from this prototype and its children.
    pub fn strip(&mut self) {
        self.line_info = vec![];
        self.column_info = vec![];
        self.locals = vec![];
        for upval in self.upvalues.iter_mut() {
            upval.name = None;
        }
        for child in self.children.iter_mut() {
            child.strip();
        }
    }

    /// Total number of prototypes in this tree, including `self`.
    pub fn function_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(Prototype::function_count)
            .sum::<usize>()
    }
}
