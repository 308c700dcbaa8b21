use thiserror::Error;

mod constant;
pub mod instruction;
pub mod listing;
mod number;
pub mod opcodes;
mod prototype;


pub use constant::Constant;
pub use instruction::Instruction;
pub use listing::Listing;
pub use number::{
    format_g14,
    Number,
};
pub use opcodes::OpCode;
pub use prototype::{
    LocalVar,
    Prototype,
    UpvalueDesc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BytecodeError {
    #[error("Invalid opcode {raw} in instruction word")]
    InvalidOpcode { raw: u32 },
}
