mod asm;
mod binary;
mod builder;
mod decoder;
mod disasm;
mod instruction;
mod kind;
mod op;
mod program;

pub use asm::{AssembleError, ParseError, assemble, assemble_source};
pub use binary::{
    BINARY_MAGIC, BinaryError, BinaryFlags, BinaryInfo, read_program, write_program,
};
pub use builder::BytecodeBuilder;
pub use decoder::{BytecodeDecoder, DecodeError, decode_at};
pub use disasm::{Listing, ListingLine, disassemble};
pub use instruction::Instruction;
pub use kind::{Kind, UnknownKind};
pub use op::Op;
pub use program::{Function, Program};
