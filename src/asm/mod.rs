pub mod assembly;
pub mod format;

pub use assembly::{Assembler, assemble, disassemble};
pub use format::{
    AsmError, Instruction, Label, LabelId, MAGIC, Opcode, Operand, OperandShape, Program, VERSION,
};
