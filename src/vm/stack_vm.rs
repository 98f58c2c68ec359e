use thiserror::Error;
use tracing::{debug, instrument, trace};

use crate::Value;
use crate::asm::{Instruction, Opcode, Operand, Program};
use crate::config::VmConfig;

pub type VmResult<T> = std::result::Result<T, VmError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("unknown opcode `{name}` at {pc:04}")]
    UnknownOpcode { pc: usize, name: String },
    #[error("stack underflow in {opcode} at {pc:04}")]
    StackUnderflow { pc: usize, opcode: Opcode },
    #[error("division by zero at {pc:04}")]
    DivisionByZero { pc: usize },
    #[error("{opcode} at {pc:04} expected {expected} but found {found}")]
    TypeMismatch {
        pc: usize,
        opcode: Opcode,
        expected: &'static str,
        found: &'static str,
    },
    #[error("integer overflow in {opcode} at {pc:04}")]
    IntegerOverflow { pc: usize, opcode: Opcode },
    #[error("{opcode} at {pc:04} has malformed operands")]
    InvalidOperand { pc: usize, opcode: Opcode },
    #[error("jump at {pc:04} targets label :{label}, which is unresolved or out of range")]
    InvalidJumpTarget {
        pc: usize,
        label: String,
        target: Option<usize>,
    },
    #[error("program halted with an empty stack")]
    EmptyResult,
    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },
}

/// Operand-stack interpreter for assembled programs.
///
/// Stack and program counter are reset by every [`StackVm::evaluate`] call and
/// stay inspectable afterwards.
#[derive(Debug, Default)]
pub struct StackVm {
    config: VmConfig,
    stack: Vec<Value>,
    pc: usize,
    steps: u64,
}

impl StackVm {
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Number of instructions dispatched by the last evaluation.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs `program` from address 0 until the counter leaves the program and
    /// returns the bottom of the stack.
    #[instrument(skip_all, fields(instructions = program.len()))]
    pub fn evaluate(&mut self, program: &Program) -> VmResult<Value> {
        self.stack.clear();
        self.pc = 0;
        self.steps = 0;

        while let Some(instruction) = program.get(self.pc) {
            if let Some(limit) = self.config.max_steps {
                if self.steps >= limit {
                    return Err(VmError::StepLimitExceeded { limit });
                }
            }
            self.steps += 1;
            self.dispatch(program, instruction)?;
        }

        debug!(
            pc = self.pc,
            steps = self.steps,
            depth = self.stack.len(),
            "halted"
        );
        self.stack.first().copied().ok_or(VmError::EmptyResult)
    }

    fn dispatch(&mut self, program: &Program, instruction: &Instruction) -> VmResult<()> {
        let pc = self.pc;
        let opcode = instruction.opcode.ok_or_else(|| VmError::UnknownOpcode {
            pc,
            name: instruction.name.clone(),
        })?;
        trace!(pc, %opcode, depth = self.stack.len(), "dispatch");

        match opcode {
            Opcode::Nop => {}
            Opcode::Push => match instruction.operands.as_slice() {
                [Operand::Integer(value)] => self.stack.push(Value::from(*value)),
                _ => return Err(VmError::InvalidOperand { pc, opcode }),
            },
            Opcode::Pop => {
                self.pop(opcode)?;
            }
            Opcode::Dup => {
                let value = self.pop(opcode)?;
                self.stack.push(value);
                self.stack.push(value);
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let a = self.pop_integer(opcode)?;
                let b = self.pop_integer(opcode)?;
                let value = execute_arithmetic(pc, opcode, a, b)?;
                self.stack.push(Value::from(value));
            }
            Opcode::Not => {
                let value = self.pop_boolean(opcode)?;
                self.stack.push(Value::from(!value));
            }
            Opcode::Smaller | Opcode::Bigger => {
                let a = self.pop_integer(opcode)?;
                let b = self.pop_integer(opcode)?;
                let result = if opcode == Opcode::Smaller { a < b } else { a > b };
                self.stack.push(Value::from(result));
            }
            Opcode::Goto => {
                self.pc = self.jump_target(program, instruction, opcode)?;
                return Ok(());
            }
            Opcode::If => {
                if self.pop_boolean(opcode)? {
                    self.pc = self.jump_target(program, instruction, opcode)?;
                    return Ok(());
                }
            }
        }

        self.pc += 1;
        Ok(())
    }

    fn pop(&mut self, opcode: Opcode) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or(VmError::StackUnderflow { pc: self.pc, opcode })
    }

    fn pop_integer(&mut self, opcode: Opcode) -> VmResult<i64> {
        let value = self.pop(opcode)?;
        value
            .as_integer()
            .ok_or_else(|| self.type_mismatch(opcode, "integer", value))
    }

    fn pop_boolean(&mut self, opcode: Opcode) -> VmResult<bool> {
        let value = self.pop(opcode)?;
        value
            .as_boolean()
            .ok_or_else(|| self.type_mismatch(opcode, "boolean", value))
    }

    fn type_mismatch(&self, opcode: Opcode, expected: &'static str, found: Value) -> VmError {
        VmError::TypeMismatch {
            pc: self.pc,
            opcode,
            expected,
            found: found.type_name(),
        }
    }

    /// Resolves a jump operand. A label declared after the last instruction is
    /// a valid target and halts the program.
    fn jump_target(
        &self,
        program: &Program,
        instruction: &Instruction,
        opcode: Opcode,
    ) -> VmResult<usize> {
        let pc = self.pc;
        let label = match instruction.operands.as_slice() {
            [Operand::Label(id)] => program.label(*id),
            _ => None,
        }
        .ok_or(VmError::InvalidOperand { pc, opcode })?;

        match label.position() {
            Some(target) if target <= program.len() => Ok(target),
            target => Err(VmError::InvalidJumpTarget {
                pc,
                label: label.name().to_string(),
                target,
            }),
        }
    }
}

/// `a` is the value popped first (the top of the stack).
fn execute_arithmetic(pc: usize, opcode: Opcode, a: i64, b: i64) -> VmResult<i64> {
    let result = match opcode {
        Opcode::Add => a.checked_add(b),
        Opcode::Sub => a.checked_sub(b),
        Opcode::Mul => a.checked_mul(b),
        Opcode::Div => {
            if b == 0 {
                return Err(VmError::DivisionByZero { pc });
            }
            a.checked_div(b)
        }
        _ => return Err(VmError::InvalidOperand { pc, opcode }),
    };
    result.ok_or(VmError::IntegerOverflow { pc, opcode })
}
