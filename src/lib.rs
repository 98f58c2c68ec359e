#![forbid(unsafe_code)]

//! minivm – a mini-assembly language and the stack machine that runs it.
//!
//! The crate is split into two stages that run one after the other and share no
//! mutable state:
//!
//! * [`asm`] – tokenizes program text, resolves `:label` declarations and
//!   forward references to instruction indices, and produces a [`asm::Program`].
//! * [`vm`] – [`vm::StackVm`] executes a program over an operand stack and a
//!   program counter until the counter runs past the last instruction, then
//!   returns the value at the bottom of the stack.
//!
//! [`config`] holds the knobs both stages accept and [`logging`] wires up the
//! tracing subscriber used by the `minivm` binary.
//!
//! ```
//! let value = minivm::run_source("push 2\npush 10\ndiv", &minivm::config::Config::default())
//!     .expect("program runs");
//! assert_eq!(value, minivm::Value::Integer(5));
//! ```

pub mod asm;
pub mod config;
pub mod logging;
pub mod vm;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::asm::{AsmError, Assembler};
use crate::config::Config;
use crate::vm::{StackVm, VmError};

/// The counting loop used by the demo command and the benchmarks.
///
/// Keeps adding one to the bottom value until it reaches one million.
pub const COUNTING_LOOP: &str = "\
#
  push 1
:label
  push 1
  add
  dup
  push 1000000
  bigger
  if :label
";

/// Result type used across minivm.
pub type Result<T> = std::result::Result<T, Error>;

/// Values held on the operand stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(value) => Some(*value),
            Value::Boolean(_) => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(flag) => Some(*flag),
            Value::Integer(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{value}"),
            Value::Boolean(flag) => write!(f, "{flag}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Boolean(flag)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("assembly failed: {0}")]
    Asm(#[from] AsmError),
    #[error("execution failed: {0}")]
    Vm(#[from] VmError),
}

/// Assembles and evaluates `source` in one go.
#[instrument(skip_all)]
pub fn run_source(source: &str, config: &Config) -> Result<Value> {
    let program = Assembler::new(config.assembler).assemble(source)?;
    let mut vm = StackVm::new(config.vm);
    Ok(vm.evaluate(&program)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_display_and_accessors() {
        assert_eq!(Value::Integer(-4).to_string(), "-4");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(3).as_integer(), Some(3));
        assert_eq!(Value::from(3).as_boolean(), None);
        assert_eq!(Value::Boolean(false).type_name(), "boolean");
    }

    #[test]
    fn run_source_separates_error_stages() {
        let config = Config::default();
        assert!(matches!(
            run_source("push 1 @@@", &config),
            Err(Error::Asm(AsmError::Parse { line: 1, .. }))
        ));
        assert!(matches!(
            run_source("pop", &config),
            Err(Error::Vm(VmError::StackUnderflow { .. }))
        ));
        assert_eq!(run_source("push 7\ndup\nadd", &config), Ok(Value::Integer(14)));
    }
}
