pub mod stack_vm;

pub use stack_vm::{StackVm, VmError, VmResult};
