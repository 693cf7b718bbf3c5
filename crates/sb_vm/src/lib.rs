//! SB-VM — deterministic stack-bytecode virtual machine.
//!
//! Goals:
//! - Typed operand stack with explicit, fixed capacity
//! - Linear fetch-decode-execute, first fault terminal, no control flow
//! - Move-only ownership for byte buffers crossing the run boundary
//! - Fixed-record wire format for programs
//! - Single-use VM handle: `run` consumes the instance

pub mod disasm;
pub mod exec;
pub mod opcode;
pub mod stack;
pub mod value;
pub mod wire;

pub use disasm::disassemble;
pub use exec::{CreateError, ExecError, RunOutcome, TraceStep, Vm, VmConfig};
pub use opcode::Op;
pub use stack::OperandStack;
pub use value::{ByteBuf, Value, ValueKind};
