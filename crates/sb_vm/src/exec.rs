//! Fetch-decode-execute loop and the run lifecycle.

use std::cmp::Ordering;

use tracing::trace;

use crate::opcode::Op;
use crate::stack::OperandStack;
use crate::value::{ByteBuf, Value};

/// Terminal runtime fault. The first fault ends the run; the in-progress
/// stack is discarded and every buffer it still holds is released on drop.
///
/// Codes are stable across boundaries: 0 underflow, 1 overflow, 2 operand
/// type, 3 division by zero; anything else is an unknown/internal fault.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow")]
    StackOverflow,
    #[error("invalid operand type for {0:?}")]
    InvalidOperandType(Op),
    #[error("division by zero")]
    DivisionByZero,
    #[error("instruction pointer ran past end of program (no Halt)")]
    MissingHalt,
}

impl ExecError {
    /// Stable ordinal for boundary encodings.
    pub fn code(&self) -> i32 {
        match self {
            ExecError::StackUnderflow => 0,
            ExecError::StackOverflow => 1,
            ExecError::InvalidOperandType(_) => 2,
            ExecError::DivisionByZero => 3,
            ExecError::MissingHalt => -1,
        }
    }
}

/// Construction-time argument rejection. Never produced by a running VM.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CreateError {
    #[error("stack capacity must be at least 1")]
    ZeroCapacity,
    #[error("program is empty")]
    EmptyProgram,
}

pub const DEFAULT_STACK_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Operand stack capacity; pushes beyond it fault with `StackOverflow`.
    pub stack_capacity: usize,
    /// Record a [`TraceStep`] per executed instruction into the outcome.
    pub trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            trace: false,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceStep {
    pub step: u64,
    pub op: String,
    pub stack_depth: usize,
}

/// Result of a completed run. When `value` is [`Value::Bytes`] the outcome
/// is the sole owner of the buffer; the VM instance is already gone.
#[derive(Debug)]
pub struct RunOutcome {
    pub value: Value,
    pub steps: u64,
    pub trace: Vec<TraceStep>,
}

/// A single-use virtual machine: one program, one run.
///
/// [`Vm::run`] consumes the instance, so a second run on the same handle is
/// a compile error and teardown happens exactly once on every exit path.
#[derive(Debug)]
pub struct Vm {
    cfg: VmConfig,
    program: Vec<Op>,
    ip: usize,
    stack: OperandStack,
    steps: u64,
    trace: Vec<TraceStep>,
}

impl Vm {
    pub fn new(cfg: VmConfig, program: Vec<Op>) -> Result<Self, CreateError> {
        if cfg.stack_capacity == 0 {
            return Err(CreateError::ZeroCapacity);
        }
        if program.is_empty() {
            return Err(CreateError::EmptyProgram);
        }
        let stack = OperandStack::new(cfg.stack_capacity);
        Ok(Self {
            cfg,
            program,
            ip: 0,
            stack,
            steps: 0,
            trace: Vec::new(),
        })
    }

    fn record(&mut self, op: Op) {
        if self.cfg.trace {
            self.trace.push(TraceStep {
                step: self.steps,
                op: format!("{op:?}"),
                stack_depth: self.stack.len(),
            });
        }
    }

    /// Drive the program to `Halt` or the first fault. Blocking and
    /// synchronous; never yields mid-instruction.
    pub fn run(mut self) -> Result<RunOutcome, ExecError> {
        loop {
            let Some(&op) = self.program.get(self.ip) else {
                // A well-formed program ends in Halt; running off the end is
                // an internal invariant violation, not a user error.
                return Err(ExecError::MissingHalt);
            };
            self.ip += 1;
            self.steps += 1;
            trace!(step = self.steps, op = ?op, depth = self.stack.len(), "executing");

            match op {
                Op::Halt => {
                    let value = self.stack.pop()?;
                    self.record(op);
                    return Ok(RunOutcome {
                        value,
                        steps: self.steps,
                        trace: self.trace,
                    });
                }
                Op::PushInt(v) => self.stack.push(Value::Int32(v))?,
                Op::PushFloat(v) => self.stack.push(Value::Float32(v))?,
                Op::PushByte(v) => self.stack.push(Value::Byte(v))?,
                Op::Pop => {
                    self.stack.pop()?;
                }
                Op::Pack(n) => {
                    let packed = self.stack.pop_many(n as usize)?;
                    let bytes = packed
                        .into_iter()
                        .map(|v| match v {
                            Value::Byte(b) => Ok(b),
                            _ => Err(ExecError::InvalidOperandType(op)),
                        })
                        .collect::<Result<Vec<u8>, ExecError>>()?;
                    self.stack.push(Value::Bytes(ByteBuf::from_vec(bytes)))?;
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div => {
                    let b = self.stack.pop()?;
                    let a = self.stack.pop()?;
                    let result = match (a, b) {
                        (Value::Int32(x), Value::Int32(y)) => {
                            Value::Int32(int_arith(op, x, y)?)
                        }
                        (Value::Float32(x), Value::Float32(y)) => {
                            Value::Float32(float_arith(op, x, y)?)
                        }
                        // Same-kind operands only; no int/float promotion.
                        _ => return Err(ExecError::InvalidOperandType(op)),
                    };
                    self.stack.push(result)?;
                }
                Op::Eq | Op::Lt | Op::Lte | Op::Gt | Op::Gte => {
                    let b = self.stack.pop()?;
                    let a = self.stack.pop()?;
                    let ord = match (&a, &b) {
                        (Value::Int32(x), Value::Int32(y)) => Some(x.cmp(y)),
                        (Value::Byte(x), Value::Byte(y)) => Some(x.cmp(y)),
                        // NaN is unordered: every comparison on it is false.
                        (Value::Float32(x), Value::Float32(y)) => x.partial_cmp(y),
                        _ => return Err(ExecError::InvalidOperandType(op)),
                    };
                    self.stack.push(Value::Bool(truth_of(op, ord)?))?;
                }
                Op::Concat => {
                    let b = self.stack.pop()?;
                    let a = self.stack.pop()?;
                    match (a, b) {
                        (Value::Bytes(a), Value::Bytes(b)) => {
                            let mut joined = a.into_vec();
                            joined.extend_from_slice(b.as_slice());
                            self.stack.push(Value::Bytes(ByteBuf::from_vec(joined)))?;
                        }
                        _ => return Err(ExecError::InvalidOperandType(op)),
                    }
                }
            }

            self.record(op);
        }
    }
}

/// i32 arithmetic saturates at the type boundaries, including the lone
/// `i32::MIN / -1` overflow case left after the zero check.
fn int_arith(op: Op, a: i32, b: i32) -> Result<i32, ExecError> {
    Ok(match op {
        Op::Add => a.saturating_add(b),
        Op::Sub => a.saturating_sub(b),
        Op::Mul => a.saturating_mul(b),
        Op::Div => {
            if b == 0 {
                return Err(ExecError::DivisionByZero);
            }
            a.saturating_div(b)
        }
        _ => return Err(ExecError::InvalidOperandType(op)),
    })
}

fn float_arith(op: Op, a: f32, b: f32) -> Result<f32, ExecError> {
    Ok(match op {
        Op::Add => a + b,
        Op::Sub => a - b,
        Op::Mul => a * b,
        Op::Div => {
            if b == 0.0 {
                return Err(ExecError::DivisionByZero);
            }
            a / b
        }
        _ => return Err(ExecError::InvalidOperandType(op)),
    })
}

fn truth_of(op: Op, ord: Option<Ordering>) -> Result<bool, ExecError> {
    let Some(ord) = ord else {
        return Ok(false);
    };
    Ok(match op {
        Op::Eq => ord == Ordering::Equal,
        Op::Lt => ord == Ordering::Less,
        Op::Lte => ord != Ordering::Greater,
        Op::Gt => ord == Ordering::Greater,
        Op::Gte => ord != Ordering::Less,
        _ => return Err(ExecError::InvalidOperandType(op)),
    })
}
