//! Disassembler — human-readable opcode listing from wire-encoded programs.

use crate::opcode::Op;
use crate::wire::{decode_program, DecodeError, RECORD_LEN};

/// Disassemble a wire-encoded program into a human-readable string.
pub fn disassemble(bytecode: &[u8]) -> Result<String, DecodeError> {
    let ops = decode_program(bytecode)?;
    let mut out = String::new();

    for (idx, op) in ops.iter().enumerate() {
        let offset = idx * RECORD_LEN;
        out.push_str(&format_op(offset, op));
        out.push('\n');
    }

    if out.is_empty() {
        out.push_str("(empty program)\n");
    }

    Ok(out)
}

fn format_op(offset: usize, op: &Op) -> String {
    let detail = format_operand(op);
    if detail.is_empty() {
        format!("{:04x}  {:02x}  {}", offset, op.code(), op.mnemonic())
    } else {
        format!("{:04x}  {:02x}  {} {}", offset, op.code(), op.mnemonic(), detail)
    }
}

fn format_operand(op: &Op) -> String {
    match op {
        Op::PushInt(v) => format!("({v})"),
        Op::PushFloat(v) => format!("({v})"),
        Op::PushByte(v) => format!("(0x{v:02x})"),
        Op::Pack(n) => format!("(n={n})"),
        _ => String::new(),
    }
}
