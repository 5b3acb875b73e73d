//! Procedure lowering: prologue, body, epilogue.
//!
//! The prologue saves lr, ip and the full callee-saved block, then spills
//! the register-passed parameters so every parameter has a stack home. The
//! body runs in its own scope; `return` statements branch to the
//! `<name>_return` label, where the spilled parameters are dropped and the
//! saved registers restored.

use super::abi::Reg;
use super::instruction::{Instr, InstrSink, Operand};
use super::regalloc::RegAllocator;
use super::stmt::lower_body;
use crate::ast::{Param, Stmt};

/// Bytes of lr + ip + the eight callee-saved registers on the stack between
/// the incoming sp and the spilled parameter block.
const SAVED_BLOCK_BYTES: i32 = 40;

/// Lower one procedure into `out`. `has_return` is false only for the
/// synthetic `main`, which returns an implicit zero.
pub fn lower_function(
    name: &str,
    params: &[Param],
    has_return: bool,
    body: &[Stmt],
    mut alloc: RegAllocator,
    out: &InstrSink,
) {
    let arity = params.len();

    // ── Prologue ────────────────────────────────────────────────────────

    out.emit(Instr::label(name));
    alloc.start_scope();

    out.emit(Instr::push1(Reg::Lr));
    out.emit(Instr::push1(Reg::Ip));
    out.emit(Instr::push(Reg::POOL.to_vec()));

    // Spill the register-passed parameters in decreasing register order,
    // so parameters 0..4 sit as a contiguous block under the incoming sp.
    for i in (0..arity.min(4)).rev() {
        out.emit(Instr::push1(Reg::ARG_REGS[i]));
    }

    // Parameter offsets are negative: they sit above the stack-size origin.
    for (i, param) in params.iter().enumerate() {
        let i = i as i32;
        if i < 4 {
            alloc.declare_param(&param.name, i * -4);
        } else {
            // Stack-passed parameters sit above the saved block and the
            // four spilled parameter registers.
            alloc.declare_param(&param.name, -(SAVED_BLOCK_BYTES + 16) - (i - 4) * 4);
        }
    }

    // ── Body ────────────────────────────────────────────────────────────

    alloc.start_scope();
    lower_body(body, &mut alloc, out);
    alloc.cleanup_scope(out);

    if !has_return {
        out.emit(Instr::mov_imm(Reg::RESULT, 0));
    }

    // ── Epilogue ────────────────────────────────────────────────────────

    out.emit(Instr::label(format!("{name}_return")));

    // Drop the spilled parameter registers.
    if arity > 0 {
        let spilled = (arity as i32 * 4).min(16);
        out.emit(Instr::add(Reg::Sp, Reg::Sp, Operand::Imm(spilled)));
    }

    out.emit(Instr::pop(Reg::POOL.to_vec()));
    out.emit(Instr::pop1(Reg::Ip));
    out.emit(Instr::pop1(Reg::Pc));

    // Keep the literal pool within range of this procedure's LDRs.
    out.emit(Instr::Ltorg);
}
