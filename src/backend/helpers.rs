//! Runtime helper routines and the shared helper pool.
//!
//! Generated code calls a small library of helpers (`BL p_…`) for I/O and
//! runtime safety checks. Any lowering may request a helper; the program
//! driver emits each requested body exactly once after all procedures have
//! finished. All helpers follow the AAPCS: arguments in r0 (and r1 where
//! noted), lr saved on entry, r0–r3 used freely, return via a popped pc.

use super::abi::Reg;
use super::instruction::{Cond, Instr, Operand};
use super::strings::StringPool;
use std::collections::BTreeSet;
use std::sync::Mutex;

// ── Link-environment symbols ────────────────────────────────────────────

const PRINTF: &str = "printf";
const SCANF: &str = "scanf";
const PUTCHAR: &str = "putchar";
const FFLUSH: &str = "fflush";
const EXIT: &str = "exit";

// ── Format strings and runtime error messages (assembler-escape form) ───

const FMT_INT: &str = "%d\\0";
const FMT_CHAR: &str = " %c\\0";
const FMT_STRING: &str = "%.*s\\0";
const FMT_REFERENCE: &str = "%p\\0";
const NEWLINE: &str = "\\n\\0";
const TRUE_LIT: &str = "true\\0";
const FALSE_LIT: &str = "false\\0";
const DIVIDE_BY_ZERO_MSG: &str = "DivideByZeroError: divide or modulo by zero\\n\\0";
const NULL_REFERENCE_MSG: &str = "NullReferenceError: dereference a null reference\\n\\0";
const ARRAY_NEG_INDEX_MSG: &str = "ArrayIndexOutOfBoundsError: negative index\\n\\0";
const ARRAY_LARGE_INDEX_MSG: &str = "ArrayIndexOutOfBoundsError: index too large\\n\\0";
const OVERFLOW_MSG: &str =
    "OverflowError: the result is too small/large to store in a 4-byte signed-integer.\\n\\0";

// ============================================================================
// Helper identity
// ============================================================================

/// A runtime helper routine. The enum order fixes emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Helper {
    PrintInt,
    PrintChar,
    PrintBool,
    PrintString,
    PrintReference,
    PrintLn,
    ReadInt,
    ReadChar,
    CheckDivideByZero,
    CheckNullPointer,
    CheckArrayBounds,
    ThrowOverflowError,
    ThrowRuntimeError,
}

impl Helper {
    /// The label generated code branches to.
    pub fn label(self) -> &'static str {
        match self {
            Helper::PrintInt => "p_print_int",
            Helper::PrintChar => "p_print_char",
            Helper::PrintBool => "p_print_bool",
            Helper::PrintString => "p_print_string",
            Helper::PrintReference => "p_print_reference",
            Helper::PrintLn => "p_print_ln",
            Helper::ReadInt => "p_read_int",
            Helper::ReadChar => "p_read_char",
            Helper::CheckDivideByZero => "p_check_divide_by_zero",
            Helper::CheckNullPointer => "p_check_null_pointer",
            Helper::CheckArrayBounds => "p_check_array_bounds",
            Helper::ThrowOverflowError => "p_throw_overflow_error",
            Helper::ThrowRuntimeError => "p_throw_runtime_error",
        }
    }

    /// Append this helper's body to `out`. Helpers that report runtime
    /// errors register their messages in the string pool here and request
    /// `p_throw_runtime_error` from the helper pool.
    pub fn emit(self, strings: &StringPool, helpers: &HelperPool, out: &mut Vec<Instr>) {
        match self {
            Helper::PrintInt => emit_printf_helper(self, strings.lookup8(FMT_INT), true, out),
            Helper::PrintChar => emit_print_char(out),
            Helper::PrintBool => emit_print_bool(strings, out),
            Helper::PrintString => emit_print_string(out),
            Helper::PrintReference => {
                emit_printf_helper(self, strings.lookup8(FMT_REFERENCE), true, out)
            }
            Helper::PrintLn => emit_printf_helper(self, strings.lookup8(NEWLINE), false, out),
            Helper::ReadInt => emit_read(self, strings.lookup8(FMT_INT), out),
            Helper::ReadChar => emit_read(self, strings.lookup8(FMT_CHAR), out),
            Helper::CheckDivideByZero => emit_check_divide_by_zero(strings, helpers, out),
            Helper::CheckNullPointer => emit_check_null_pointer(strings, helpers, out),
            Helper::CheckArrayBounds => emit_check_array_bounds(strings, helpers, out),
            Helper::ThrowOverflowError => emit_throw_overflow_error(strings, helpers, out),
            Helper::ThrowRuntimeError => emit_throw_runtime_error(strings, out),
        }
    }
}

// ============================================================================
// Helper pool
// ============================================================================

/// Concurrency-safe set of helpers requested by generated code.
#[derive(Default)]
pub struct HelperPool {
    pending: Mutex<BTreeSet<Helper>>,
}

impl HelperPool {
    pub fn new() -> HelperPool {
        HelperPool::default()
    }

    /// Request a helper. Idempotent.
    pub fn add(&self, helper: Helper) {
        self.pending
            .lock()
            .expect("helper pool poisoned")
            .insert(helper);
    }

    /// Remove and return the first pending helper, in fixed enum order.
    ///
    /// Emission may request further helpers, so the driver keeps calling
    /// this until it returns `None`; re-requests of already emitted helpers
    /// are filtered by the driver.
    pub fn take(&self) -> Option<Helper> {
        let mut pending = self.pending.lock().expect("helper pool poisoned");
        let first = pending.iter().next().copied()?;
        pending.remove(&first);
        Some(first)
    }
}

// ============================================================================
// Helper bodies
// ============================================================================

/// Shared shape of `p_print_int`, `p_print_reference` and `p_print_ln`:
/// load a format string, step past its length prefix, `printf`, flush.
/// `takes_arg` moves r0 into r1 first (the value being formatted).
fn emit_printf_helper(helper: Helper, msg: String, takes_arg: bool, out: &mut Vec<Instr>) {
    out.push(Instr::label(helper.label()));
    out.push(Instr::push1(Reg::Lr));
    if takes_arg {
        out.push(Instr::mov_reg(Reg::R1, Reg::R0));
    }
    out.push(Instr::ldr_label(Reg::R0, msg));
    out.push(Instr::adds(Reg::R0, Reg::R0, Operand::Imm(4)));
    out.push(Instr::bl(PRINTF));
    out.push(Instr::mov_imm(Reg::R0, 0));
    out.push(Instr::bl(FFLUSH));
    out.push(Instr::pop1(Reg::Pc));
}

fn emit_print_char(out: &mut Vec<Instr>) {
    out.push(Instr::label(Helper::PrintChar.label()));
    out.push(Instr::push1(Reg::Lr));
    out.push(Instr::bl(PUTCHAR));
    out.push(Instr::pop1(Reg::Pc));
}

fn emit_print_bool(strings: &StringPool, out: &mut Vec<Instr>) {
    let true_msg = strings.lookup8(TRUE_LIT);
    let false_msg = strings.lookup8(FALSE_LIT);

    out.push(Instr::label(Helper::PrintBool.label()));
    out.push(Instr::push1(Reg::Lr));
    out.push(Instr::cmp(Reg::R0, Operand::Imm(0)));
    out.push(Instr::ldr_cond_label(Cond::Ne, Reg::R0, true_msg));
    out.push(Instr::ldr_cond_label(Cond::Eq, Reg::R0, false_msg));
    out.push(Instr::adds(Reg::R0, Reg::R0, Operand::Imm(4)));
    out.push(Instr::bl(PRINTF));
    out.push(Instr::mov_imm(Reg::R0, 0));
    out.push(Instr::bl(FFLUSH));
    out.push(Instr::pop1(Reg::Pc));
}

/// r0 points at a length-prefixed 32-bit-per-char array; print `length`
/// characters one `putchar` at a time, then flush.
fn emit_print_string(out: &mut Vec<Instr>) {
    let loop_label = "p_print_string_loop";
    let return_label = "p_print_string_return";

    out.push(Instr::label(Helper::PrintString.label()));
    out.push(Instr::push1(Reg::Lr));
    out.push(Instr::push(vec![Reg::R4, Reg::R5]));
    out.push(Instr::ldr_mem(Reg::R4, Reg::R0, 0));
    out.push(Instr::adds(Reg::R5, Reg::R0, Operand::Imm(4)));
    out.push(Instr::label(loop_label));
    out.push(Instr::Teq { lhs: Reg::R4, rhs: Operand::Imm(0) });
    out.push(Instr::b_cond(Cond::Eq, return_label));
    out.push(Instr::ldr_mem(Reg::R0, Reg::R5, 0));
    out.push(Instr::bl(PUTCHAR));
    out.push(Instr::subs(Reg::R4, Reg::R4, Operand::Imm(1)));
    out.push(Instr::adds(Reg::R5, Reg::R5, Operand::Imm(4)));
    out.push(Instr::b(loop_label));
    out.push(Instr::label(return_label));
    out.push(Instr::mov_imm(Reg::R0, 0));
    out.push(Instr::bl(FFLUSH));
    out.push(Instr::pop(vec![Reg::R4, Reg::R5]));
    out.push(Instr::pop1(Reg::Pc));
}

/// `p_read_int` / `p_read_char`: r0 holds the target address; it becomes
/// the second `scanf` argument while r0 takes the format string.
fn emit_read(helper: Helper, msg: String, out: &mut Vec<Instr>) {
    out.push(Instr::label(helper.label()));
    out.push(Instr::push1(Reg::Lr));
    out.push(Instr::mov_reg(Reg::R1, Reg::R0));
    out.push(Instr::ldr_label(Reg::R0, msg));
    out.push(Instr::adds(Reg::R0, Reg::R0, Operand::Imm(4)));
    out.push(Instr::bl(SCANF));
    out.push(Instr::pop1(Reg::Pc));
}

fn emit_check_divide_by_zero(strings: &StringPool, helpers: &HelperPool, out: &mut Vec<Instr>) {
    let msg = strings.lookup8(DIVIDE_BY_ZERO_MSG);
    helpers.add(Helper::ThrowRuntimeError);

    out.push(Instr::label(Helper::CheckDivideByZero.label()));
    out.push(Instr::push1(Reg::Lr));
    out.push(Instr::cmp(Reg::R1, Operand::Imm(0)));
    out.push(Instr::ldr_cond_label(Cond::Eq, Reg::R0, msg));
    out.push(Instr::bl_cond(Cond::Eq, Helper::ThrowRuntimeError.label()));
    out.push(Instr::pop1(Reg::Pc));
}

fn emit_check_null_pointer(strings: &StringPool, helpers: &HelperPool, out: &mut Vec<Instr>) {
    let msg = strings.lookup8(NULL_REFERENCE_MSG);
    helpers.add(Helper::ThrowRuntimeError);

    out.push(Instr::label(Helper::CheckNullPointer.label()));
    out.push(Instr::push1(Reg::Lr));
    out.push(Instr::cmp(Reg::R0, Operand::Imm(0)));
    out.push(Instr::ldr_cond_label(Cond::Eq, Reg::R0, msg));
    out.push(Instr::bl_cond(Cond::Eq, Helper::ThrowRuntimeError.label()));
    out.push(Instr::pop1(Reg::Pc));
}

/// r0 = index, r1 = array base. A negative index and an index at or past
/// the length word at `[r1]` are reported separately.
fn emit_check_array_bounds(strings: &StringPool, helpers: &HelperPool, out: &mut Vec<Instr>) {
    let neg_msg = strings.lookup8(ARRAY_NEG_INDEX_MSG);
    let large_msg = strings.lookup8(ARRAY_LARGE_INDEX_MSG);
    helpers.add(Helper::ThrowRuntimeError);

    out.push(Instr::label(Helper::CheckArrayBounds.label()));
    out.push(Instr::push1(Reg::Lr));
    out.push(Instr::cmp(Reg::R0, Operand::Imm(0)));
    out.push(Instr::ldr_cond_label(Cond::Lt, Reg::R0, neg_msg));
    out.push(Instr::bl_cond(Cond::Lt, Helper::ThrowRuntimeError.label()));
    out.push(Instr::ldr_mem(Reg::R1, Reg::R1, 0));
    out.push(Instr::cmp(Reg::R0, Operand::Reg(Reg::R1)));
    out.push(Instr::ldr_cond_label(Cond::Cs, Reg::R0, large_msg));
    out.push(Instr::bl_cond(Cond::Cs, Helper::ThrowRuntimeError.label()));
    out.push(Instr::pop1(Reg::Pc));
}

fn emit_throw_overflow_error(strings: &StringPool, helpers: &HelperPool, out: &mut Vec<Instr>) {
    let msg = strings.lookup8(OVERFLOW_MSG);
    helpers.add(Helper::ThrowRuntimeError);

    out.push(Instr::label(Helper::ThrowOverflowError.label()));
    out.push(Instr::ldr_label(Reg::R0, msg));
    out.push(Instr::bl(Helper::ThrowRuntimeError.label()));
}

/// r0 points at a length-prefixed message; print it with `%.*s` and exit
/// the generated program with status -1.
fn emit_throw_runtime_error(strings: &StringPool, out: &mut Vec<Instr>) {
    let fmt = strings.lookup8(FMT_STRING);

    out.push(Instr::label(Helper::ThrowRuntimeError.label()));
    out.push(Instr::ldr_mem(Reg::R1, Reg::R0, 0));
    out.push(Instr::adds(Reg::R2, Reg::R0, Operand::Imm(4)));
    out.push(Instr::ldr_label(Reg::R0, fmt));
    out.push(Instr::adds(Reg::R0, Reg::R0, Operand::Imm(4)));
    out.push(Instr::bl(PRINTF));
    out.push(Instr::mov_imm(Reg::R0, 0));
    out.push(Instr::bl(FFLUSH));
    out.push(Instr::mov_imm(Reg::R0, -1));
    out.push(Instr::bl(EXIT));
}
