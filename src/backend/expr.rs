//! Expression lowering.
//!
//! Every expression evaluates into a caller-chosen target register. Binary
//! operators order their operand evaluation by Sethi–Ullman weight so the
//! heavier subtree runs while fewer registers are live, which minimises
//! allocator spills. Operators that can fault at runtime (overflow, divide
//! by zero, bad index, null dereference) wire in the matching helper call
//! and register the helper in the shared pool.

use super::abi::Reg;
use super::helpers::Helper;
use super::instruction::{Cond, Instr, InstrSink, Operand, Shift};
use super::regalloc::RegAllocator;
use crate::ast::{BinaryOp, Expr, UnaryOp};

// ============================================================================
// Sethi–Ullman weights
// ============================================================================

/// Minimum number of registers needed to evaluate `expr` without spilling.
///
/// Leaves need one register; a unary operator adds nothing over its child;
/// a binary operator can evaluate its heavier side first, giving
/// `min(max(l, r+1), max(l+1, r))`. An array element holds its base address
/// while each index evaluates in a second register.
pub fn weight(expr: &Expr) -> i32 {
    match expr {
        Expr::IntLiteral(_)
        | Expr::BoolLiteral(_)
        | Expr::CharLiteral(_)
        | Expr::StrLiteral(_)
        | Expr::NullPair
        | Expr::Ident { .. } => 1,
        Expr::PairLiteral { fst, snd } => weight(fst).max(weight(snd)) + 1,
        Expr::ArrayElem { indexes, .. } => {
            1 + indexes.iter().map(weight).max().unwrap_or(0)
        }
        Expr::Unary { expr, .. } => weight(expr),
        Expr::Binary { lhs, rhs, .. } => {
            let l = weight(lhs);
            let r = weight(rhs);
            (l.max(r + 1)).min((l + 1).max(r))
        }
    }
}

// ============================================================================
// Expression dispatch
// ============================================================================

/// Lower `expr`, leaving its value in `target`.
pub fn lower_expr(expr: &Expr, alloc: &mut RegAllocator, target: Reg, out: &InstrSink) {
    match expr {
        Expr::IntLiteral(n) => out.emit(Instr::ldr_const(target, *n)),
        Expr::BoolLiteral(b) => out.emit(Instr::mov_imm(target, i32::from(*b))),
        Expr::CharLiteral(c) => out.emit(Instr::mov(target, Operand::Char(*c))),
        Expr::StrLiteral(s) => {
            let msg = alloc.strings().lookup32(s);
            out.emit(Instr::ldr_label(target, msg));
        }
        Expr::NullPair => out.emit(Instr::mov_imm(target, 0)),
        Expr::Ident { name, .. } => {
            let offset = alloc.resolve_var(name);
            out.emit(Instr::ldr_mem(target, Reg::Sp, offset));
        }
        Expr::PairLiteral { fst, snd } => lower_pair_literal(fst, snd, alloc, target, out),
        Expr::ArrayElem { name, indexes, .. } => {
            lower_array_access(name, indexes, alloc, target, out);
            out.emit(Instr::ldr_mem(target, target, 0));
        }
        Expr::Unary { op, expr } => lower_unary(*op, expr, alloc, target, out),
        Expr::Binary { op, lhs, rhs } => lower_binary(*op, lhs, rhs, alloc, target, out),
    }
}

// ============================================================================
// Heap accesses
// ============================================================================

/// Leave the address of `name[indexes…]` in `target`.
///
/// Loads the variable's heap pointer, then for every index: evaluate it,
/// bounds-check against the length prefix, and step `target` to the
/// element (`+4` past the prefix, `+ index << 2`). Shared by element reads
/// and assignment targets; reads add a final dereference.
pub(crate) fn lower_array_access(
    name: &str,
    indexes: &[Expr],
    alloc: &mut RegAllocator,
    target: Reg,
    out: &InstrSink,
) {
    let offset = alloc.resolve_var(name);
    out.emit(Instr::add(target, Reg::Sp, Operand::Imm(offset)));

    let index_reg = alloc.get_reg(out);
    for index in indexes {
        out.emit(Instr::ldr_mem(target, target, 0));

        lower_expr(index, alloc, index_reg, out);

        alloc.helpers().add(Helper::CheckArrayBounds);
        out.emit(Instr::mov_reg(Reg::R0, index_reg));
        out.emit(Instr::mov_reg(Reg::R1, target));
        out.emit(Instr::bl(Helper::CheckArrayBounds.label()));

        out.emit(Instr::add(target, target, Operand::Imm(4)));
        out.emit(Instr::add(
            target,
            target,
            Operand::RegShift { reg: index_reg, shift: Shift::Lsl, amount: 2 },
        ));
    }
    alloc.free_reg(index_reg, out);
}

/// Evaluate a pair expression into `target` and null-check it. The caller
/// offsets to `snd` and dereferences as needed.
pub(crate) fn lower_pair_access(
    expr: &Expr,
    alloc: &mut RegAllocator,
    target: Reg,
    out: &InstrSink,
) {
    lower_expr(expr, alloc, target, out);

    alloc.helpers().add(Helper::CheckNullPointer);
    out.emit(Instr::mov_reg(Reg::R0, target));
    out.emit(Instr::bl(Helper::CheckNullPointer.label()));
}

/// `newpair(fst, snd)`: malloc two words, store both elements.
fn lower_pair_literal(
    fst: &Expr,
    snd: &Expr,
    alloc: &mut RegAllocator,
    target: Reg,
    out: &InstrSink,
) {
    out.emit(Instr::ldr_const(Reg::R0, 8));
    out.emit(Instr::bl("malloc"));
    out.emit(Instr::mov_reg(target, Reg::RESULT));

    let elem_reg = alloc.get_reg(out);
    lower_expr(fst, alloc, elem_reg, out);
    out.emit(Instr::str_mem(elem_reg, target, 0));
    lower_expr(snd, alloc, elem_reg, out);
    out.emit(Instr::str_mem(elem_reg, target, 4));
    alloc.free_reg(elem_reg, out);
}

// ============================================================================
// Unary operators
// ============================================================================

fn lower_unary(op: UnaryOp, expr: &Expr, alloc: &mut RegAllocator, target: Reg, out: &InstrSink) {
    lower_expr(expr, alloc, target, out);

    match op {
        UnaryOp::Not => {
            out.emit(Instr::Eor { dest: target, lhs: target, rhs: Operand::Imm(1) });
        }
        UnaryOp::Negate => {
            alloc.helpers().add(Helper::ThrowOverflowError);
            out.emit(Instr::rsbs(target, target, Operand::Imm(0)));
            out.emit(Instr::bl_cond(Cond::Vs, Helper::ThrowOverflowError.label()));
        }
        UnaryOp::Len => {
            // The length word sits at the array pointer itself.
            out.emit(Instr::ldr_mem(target, target, 0));
        }
        // 32-bit characters make ord and chr identities.
        UnaryOp::Ord | UnaryOp::Chr => {}
    }
}

// ============================================================================
// Binary operators
// ============================================================================

/// Evaluate both operands, heavier side first. Returns the second register
/// and whether the left operand landed in `target`.
fn lower_operands(
    lhs: &Expr,
    rhs: &Expr,
    alloc: &mut RegAllocator,
    target: Reg,
    out: &InstrSink,
) -> (Reg, bool) {
    let lhs_first = weight(lhs) > weight(rhs);
    let target2 = if lhs_first {
        lower_expr(lhs, alloc, target, out);
        let target2 = alloc.get_reg(out);
        lower_expr(rhs, alloc, target2, out);
        target2
    } else {
        lower_expr(rhs, alloc, target, out);
        let target2 = alloc.get_reg(out);
        lower_expr(lhs, alloc, target2, out);
        target2
    };
    (target2, lhs_first)
}

fn comparison_cond(op: BinaryOp) -> Cond {
    match op {
        BinaryOp::Gt => Cond::Gt,
        BinaryOp::Ge => Cond::Ge,
        BinaryOp::Lt => Cond::Lt,
        BinaryOp::Le => Cond::Le,
        BinaryOp::Eq => Cond::Eq,
        BinaryOp::Ne => Cond::Ne,
        op => panic!("{op:?} is not a comparison operator"),
    }
}

fn lower_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    alloc: &mut RegAllocator,
    target: Reg,
    out: &InstrSink,
) {
    let (target2, lhs_first) = lower_operands(lhs, rhs, alloc, target, out);

    // Which physical register holds which source operand.
    let (lhs_reg, rhs_reg) = if lhs_first { (target, target2) } else { (target2, target) };

    match op {
        BinaryOp::Add => {
            alloc.helpers().add(Helper::ThrowOverflowError);
            out.emit(Instr::adds(target, target2, Operand::Reg(target)));
            alloc.free_reg(target2, out);
            out.emit(Instr::bl_cond(Cond::Vs, Helper::ThrowOverflowError.label()));
        }
        BinaryOp::Sub => {
            alloc.helpers().add(Helper::ThrowOverflowError);
            out.emit(Instr::subs(target, lhs_reg, Operand::Reg(rhs_reg)));
            alloc.free_reg(target2, out);
            out.emit(Instr::bl_cond(Cond::Vs, Helper::ThrowOverflowError.label()));
        }
        BinaryOp::Mul => {
            alloc.helpers().add(Helper::ThrowOverflowError);
            out.emit(Instr::Smull {
                rd_lo: target,
                rd_hi: target2,
                rm: target,
                rs: target2,
            });
            // The high word must equal the low word's sign extension.
            out.emit(Instr::cmp(
                target2,
                Operand::RegShift { reg: target, shift: Shift::Asr, amount: 31 },
            ));
            alloc.free_reg(target2, out);
            out.emit(Instr::bl_cond(Cond::Ne, Helper::ThrowOverflowError.label()));
        }
        BinaryOp::Div | BinaryOp::Mod => {
            alloc.helpers().add(Helper::CheckDivideByZero);
            out.emit(Instr::mov_reg(Reg::R0, lhs_reg));
            out.emit(Instr::mov_reg(Reg::R1, rhs_reg));
            out.emit(Instr::bl(Helper::CheckDivideByZero.label()));
            if op == BinaryOp::Div {
                out.emit(Instr::bl("__aeabi_idiv"));
                out.emit(Instr::mov_reg(target, Reg::R0));
            } else {
                out.emit(Instr::bl("__aeabi_idivmod"));
                out.emit(Instr::mov_reg(target, Reg::R1));
            }
            alloc.free_reg(target2, out);
        }
        BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Eq
        | BinaryOp::Ne => {
            let cond = comparison_cond(op);
            out.emit(Instr::cmp(lhs_reg, Operand::Reg(rhs_reg)));
            alloc.free_reg(target2, out);
            out.emit(Instr::mov_cond(cond, target, Operand::Imm(1)));
            out.emit(Instr::mov_cond(cond.opposite(), target, Operand::Imm(0)));
        }
        // No short-circuiting: both operands always evaluate.
        BinaryOp::And => {
            out.emit(Instr::And { dest: target, lhs: target2, rhs: Operand::Reg(target) });
            alloc.free_reg(target2, out);
        }
        BinaryOp::Or => {
            out.emit(Instr::Orr { dest: target, lhs: target2, rhs: Operand::Reg(target) });
            alloc.free_reg(target2, out);
        }
    }
}
