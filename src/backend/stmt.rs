//! Statement lowering.
//!
//! Statements are stack-neutral: whatever a statement pushes it reclaims,
//! with the single exception of `declare`, which leaves its new variable's
//! slot behind. Control-flow statements mint their labels from the
//! allocator's per-procedure suffix counter.

use super::abi::Reg;
use super::expr::{lower_array_access, lower_expr, lower_pair_access};
use super::helpers::Helper;
use super::instruction::{Cond, Instr, InstrSink, Operand};
use super::regalloc::RegAllocator;
use crate::ast::{Expr, Lhs, Rhs, Stmt, Type};

// ============================================================================
// Statement dispatch
// ============================================================================

pub fn lower_stmt(stmt: &Stmt, alloc: &mut RegAllocator, out: &InstrSink) {
    match stmt {
        Stmt::Skip => {}
        Stmt::Block(body) => lower_block(body, alloc, out),
        Stmt::Declare { name, rhs, .. } => lower_declare(name, rhs, alloc, out),
        Stmt::Assign { lhs, rhs } => lower_assign(lhs, rhs, alloc, out),
        Stmt::Read(lhs) => lower_read(lhs, alloc, out),
        Stmt::Free(expr) => lower_free(expr, alloc, out),
        Stmt::Return(expr) => lower_return(expr, alloc, out),
        Stmt::Exit(expr) => lower_exit(expr, alloc, out),
        Stmt::Print(expr) => lower_print(expr, alloc, out),
        Stmt::Println(expr) => {
            lower_print(expr, alloc, out);
            alloc.helpers().add(Helper::PrintLn);
            out.emit(Instr::bl(Helper::PrintLn.label()));
        }
        Stmt::If { cond, then_body, else_body } => {
            lower_if(cond, then_body, else_body, alloc, out)
        }
        Stmt::While { cond, body } => lower_while(cond, body, alloc, out),
    }
}

pub fn lower_body(body: &[Stmt], alloc: &mut RegAllocator, out: &InstrSink) {
    for stmt in body {
        lower_stmt(stmt, alloc, out);
    }
}

// ============================================================================
// Simple statements
// ============================================================================

fn lower_block(body: &[Stmt], alloc: &mut RegAllocator, out: &InstrSink) {
    let suffix = alloc.unique_label();

    out.emit(Instr::label(format!("block{suffix}")));
    alloc.start_scope();

    lower_body(body, alloc, out);

    alloc.cleanup_scope(out);
    out.emit(Instr::label(format!("block_end{suffix}")));
}

fn lower_declare(name: &str, rhs: &Rhs, alloc: &mut RegAllocator, out: &InstrSink) {
    alloc.declare_var(name, out);

    let reg = alloc.get_reg(out);
    lower_rhs(rhs, alloc, reg, out);

    let offset = alloc.resolve_var(name);
    out.emit(Instr::str_mem(reg, Reg::Sp, offset));

    alloc.free_reg(reg, out);
}

fn lower_assign(lhs: &Lhs, rhs: &Rhs, alloc: &mut RegAllocator, out: &InstrSink) {
    let lhs_reg = alloc.get_reg(out);
    lower_lhs(lhs, alloc, lhs_reg, out);

    let rhs_reg = alloc.get_reg(out);
    lower_rhs(rhs, alloc, rhs_reg, out);

    out.emit(Instr::str_mem(rhs_reg, lhs_reg, 0));

    alloc.free_reg(rhs_reg, out);
    alloc.free_reg(lhs_reg, out);
}

fn lower_read(lhs: &Lhs, alloc: &mut RegAllocator, out: &InstrSink) {
    let reg = alloc.get_reg(out);
    lower_lhs(lhs, alloc, reg, out);

    out.emit(Instr::mov_reg(Reg::R0, reg));

    let helper = match lhs.ty() {
        Type::Int => Helper::ReadInt,
        Type::Char => Helper::ReadChar,
        ty => panic!("read target has unreadable type {ty:?}"),
    };
    alloc.helpers().add(helper);
    out.emit(Instr::bl(helper.label()));

    alloc.free_reg(reg, out);
}

fn lower_free(expr: &Expr, alloc: &mut RegAllocator, out: &InstrSink) {
    let reg = alloc.get_reg(out);
    lower_expr(expr, alloc, reg, out);

    alloc.helpers().add(Helper::CheckNullPointer);
    out.emit(Instr::mov_reg(Reg::R0, reg));
    out.emit(Instr::bl(Helper::CheckNullPointer.label()));

    out.emit(Instr::mov_reg(Reg::R0, reg));
    out.emit(Instr::bl("free"));

    alloc.free_reg(reg, out);
}

fn lower_return(expr: &Expr, alloc: &mut RegAllocator, out: &InstrSink) {
    let reg = alloc.get_reg(out);
    lower_expr(expr, alloc, reg, out);
    out.emit(Instr::mov_reg(Reg::RESULT, reg));

    // Rewind every open scope so the epilogue sees the entry sp.
    out.emit(Instr::add(Reg::Sp, Reg::Sp, Operand::Imm(alloc.stack_size())));
    out.emit(Instr::b(format!("{}_return", alloc.fname())));

    alloc.free_reg(reg, out);
}

fn lower_exit(expr: &Expr, alloc: &mut RegAllocator, out: &InstrSink) {
    let reg = alloc.get_reg(out);
    lower_expr(expr, alloc, reg, out);

    out.emit(Instr::mov_reg(Reg::R0, reg));
    out.emit(Instr::bl("exit"));

    alloc.free_reg(reg, out);
}

fn lower_print(expr: &Expr, alloc: &mut RegAllocator, out: &InstrSink) {
    let reg = alloc.get_reg(out);
    lower_expr(expr, alloc, reg, out);
    out.emit(Instr::mov_reg(Reg::R0, reg));
    alloc.free_reg(reg, out);

    let helper = match expr.ty() {
        Type::Int => Helper::PrintInt,
        Type::Bool => Helper::PrintBool,
        Type::Char => Helper::PrintChar,
        Type::Pair(_, _) => Helper::PrintReference,
        Type::Array(elem) => {
            if *elem == Type::Char {
                Helper::PrintString
            } else {
                Helper::PrintReference
            }
        }
        Type::Any => panic!("print argument has no static type"),
    };
    alloc.helpers().add(helper);
    out.emit(Instr::bl(helper.label()));
}

// ============================================================================
// Control flow
// ============================================================================

fn lower_if(
    cond: &Expr,
    then_body: &[Stmt],
    else_body: &[Stmt],
    alloc: &mut RegAllocator,
    out: &InstrSink,
) {
    let suffix = alloc.unique_label();
    let else_label = format!("else{suffix}");
    let end_label = format!("end{suffix}");

    out.emit(Instr::label(format!("if{suffix}")));
    let target = alloc.get_reg(out);
    lower_expr(cond, alloc, target, out);

    out.emit(Instr::cmp(target, Operand::Imm(0)));
    alloc.free_reg(target, out);
    out.emit(Instr::b_cond(Cond::Eq, else_label.clone()));

    out.emit(Instr::label(format!("then{suffix}")));
    alloc.start_scope();
    lower_body(then_body, alloc, out);
    alloc.cleanup_scope(out);
    out.emit(Instr::b(end_label.clone()));

    out.emit(Instr::label(else_label));
    alloc.start_scope();
    lower_body(else_body, alloc, out);
    alloc.cleanup_scope(out);

    out.emit(Instr::label(end_label));
}

/// Bottom-test loop: jump to the condition, fall back to the body while it
/// holds.
fn lower_while(cond: &Expr, body: &[Stmt], alloc: &mut RegAllocator, out: &InstrSink) {
    let suffix = alloc.unique_label();
    let cond_label = format!("cond{suffix}");
    let do_label = format!("do{suffix}");

    out.emit(Instr::label(format!("while{suffix}")));
    out.emit(Instr::b(cond_label.clone()));

    out.emit(Instr::label(do_label.clone()));
    alloc.start_scope();
    lower_body(body, alloc, out);
    alloc.cleanup_scope(out);

    out.emit(Instr::label(cond_label));
    let target = alloc.get_reg(out);
    lower_expr(cond, alloc, target, out);
    out.emit(Instr::cmp(target, Operand::Imm(1)));
    alloc.free_reg(target, out);
    out.emit(Instr::b_cond(Cond::Eq, do_label));

    out.emit(Instr::label(format!("end{suffix}")));
}

// ============================================================================
// Assignment sides
// ============================================================================

/// Leave the address of the assignment target in `target`.
pub fn lower_lhs(lhs: &Lhs, alloc: &mut RegAllocator, target: Reg, out: &InstrSink) {
    match lhs {
        Lhs::Var { name, .. } => {
            out.emit(Instr::mov_reg(target, Reg::Sp));
            let offset = alloc.resolve_var(name);
            out.emit(Instr::add(target, target, Operand::Imm(offset)));
        }
        Lhs::ArrayElem { name, indexes, .. } => {
            lower_array_access(name, indexes, alloc, target, out);
        }
        Lhs::PairElem { snd, expr, .. } => {
            lower_pair_access(expr, alloc, target, out);
            if *snd {
                out.emit(Instr::add(target, target, Operand::Imm(4)));
            }
        }
    }
}

/// Lower an assignment right-hand side into `target`.
pub fn lower_rhs(rhs: &Rhs, alloc: &mut RegAllocator, target: Reg, out: &InstrSink) {
    match rhs {
        Rhs::Expr(expr) => lower_expr(expr, alloc, target, out),
        Rhs::ArrayLiteral(elements) => lower_array_literal(elements, alloc, target, out),
        Rhs::PairElem { snd, expr } => {
            lower_pair_access(expr, alloc, target, out);
            out.emit(Instr::ldr_mem(target, target, if *snd { 4 } else { 0 }));
        }
        Rhs::Call { name, args } => lower_call(name, args, alloc, target, out),
    }
}

/// `[e1, e2, …]`: malloc `4·n + 4` bytes, store the elements after the
/// length word.
fn lower_array_literal(
    elements: &[Expr],
    alloc: &mut RegAllocator,
    target: Reg,
    out: &InstrSink,
) {
    let n = elements.len();
    out.emit(Instr::ldr_const(Reg::R0, (n as i32) * 4 + 4));
    out.emit(Instr::bl("malloc"));
    out.emit(Instr::mov_reg(target, Reg::RESULT));

    let elem_reg = alloc.get_reg(out);
    for (i, element) in elements.iter().enumerate() {
        lower_expr(element, alloc, elem_reg, out);
        out.emit(Instr::str_mem(elem_reg, target, (i as i32 + 1) * 4));
    }

    out.emit(Instr::ldr_const(elem_reg, n as i32));
    out.emit(Instr::str_mem(elem_reg, target, 0));
    alloc.free_reg(elem_reg, out);
}

/// Caller side of the calling convention: evaluate arguments in reverse,
/// push each, pop the first four into r0–r3, branch-and-link, then drop
/// any stack-passed arguments.
fn lower_call(
    name: &str,
    args: &[Expr],
    alloc: &mut RegAllocator,
    target: Reg,
    out: &InstrSink,
) {
    for arg in args.iter().rev() {
        let reg = alloc.get_reg(out);
        lower_expr(arg, alloc, reg, out);
        out.emit(Instr::push1(reg));
        alloc.push_stack(4);
        alloc.free_reg(reg, out);
    }

    for i in 0..args.len().min(4) {
        out.emit(Instr::pop1(Reg::ARG_REGS[i]));
    }

    out.emit(Instr::bl(name));
    out.emit(Instr::mov_reg(target, Reg::RESULT));

    if args.len() > 4 {
        let stacked = (args.len() as i32 - 4) * 4;
        out.emit(Instr::add(Reg::Sp, Reg::Sp, Operand::Imm(stacked)));
    }
    alloc.pop_stack(args.len() as i32 * 4);
}
