//! Stack-spill register allocator and scope manager.
//!
//! One `RegAllocator` exists per procedure lowering and is threaded by
//! exclusive reference through the recursion. It hands out r4–r11 in a
//! rotating order, spilling to the stack when a register is already live:
//! `get_reg`/`free_reg` form strict LIFO pairs, which makes every spill a
//! `PUSH` matched by exactly one `POP` with no liveness analysis. The
//! allocator also owns the stack-size bookkeeping, the lexical scope stack
//! mapping variables to `sp`-relative offsets, and the per-procedure label
//! counter. Misuse (an out-of-order free, an unknown variable) is an
//! upstream bug and panics.

use super::abi::Reg;
use super::helpers::HelperPool;
use super::instruction::{Instr, InstrSink, Operand};
use super::strings::StringPool;
use log::trace;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Largest immediate the scope-cleanup `ADD sp, sp, #imm` may carry
/// (a legal ARM imm8 encoding); larger reclaims are split into chunks.
const MAX_SP_ADJUST: i32 = 255;

pub struct RegAllocator {
    /// Allocation rotation of r4..r11; the head is handed out next.
    regs: VecDeque<Reg>,
    /// How many logical lives share each physical register via spill.
    usage: [u32; 12],
    /// Current byte delta of `sp` below its value at procedure entry.
    stack_size: i32,
    /// Scope stack, innermost last; each maps a variable to the value of
    /// `stack_size` at its declaration.
    scopes: Vec<HashMap<String, i32>>,
    /// Procedure name, used to mangle label suffixes.
    fname: String,
    label_counter: u32,
    strings: Arc<StringPool>,
    helpers: Arc<HelperPool>,
}

impl RegAllocator {
    pub fn new(
        fname: impl Into<String>,
        strings: Arc<StringPool>,
        helpers: Arc<HelperPool>,
    ) -> RegAllocator {
        RegAllocator {
            regs: Reg::POOL.into_iter().collect(),
            usage: [0; 12],
            stack_size: 0,
            scopes: Vec::new(),
            fname: fname.into(),
            label_counter: 0,
            strings,
            helpers,
        }
    }

    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub fn helpers(&self) -> &HelperPool {
        &self.helpers
    }

    pub fn fname(&self) -> &str {
        &self.fname
    }

    // ── Register pool ───────────────────────────────────────────────────

    /// Hand out the next register in rotation, spilling its current value
    /// to the stack if it is already live.
    pub fn get_reg(&mut self, out: &InstrSink) -> Reg {
        let reg = *self.regs.front().expect("register rotation empty");

        if self.usage[reg.number()] > 0 {
            trace!("{}: spilling {reg} for reuse", self.fname);
            out.emit(Instr::push1(reg));
            self.push_stack(4);
        }

        self.usage[reg.number()] += 1;
        self.regs.rotate_left(1);

        reg
    }

    /// Release the most recently handed out register, reloading the spilled
    /// previous value if one exists. Frees must mirror `get_reg` in LIFO
    /// order; anything else is a lowering bug.
    pub fn free_reg(&mut self, reg: Reg, out: &InstrSink) {
        let expected = *self.regs.back().expect("register rotation empty");
        if reg != expected {
            panic!(
                "{}: register free order mismatch: freed {reg}, expected {expected}",
                self.fname
            );
        }

        if self.usage[reg.number()] > 1 {
            trace!("{}: reloading spilled {reg}", self.fname);
            out.emit(Instr::pop1(reg));
            self.pop_stack(4);
        }

        self.usage[reg.number()] -= 1;
        self.regs.rotate_right(1);
    }

    // ── Stack bookkeeping ───────────────────────────────────────────────

    /// Record `bytes` of stack growth. Every emitted `sp`-adjusting
    /// instruction must be mirrored here to keep offsets consistent.
    pub fn push_stack(&mut self, bytes: i32) {
        self.stack_size += bytes;
    }

    /// Record `bytes` of stack shrinkage.
    pub fn pop_stack(&mut self, bytes: i32) {
        self.stack_size -= bytes;
    }

    pub fn stack_size(&self) -> i32 {
        self.stack_size
    }

    // ── Scopes and variables ────────────────────────────────────────────

    pub fn start_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Reserve a stack slot for a new variable in the innermost scope and
    /// emit the `sp` decrement for it.
    pub fn declare_var(&mut self, name: &str, out: &InstrSink) {
        self.push_stack(4);
        let offset = self.stack_size;
        self.scopes
            .last_mut()
            .expect("no scope to declare variable in")
            .insert(name.to_string(), offset);
        out.emit(Instr::sub(Reg::Sp, Reg::Sp, Operand::Imm(4)));
    }

    /// Bind a parameter name at a fixed offset (relative to the stack size
    /// at procedure entry) in the innermost scope, without moving `sp`.
    pub fn declare_param(&mut self, name: &str, offset: i32) {
        self.scopes
            .last_mut()
            .expect("no scope to declare parameter in")
            .insert(name.to_string(), offset);
    }

    /// The variable's current positive byte offset from `sp`, walking
    /// scopes innermost-first.
    pub fn resolve_var(&self, name: &str) -> i32 {
        for scope in self.scopes.iter().rev() {
            if let Some(&declared_at) = scope.get(name) {
                return self.stack_size - declared_at;
            }
        }
        panic!("{}: variable {name} not found in scope", self.fname);
    }

    /// Reclaim the innermost scope's stack space and drop the scope.
    /// `ADD sp` immediates are capped at 255 bytes, so large scopes unwind
    /// in several instructions.
    pub fn cleanup_scope(&mut self, out: &InstrSink) {
        let scope = self.scopes.pop().expect("no scope to clean up");
        let bytes = scope.len() as i32 * 4;

        let mut remaining = bytes;
        while remaining > 0 {
            let chunk = remaining.min(MAX_SP_ADJUST);
            out.emit(Instr::add(Reg::Sp, Reg::Sp, Operand::Imm(chunk)));
            remaining -= chunk;
        }
        self.pop_stack(bytes);
    }

    // ── Labels ──────────────────────────────────────────────────────────

    /// A label suffix unique across the whole program:
    /// `_<procedure>_<counter>`.
    pub fn unique_label(&mut self) -> String {
        let suffix = format!("_{}_{}", self.fname, self.label_counter);
        self.label_counter += 1;
        suffix
    }
}
