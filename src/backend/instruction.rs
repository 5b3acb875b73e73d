//! ARM instruction model and the write-only instruction sink.
//!
//! This module defines the condition codes (`Cond`), operand forms
//! (`Operand`, `LoadOperand`, `MemRef`), the typed instruction set (`Instr`)
//! the backend emits, and `InstrSink`, the channel-backed sink every
//! lowering routine writes into. Each `Instr` renders to exactly one line of
//! ARM assembly via `Display`.

use super::abi::Reg;
use std::fmt;
use std::sync::mpsc;

// ============================================================================
// Condition codes
// ============================================================================

/// ARM condition code, suffixed to a mnemonic when not `AL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Al,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Vs,
    Vc,
    Cs,
    Cc,
}

impl Cond {
    /// The mnemonic suffix (`""` for `AL`).
    pub fn suffix(self) -> &'static str {
        match self {
            Cond::Al => "",
            Cond::Eq => "EQ",
            Cond::Ne => "NE",
            Cond::Lt => "LT",
            Cond::Le => "LE",
            Cond::Gt => "GT",
            Cond::Ge => "GE",
            Cond::Vs => "VS",
            Cond::Vc => "VC",
            Cond::Cs => "CS",
            Cond::Cc => "CC",
        }
    }

    /// The logical complement, used to materialise a comparison into
    /// `{0, 1}` with a conditional `MOV` pair.
    pub fn opposite(self) -> Cond {
        match self {
            Cond::Al => Cond::Al,
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Le => Cond::Gt,
            Cond::Gt => Cond::Le,
            Cond::Vs => Cond::Vc,
            Cond::Vc => Cond::Vs,
            Cond::Cs => Cond::Cc,
            Cond::Cc => Cond::Cs,
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

// ============================================================================
// Operands
// ============================================================================

/// Barrel-shift applied to a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Lsl,
    Asr,
}

impl fmt::Display for Shift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shift::Lsl => write!(f, "LSL"),
            Shift::Asr => write!(f, "ASR"),
        }
    }
}

/// Flexible second operand of a data-processing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// `#n`
    Imm(i32),
    /// `#'c'`
    Char(char),
    /// `rN`
    Reg(Reg),
    /// `rN, LSL #s` / `rN, ASR #s`
    RegShift { reg: Reg, shift: Shift, amount: u32 },
}

/// Render a character the way the assembler expects it inside `#'…'`.
fn escape_char(c: char, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match c {
        '\0' => write!(f, "\\0"),
        '\n' => write!(f, "\\n"),
        '\t' => write!(f, "\\t"),
        '\\' => write!(f, "\\\\"),
        '\'' => write!(f, "\\'"),
        c => write!(f, "{c}"),
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(n) => write!(f, "#{n}"),
            Operand::Char(c) => {
                write!(f, "#'")?;
                escape_char(*c, f)?;
                write!(f, "'")
            }
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::RegShift { reg, shift, amount } => {
                write!(f, "{reg}, {shift} #{amount}")
            }
        }
    }
}

/// A base-register memory reference: `[reg]` or `[reg, #offset]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRef {
    pub reg: Reg,
    pub offset: i32,
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            write!(f, "[{}]", self.reg)
        } else {
            write!(f, "[{}, #{}]", self.reg, self.offset)
        }
    }
}

/// Source of an `LDR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOperand {
    /// `=symbol`, resolved through the literal pool.
    Label(String),
    /// `=const`, resolved through the literal pool.
    Const(i32),
    /// `[reg]` / `[reg, #offset]`
    Mem(MemRef),
}

impl fmt::Display for LoadOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOperand::Label(l) => write!(f, "={l}"),
            LoadOperand::Const(n) => write!(f, "={n}"),
            LoadOperand::Mem(m) => write!(f, "{m}"),
        }
    }
}

// ============================================================================
// Instructions
// ============================================================================

/// A typed ARM instruction (or assembler directive).
///
/// `Add`/`Sub`/`Rsb` carry a `flags` bit selecting the S-suffixed form;
/// `Mov`, `Ldr`, `B` and `Bl` carry a condition code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    // ── Data processing ─────────────────────────────────────────────────
    Mov { cond: Cond, dest: Reg, src: Operand },
    Add { flags: bool, dest: Reg, lhs: Reg, rhs: Operand },
    Sub { flags: bool, dest: Reg, lhs: Reg, rhs: Operand },
    Rsb { flags: bool, dest: Reg, lhs: Reg, rhs: Operand },
    And { dest: Reg, lhs: Reg, rhs: Operand },
    Orr { dest: Reg, lhs: Reg, rhs: Operand },
    Eor { dest: Reg, lhs: Reg, rhs: Operand },
    /// `SMULL RdLo, RdHi, Rm, Rs` — 64-bit product for overflow detection.
    Smull { rd_lo: Reg, rd_hi: Reg, rm: Reg, rs: Reg },
    Cmp { lhs: Reg, rhs: Operand },
    Teq { lhs: Reg, rhs: Operand },

    // ── Memory ──────────────────────────────────────────────────────────
    Ldr { cond: Cond, dest: Reg, src: LoadOperand },
    Str { src: Reg, dst: MemRef },
    Push { regs: Vec<Reg> },
    Pop { regs: Vec<Reg> },

    // ── Control flow ────────────────────────────────────────────────────
    B { cond: Cond, label: String },
    Bl { cond: Cond, label: String },

    // ── Labels and directives ───────────────────────────────────────────
    Label(String),
    Ltorg,
    DataSeg,
    TextSeg,
    Global(String),
    DataWord(usize),
    DataAscii(String),
}

// ── Convenience constructors ────────────────────────────────────────────

impl Instr {
    pub fn mov(dest: Reg, src: Operand) -> Instr {
        Instr::Mov { cond: Cond::Al, dest, src }
    }

    pub fn mov_reg(dest: Reg, src: Reg) -> Instr {
        Instr::mov(dest, Operand::Reg(src))
    }

    pub fn mov_imm(dest: Reg, imm: i32) -> Instr {
        Instr::mov(dest, Operand::Imm(imm))
    }

    pub fn mov_cond(cond: Cond, dest: Reg, src: Operand) -> Instr {
        Instr::Mov { cond, dest, src }
    }

    pub fn ldr_label(dest: Reg, label: impl Into<String>) -> Instr {
        Instr::Ldr { cond: Cond::Al, dest, src: LoadOperand::Label(label.into()) }
    }

    pub fn ldr_cond_label(cond: Cond, dest: Reg, label: impl Into<String>) -> Instr {
        Instr::Ldr { cond, dest, src: LoadOperand::Label(label.into()) }
    }

    pub fn ldr_const(dest: Reg, value: i32) -> Instr {
        Instr::Ldr { cond: Cond::Al, dest, src: LoadOperand::Const(value) }
    }

    pub fn ldr_mem(dest: Reg, base: Reg, offset: i32) -> Instr {
        Instr::Ldr {
            cond: Cond::Al,
            dest,
            src: LoadOperand::Mem(MemRef { reg: base, offset }),
        }
    }

    pub fn str_mem(src: Reg, base: Reg, offset: i32) -> Instr {
        Instr::Str { src, dst: MemRef { reg: base, offset } }
    }

    pub fn add(dest: Reg, lhs: Reg, rhs: Operand) -> Instr {
        Instr::Add { flags: false, dest, lhs, rhs }
    }

    pub fn adds(dest: Reg, lhs: Reg, rhs: Operand) -> Instr {
        Instr::Add { flags: true, dest, lhs, rhs }
    }

    pub fn sub(dest: Reg, lhs: Reg, rhs: Operand) -> Instr {
        Instr::Sub { flags: false, dest, lhs, rhs }
    }

    pub fn subs(dest: Reg, lhs: Reg, rhs: Operand) -> Instr {
        Instr::Sub { flags: true, dest, lhs, rhs }
    }

    pub fn rsbs(dest: Reg, lhs: Reg, rhs: Operand) -> Instr {
        Instr::Rsb { flags: true, dest, lhs, rhs }
    }

    pub fn cmp(lhs: Reg, rhs: Operand) -> Instr {
        Instr::Cmp { lhs, rhs }
    }

    pub fn b(label: impl Into<String>) -> Instr {
        Instr::B { cond: Cond::Al, label: label.into() }
    }

    pub fn b_cond(cond: Cond, label: impl Into<String>) -> Instr {
        Instr::B { cond, label: label.into() }
    }

    pub fn bl(label: impl Into<String>) -> Instr {
        Instr::Bl { cond: Cond::Al, label: label.into() }
    }

    pub fn bl_cond(cond: Cond, label: impl Into<String>) -> Instr {
        Instr::Bl { cond, label: label.into() }
    }

    pub fn push(regs: Vec<Reg>) -> Instr {
        Instr::Push { regs }
    }

    pub fn push1(reg: Reg) -> Instr {
        Instr::Push { regs: vec![reg] }
    }

    pub fn pop(regs: Vec<Reg>) -> Instr {
        Instr::Pop { regs }
    }

    pub fn pop1(reg: Reg) -> Instr {
        Instr::Pop { regs: vec![reg] }
    }

    pub fn label(ident: impl Into<String>) -> Instr {
        Instr::Label(ident.into())
    }
}

// ── Display — lower to assembly text ────────────────────────────────────

fn write_reg_list(f: &mut fmt::Formatter<'_>, regs: &[Reg]) -> fmt::Result {
    write!(f, "{{")?;
    for (i, r) in regs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{r}")?;
    }
    write!(f, "}}")
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Mov { cond, dest, src } => write!(f, "\tMOV{cond} {dest}, {src}"),
            Instr::Add { flags, dest, lhs, rhs } => {
                write!(f, "\tADD{} {dest}, {lhs}, {rhs}", if *flags { "S" } else { "" })
            }
            Instr::Sub { flags, dest, lhs, rhs } => {
                write!(f, "\tSUB{} {dest}, {lhs}, {rhs}", if *flags { "S" } else { "" })
            }
            Instr::Rsb { flags, dest, lhs, rhs } => {
                write!(f, "\tRSB{} {dest}, {lhs}, {rhs}", if *flags { "S" } else { "" })
            }
            Instr::And { dest, lhs, rhs } => write!(f, "\tAND {dest}, {lhs}, {rhs}"),
            Instr::Orr { dest, lhs, rhs } => write!(f, "\tORR {dest}, {lhs}, {rhs}"),
            Instr::Eor { dest, lhs, rhs } => write!(f, "\tEOR {dest}, {lhs}, {rhs}"),
            Instr::Smull { rd_lo, rd_hi, rm, rs } => {
                write!(f, "\tSMULL {rd_lo}, {rd_hi}, {rm}, {rs}")
            }
            Instr::Cmp { lhs, rhs } => write!(f, "\tCMP {lhs}, {rhs}"),
            Instr::Teq { lhs, rhs } => write!(f, "\tTEQ {lhs}, {rhs}"),
            Instr::Ldr { cond, dest, src } => write!(f, "\tLDR{cond} {dest}, {src}"),
            Instr::Str { src, dst } => write!(f, "\tSTR {src}, {dst}"),
            Instr::Push { regs } => {
                write!(f, "\tPUSH ")?;
                write_reg_list(f, regs)
            }
            Instr::Pop { regs } => {
                write!(f, "\tPOP ")?;
                write_reg_list(f, regs)
            }
            Instr::B { cond, label } => write!(f, "\tB{cond} {label}"),
            Instr::Bl { cond, label } => write!(f, "\tBL{cond} {label}"),
            Instr::Label(ident) => write!(f, "{ident}:"),
            Instr::Ltorg => write!(f, "\t.ltorg"),
            Instr::DataSeg => write!(f, ".data"),
            Instr::TextSeg => write!(f, ".text"),
            Instr::Global(name) => write!(f, ".global {name}"),
            Instr::DataWord(n) => write!(f, "\t.word {n}"),
            Instr::DataAscii(s) => write!(f, "\t.ascii \"{s}\""),
        }
    }
}

// ============================================================================
// Instruction sink
// ============================================================================

/// Write-only instruction stream of one procedure lowering.
///
/// Backed by an mpsc channel; the program driver owns the receiving end and
/// drains procedure streams in a deterministic order. A disconnected
/// receiver means the driver died, which is unrecoverable.
pub struct InstrSink {
    tx: mpsc::Sender<Instr>,
}

impl InstrSink {
    pub fn new(tx: mpsc::Sender<Instr>) -> InstrSink {
        InstrSink { tx }
    }

    /// A sink paired with its receiver, for driving lowerings directly.
    pub fn collector() -> (InstrSink, mpsc::Receiver<Instr>) {
        let (tx, rx) = mpsc::channel();
        (InstrSink::new(tx), rx)
    }

    pub fn emit(&self, instr: Instr) {
        self.tx.send(instr).expect("instruction sink disconnected");
    }
}
