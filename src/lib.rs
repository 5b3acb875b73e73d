//! ARM code generation core for the WACC teaching language.
//!
//! The crate lowers a fully type-checked WACC AST ([`ast::Program`]) to
//! 32-bit ARM assembly (ARMv6/ARMv7-A, AAPCS). Parsing, semantic analysis
//! and the command-line surface live upstream; the input here is assumed
//! well-typed, and malformed input (an unknown variable, a typeless read
//! target) is treated as an upstream bug and aborts with a panic.

pub mod ast;
pub mod backend;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("failed to write assembly output: {0}")]
    Io(#[from] std::io::Error),
}

/// Lower a type-checked program to ARM assembly text.
pub fn compile_to_arm(program: &ast::Program) -> String {
    let instrs = backend::generate(program);
    let mut asm = String::with_capacity(instrs.len() * 24);
    for instr in &instrs {
        asm.push_str(&instr.to_string());
        asm.push('\n');
    }
    asm
}

/// Lower a type-checked program and write the assembly to `out`.
pub fn compile_to_writer<W: std::io::Write>(
    program: &ast::Program,
    out: &mut W,
) -> Result<(), CodegenError> {
    let instrs = backend::generate(program);
    backend::write_assembly(&instrs, out)?;
    Ok(())
}
