//! Program-level driver.
//!
//! Lowers every procedure concurrently — each on its own scoped thread with
//! a private allocator, producing into a private channel — then joins the
//! streams in source order, appends the requested runtime helpers, and
//! finally assembles the `.data` and `.text` segments. The only state
//! shared between procedure lowerings is the string pool and the helper
//! pool; everything else is confined to one thread.

use super::function::lower_function;
use super::helpers::HelperPool;
use super::instruction::{Instr, InstrSink};
use super::regalloc::RegAllocator;
use super::strings::StringPool;
use crate::ast::Program;
use log::debug;
use std::collections::BTreeSet;
use std::io;
use std::sync::{mpsc, Arc};
use std::thread;

/// Lower a type-checked program to its full instruction stream.
pub fn generate(program: &Program) -> Vec<Instr> {
    let strings = Arc::new(StringPool::new());
    let helpers = Arc::new(HelperPool::new());

    // Buffer the text section first: the string table can only be emitted
    // once every procedure and helper has interned its literals.
    let mut text = vec![Instr::TextSeg, Instr::Global("main".to_string())];

    thread::scope(|scope| {
        let mut streams = Vec::with_capacity(program.functions.len() + 1);

        for function in &program.functions {
            let (tx, rx) = mpsc::channel();
            let alloc =
                RegAllocator::new(&function.name, Arc::clone(&strings), Arc::clone(&helpers));
            scope.spawn(move || {
                debug!("lowering procedure {}", function.name);
                lower_function(
                    &function.name,
                    &function.params,
                    function.return_ty.is_some(),
                    &function.body,
                    alloc,
                    &InstrSink::new(tx),
                );
            });
            streams.push(rx);
        }

        // The synthetic main wraps the top-level body and returns zero.
        let (tx, rx) = mpsc::channel();
        let alloc = RegAllocator::new("main", Arc::clone(&strings), Arc::clone(&helpers));
        scope.spawn(move || {
            debug!("lowering procedure main");
            lower_function("main", &[], false, &program.main, alloc, &InstrSink::new(tx));
        });
        streams.push(rx);

        // Join the streams in declaration order; within one stream the
        // channel preserves emission order, and no other ordering between
        // procedures is observable.
        for stream in streams {
            for instr in stream {
                text.push(instr);
            }
        }
    });

    // Emit requested helpers in their fixed order. A helper body may
    // request further helpers (the checks tail-call the runtime-error
    // thrower), so keep draining; `emitted` filters re-requests.
    let mut emitted = BTreeSet::new();
    while let Some(helper) = helpers.take() {
        if !emitted.insert(helper) {
            continue;
        }
        debug!("emitting runtime helper {}", helper.label());
        helper.emit(&strings, &helpers, &mut text);
    }

    let mut output = Vec::with_capacity(text.len() + 3 * strings.len() + 1);
    output.push(Instr::DataSeg);
    strings.emit(&mut output);
    output.extend(text);
    output
}

/// Serialise an instruction stream to the sink, one line per instruction.
pub fn write_assembly<W: io::Write>(instrs: &[Instr], out: &mut W) -> io::Result<()> {
    for instr in instrs {
        writeln!(out, "{instr}")?;
    }
    Ok(())
}
