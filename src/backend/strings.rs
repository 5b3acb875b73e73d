//! Shared string pool — the program's `.data` segment.
//!
//! All string and character data referenced by generated code and by the
//! runtime helpers is interned here under stable `msg_N` labels. The pool is
//! shared across concurrently running procedure lowerings, so mutation is
//! serialised by a mutex. Insertion order determines emission order.

use super::instruction::Instr;
use std::collections::HashMap;
use std::sync::Mutex;

/// One interned entry: the logical length and the assembler-escaped bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DataString {
    len: usize,
    bytes: String,
}

#[derive(Default)]
struct PoolInner {
    entries: Vec<DataString>,
    /// (len, bytes) → index, for deduplication.
    index: HashMap<(usize, String), usize>,
}

/// Insertion-ordered, concurrency-safe registry of string literals.
#[derive(Default)]
pub struct StringPool {
    inner: Mutex<PoolInner>,
}

impl StringPool {
    pub fn new() -> StringPool {
        StringPool::default()
    }

    /// Intern raw 8-bit data, as used by helper format strings and runtime
    /// error messages. Returns the `msg_N` label of the entry.
    pub fn lookup8(&self, msg: &str) -> String {
        self.intern(msg.len(), msg.to_string())
    }

    /// Intern a source-level string literal widened to 32 bits per
    /// character, so strings and arrays share one 4-bytes-per-element
    /// layout.
    ///
    /// `msg` must already be in assembler-escape form: a backslash is
    /// assumed to begin an escape sequence, passes through unwidened, and
    /// does not count towards the logical length.
    pub fn lookup32(&self, msg: &str) -> String {
        let mut widened = String::with_capacity(msg.len() * 13);
        let mut backslashes = 0;
        for b in msg.bytes() {
            if b == b'\\' {
                backslashes += 1;
                widened.push(b as char);
            } else {
                widened.push(b as char);
                widened.push_str("\\000\\000\\000");
            }
        }
        self.intern(msg.len() - backslashes, widened)
    }

    fn intern(&self, len: usize, bytes: String) -> String {
        let mut inner = self.inner.lock().expect("string pool poisoned");
        let key = (len, bytes);
        if let Some(&i) = inner.index.get(&key) {
            return format!("msg_{i}");
        }
        let i = inner.entries.len();
        inner.entries.push(DataString { len, bytes: key.1.clone() });
        inner.index.insert(key, i);
        format!("msg_{i}")
    }

    /// Number of interned entries.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("string pool poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the string table to `out`: for each entry in insertion order,
    /// its label, length word and ascii payload.
    pub fn emit(&self, out: &mut Vec<Instr>) {
        let inner = self.inner.lock().expect("string pool poisoned");
        for (i, entry) in inner.entries.iter().enumerate() {
            out.push(Instr::label(format!("msg_{i}")));
            out.push(Instr::DataWord(entry.len));
            out.push(Instr::DataAscii(entry.bytes.clone()));
        }
    }
}
