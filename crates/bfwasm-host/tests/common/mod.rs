#![allow(dead_code)]
//! Shared helpers for harness integration tests

use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

use bfwasm_host::{EofPolicy, ImportBindingTable, ImportBindingTableBuilder};

/// Cloneable in-memory sink so tests can inspect what a run wrote
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that always fails
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

/// Streams captured by a test run
pub struct Captured {
    pub output: SharedBuffer,
    pub diagnostics: SharedBuffer,
}

/// Builder wired to in-memory streams, with no bindings yet
pub fn captured_builder(input: &[u8]) -> (ImportBindingTableBuilder, Captured) {
    let output = SharedBuffer::new();
    let diagnostics = SharedBuffer::new();
    let builder = ImportBindingTable::builder()
        .output(output.clone())
        .input(Cursor::new(input.to_vec()))
        .diagnostics(diagnostics.clone());
    (
        builder,
        Captured {
            output,
            diagnostics,
        },
    )
}

/// Standard `env.*` table on in-memory streams
pub fn standard_table(input: &[u8], eof: EofPolicy) -> (ImportBindingTable, Captured) {
    let (builder, captured) = captured_builder(input);
    (
        builder.standard_imports("env").eof_policy(eof).build(),
        captured,
    )
}

/// Assemble a text module
pub fn wasm(text: &str) -> Vec<u8> {
    wat::parse_str(text).expect("test module should assemble")
}
