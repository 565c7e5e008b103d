//! Brainfuck to WebAssembly compiler
//!
//! The generated module keeps the tape in linear memory (one cell per byte),
//! imports `write`/`read`/`debug_terminate` only when the program needs them
//! and exports a single `main: () -> ()`.

use tracing::{debug, info};

pub mod backend;
pub mod ir;

pub use backend::{create_wasm, PAGE_SIZE};
pub use ir::{
    check_brackets, combine_runs, format_ir, parse, simple_loops, zero_cells, Inst, Ir,
};

/// Errors produced while compiling a program
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("unmatched `[` at byte {offset}")]
    UnmatchedOpen { offset: usize },

    #[error("unmatched `]` at byte {offset}")]
    UnmatchedClose { offset: usize },

    #[error("generated module failed validation: {0}")]
    Invalid(String),
}

/// Which optimization passes to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OptLevel {
    /// Straight translation
    None,
    /// Fold runs of `+ - < >`
    Basic,
    /// Also clear loops and multiply loops
    #[default]
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub optimize: OptLevel,
    /// Call `debug_terminate(pointer, instruction)` and trap when the pointer leaves the tape
    pub bounds_check: bool,
    /// Tape size in 64 KiB pages
    pub tape_pages: u32,
    /// Import namespace for the host functions
    pub namespace: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimize: OptLevel::default(),
            bounds_check: false,
            tape_pages: 1,
            namespace: "env".to_string(),
        }
    }
}

/// Parse and optimize a program without emitting anything
pub fn lower(program: &str, options: &CompileOptions) -> Result<Ir, CompileError> {
    let optimize = options.optimize;
    check_brackets(program)?;

    let mut ir = parse(program);
    debug!(target: "compiler", "Parsed {} instructions", ir.len());

    if optimize >= OptLevel::Basic {
        ir = combine_runs(&ir);
    }
    if optimize >= OptLevel::Full {
        ir = zero_cells(&ir);
        ir = simple_loops(&ir, options.bounds_check);
    }
    debug!(target: "compiler", "{} instructions after optimization", ir.len());

    Ok(ir)
}

/// Compile a program to a validated binary module
pub fn compile(program: &str, options: &CompileOptions) -> Result<Vec<u8>, CompileError> {
    let ir = lower(program, options)?;
    let bytes = create_wasm(&ir, options);

    wasmparser::validate(&bytes).map_err(|e| CompileError::Invalid(e.to_string()))?;
    info!(
        target: "compiler",
        "Compiled {} IR instructions into {} bytes",
        ir.len(),
        bytes.len()
    );

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(optimize: OptLevel) -> CompileOptions {
        CompileOptions {
            optimize,
            ..CompileOptions::default()
        }
    }

    #[test]
    fn test_lower_levels() {
        assert_eq!(lower("++", &at(OptLevel::None)).unwrap().len(), 2);
        assert_eq!(lower("++", &at(OptLevel::Basic)).unwrap(), vec![Inst::Add(2)]);
        assert_eq!(lower("+[-]", &at(OptLevel::Basic)).unwrap().len(), 4);
        assert_eq!(
            lower("+[-]", &at(OptLevel::Full)).unwrap(),
            vec![Inst::Add(1), Inst::Zero]
        );
    }

    #[test]
    fn test_lower_keeps_wandering_loops_with_bounds_check() {
        let checked = CompileOptions {
            bounds_check: true,
            ..CompileOptions::default()
        };
        assert_eq!(lower("[-<>]", &at(OptLevel::Full)).unwrap(), vec![Inst::Zero]);
        assert_eq!(lower("[-<>]", &checked).unwrap().len(), 5);
    }

    #[test]
    fn test_compile_rejects_unbalanced() {
        let err = compile("[[]", &CompileOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "unmatched `[` at byte 0");
    }

    #[test]
    fn test_compile_empty_program() {
        let bytes = compile("", &CompileOptions::default()).unwrap();
        assert!(bytes.starts_with(b"\0asm"));
    }
}
