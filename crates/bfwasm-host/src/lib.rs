//! Host harness for running WebAssembly modules
//!
//! Loads a binary module, binds a fixed set of character I/O host functions
//! into its import namespace, instantiates it and invokes its `main` export
//! on the calling thread.
//!
//! ```no_run
//! use bfwasm_host::{Harness, HarnessConfig, ImportBindingTable};
//!
//! let bytes = std::fs::read("prog.wasm")?;
//! let harness = Harness::new(&HarnessConfig::default())?;
//! let report = harness.run(&bytes, ImportBindingTable::standard())?;
//! eprintln!("ran in {:?}", report.elapsed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bindings;
pub mod engine;
pub mod error;
pub mod loader;
pub mod runner;

pub use bindings::{
    DebugReport, EofPolicy, HostFunction, ImportBindingTable, ImportBindingTableBuilder,
    DEFAULT_NAMESPACE,
};
pub use engine::{create_engine, HarnessConfig, DEFAULT_MAX_WASM_STACK};
pub use error::{HarnessError, TrapContext, TrapKind};
pub use loader::load_module;
pub use runner::{run, Harness, RunReport, ENTRY_POINT};
