//! Command line front end: `bfwasm run` and `bfwasm compile`

pub mod cli;
pub mod logging;

use std::fs;

use anyhow::{Context, Result};
use bfwasm_compiler::{compile, format_ir, lower, CompileError, CompileOptions};
use bfwasm_host::{
    load_module, Harness, HarnessConfig, HarnessError, HostFunction, ImportBindingTable,
};
use tracing::info;

use cli::{Command, CompileArgs, HostArgs, RunArgs};

/// Exit code used for compile errors
pub const COMPILE_ERROR_EXIT: u8 = 10;

/// Dispatch a parsed subcommand
pub fn execute(command: Command) -> Result<()> {
    match command {
        Command::Run(args) => run_module(args),
        Command::Compile(args) => compile_program(args),
    }
}

/// Standard bindings on stdio, plus the optional `write` alias
pub fn bindings(host: &HostArgs) -> ImportBindingTable {
    let mut builder = ImportBindingTable::builder()
        .standard_imports(&host.namespace)
        .eof_policy(host.eof.into());
    if let Some(name) = &host.write_name {
        builder = builder.bind(&host.namespace, name, HostFunction::Write);
    }
    builder.build()
}

fn run_module(args: RunArgs) -> Result<()> {
    let bytes = load_module(&args.module)
        .with_context(|| format!("failed to load {}", args.module.display()))?;
    run_bytes(&bytes, &args.host)
}

fn run_bytes(bytes: &[u8], host: &HostArgs) -> Result<()> {
    let config = HarnessConfig::default().max_wasm_stack(host.max_stack);
    let harness = Harness::new(&config)?;

    let report = harness.run(bytes, bindings(host))?;
    if host.time {
        eprintln!("elapsed: {:?}", report.elapsed);
    }

    Ok(())
}

fn compile_program(args: CompileArgs) -> Result<()> {
    let source = fs::read_to_string(&args.source)
        .with_context(|| format!("failed to read {}", args.source.display()))?;

    let options = CompileOptions {
        optimize: args.opt_level(),
        bounds_check: args.bounds_check,
        tape_pages: args.tape_pages,
        namespace: args.host.namespace.clone(),
    };

    if args.print_ir {
        let ir = lower(&source, &options)?;
        print!("{}", format_ir(&ir));
    }
    let bytes = compile(&source, &options)?;

    fs::write(&args.output, &bytes)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!(
        "Wrote {} ({} bytes) from {}",
        args.output.display(),
        bytes.len(),
        args.source.display()
    );

    if args.run {
        run_bytes(&bytes, &args.host)?;
    }

    Ok(())
}

/// Process exit code for a failure
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(harness) = err.downcast_ref::<HarnessError>() {
        harness.exit_code()
    } else if err.downcast_ref::<CompileError>().is_some() {
        COMPILE_ERROR_EXIT
    } else {
        1
    }
}

/// Single-line description of a failure, led by its kind
pub fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<HarnessError>() {
        Some(harness) => format!("{}: {:#}", harness.kind_name(), err),
        None => format!("{:#}", err),
    }
}
