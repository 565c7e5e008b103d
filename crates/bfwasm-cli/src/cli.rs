use std::path::PathBuf;

use bfwasm_compiler::OptLevel;
use bfwasm_host::{EofPolicy, DEFAULT_MAX_WASM_STACK, DEFAULT_NAMESPACE};
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "bfwasm", version, about, long_about = None)]
pub struct Cli {
    /// Enables debug logging (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub debug: u8,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a compiled module's `main` export
    Run(RunArgs),
    /// Compile a Brainfuck program to a WebAssembly module
    Compile(CompileArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Module to run (.wasm, or .wat text)
    #[arg(value_name = "MODULE")]
    pub module: PathBuf,

    #[command(flatten)]
    pub host: HostArgs,
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Brainfuck source file
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Where to write the module
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Optimization level
    #[arg(short = 'O', long = "opt-level", default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub opt_level: u8,

    /// Report pointer moves off the tape through `debug_terminate`
    #[arg(long)]
    pub bounds_check: bool,

    /// Tape size in 64 KiB pages
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=65536))]
    pub tape_pages: u32,

    /// Print the optimized IR to stdout
    #[arg(long, conflicts_with = "run")]
    pub print_ir: bool,

    /// Run the module after writing it
    #[arg(long)]
    pub run: bool,

    #[command(flatten)]
    pub host: HostArgs,
}

impl CompileArgs {
    pub fn opt_level(&self) -> OptLevel {
        match self.opt_level {
            0 => OptLevel::None,
            1 => OptLevel::Basic,
            _ => OptLevel::Full,
        }
    }
}

/// Settings shared by everything that runs a module
#[derive(Args, Debug)]
pub struct HostArgs {
    /// Print how long `main` took to stderr
    #[arg(long)]
    pub time: bool,

    /// Value `read` returns at end of input
    #[arg(long, value_enum, default_value_t = EofArg::Zero)]
    pub eof: EofArg,

    /// Import namespace the host functions are bound in
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Extra import name bound to `write` (e.g. `log`)
    #[arg(long, value_name = "NAME")]
    pub write_name: Option<String>,

    /// Wasm stack limit in bytes
    #[arg(long, env = "BFWASM_MAX_STACK", default_value_t = DEFAULT_MAX_WASM_STACK)]
    pub max_stack: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofArg {
    Zero,
    MinusOne,
}

impl From<EofArg> for EofPolicy {
    fn from(arg: EofArg) -> Self {
        match arg {
            EofArg::Zero => EofPolicy::Zero,
            EofArg::MinusOne => EofPolicy::MinusOne,
        }
    }
}
