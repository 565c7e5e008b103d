use tracing::debug;
use wasmtime::{Config, Engine, OptLevel};

use crate::HarnessError;

/// Default cap on wasm stack usage (512 KiB)
pub const DEFAULT_MAX_WASM_STACK: usize = 512 * 1024;

/// Engine settings for a [`crate::Harness`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Bytes of native stack wasm code may use before trapping with a stack overflow
    pub max_wasm_stack: usize,
    /// Compile with cranelift optimizations
    pub optimize: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            max_wasm_stack: DEFAULT_MAX_WASM_STACK,
            optimize: cfg!(not(debug_assertions)),
        }
    }
}

impl HarnessConfig {
    pub fn max_wasm_stack(mut self, bytes: usize) -> Self {
        self.max_wasm_stack = bytes;
        self
    }

    pub fn optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }
}

/// Create a configured Wasmtime engine for running modules
pub fn create_engine(config: &HarnessConfig) -> Result<Engine, HarnessError> {
    let mut wasm_config = Config::new();

    // Modules run synchronously on the calling thread
    wasm_config.async_support(false);
    wasm_config.max_wasm_stack(config.max_wasm_stack);

    if config.optimize {
        wasm_config.cranelift_opt_level(OptLevel::Speed);
    } else {
        wasm_config.cranelift_opt_level(OptLevel::None);
    }

    debug!(
        target: "harness",
        "Creating engine (max_wasm_stack={}, optimize={})",
        config.max_wasm_stack,
        config.optimize
    );

    Engine::new(&wasm_config).map_err(|e| HarnessError::Engine(format!("{:#}", e)))
}
