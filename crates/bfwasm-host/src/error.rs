use std::fmt;
use std::io;

use crate::bindings::DebugReport;

/// Why a module stopped executing abnormally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapKind {
    /// An `unreachable` instruction was executed
    Unreachable,
    /// A load or store fell outside linear memory
    MemoryOutOfBounds,
    /// Signed integer overflow in a division or truncation
    IntegerOverflow,
    /// Integer division or remainder by zero
    IntegerDivisionByZero,
    /// The wasm call stack was exhausted
    StackOverflow,
    /// A float could not be converted to an integer
    BadConversionToInteger,
    /// `call_indirect` hit a null entry, an out-of-range index or the wrong signature
    IndirectCall,
    /// Anything else the engine reports
    Other(String),
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapKind::Unreachable => write!(f, "unreachable instruction executed"),
            TrapKind::MemoryOutOfBounds => write!(f, "out of bounds memory access"),
            TrapKind::IntegerOverflow => write!(f, "integer overflow"),
            TrapKind::IntegerDivisionByZero => write!(f, "integer divide by zero"),
            TrapKind::StackOverflow => write!(f, "call stack exhausted"),
            TrapKind::BadConversionToInteger => write!(f, "invalid conversion to integer"),
            TrapKind::IndirectCall => write!(f, "invalid indirect call"),
            TrapKind::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Wraps an optional `debug_terminate` report so it can be appended to a trap message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrapContext(pub Option<DebugReport>);

impl fmt::Display for TrapContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(report) => write!(f, " ({})", report),
            None => Ok(()),
        }
    }
}

/// Every way a harness run can fail
///
/// None of these are retried. Bytes already written by the module before the
/// failure stay on the output stream.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("malformed module: {0}")]
    MalformedModule(String),

    #[error("unresolved import `{namespace}.{name}`: {detail}")]
    UnresolvedImport {
        namespace: String,
        name: String,
        detail: String,
    },

    #[error("trap during instantiation: {kind}{context}")]
    InstantiationTrap { kind: TrapKind, context: TrapContext },

    #[error("missing entry point `main`: {0}")]
    MissingEntryPoint(String),

    #[error("trap during execution: {kind}{context}")]
    ExecutionTrap { kind: TrapKind, context: TrapContext },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to configure wasm engine: {0}")]
    Engine(String),
}

impl HarnessError {
    /// Short name of the failure kind, used in diagnostics and logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            HarnessError::MalformedModule(_) => "MalformedModule",
            HarnessError::UnresolvedImport { .. } => "UnresolvedImport",
            HarnessError::InstantiationTrap { .. } => "InstantiationTrap",
            HarnessError::MissingEntryPoint(_) => "MissingEntryPoint",
            HarnessError::ExecutionTrap { .. } => "ExecutionTrap",
            HarnessError::Io(_) => "IOError",
            HarnessError::Engine(_) => "EngineError",
        }
    }

    /// Process exit code for this failure. Zero is reserved for success.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::MalformedModule(_) => 3,
            HarnessError::UnresolvedImport { .. } => 4,
            HarnessError::InstantiationTrap { .. } => 5,
            HarnessError::MissingEntryPoint(_) => 6,
            HarnessError::ExecutionTrap { .. } => 7,
            HarnessError::Io(_) => 8,
            HarnessError::Engine(_) => 9,
        }
    }

    /// The trap kind, for the two trap variants
    pub fn trap_kind(&self) -> Option<&TrapKind> {
        match self {
            HarnessError::InstantiationTrap { kind, .. }
            | HarnessError::ExecutionTrap { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// The last `debug_terminate` report received before a trap, if any
    pub fn debug_report(&self) -> Option<&DebugReport> {
        match self {
            HarnessError::InstantiationTrap { context, .. }
            | HarnessError::ExecutionTrap { context, .. } => context.0.as_ref(),
            _ => None,
        }
    }
}

/// Map an engine error back to a trap kind
pub(crate) fn classify_trap(err: &anyhow::Error) -> TrapKind {
    use wasmtime::Trap;

    match err.downcast_ref::<Trap>() {
        Some(Trap::UnreachableCodeReached) => TrapKind::Unreachable,
        Some(Trap::MemoryOutOfBounds) | Some(Trap::HeapMisaligned) => TrapKind::MemoryOutOfBounds,
        Some(Trap::IntegerOverflow) => TrapKind::IntegerOverflow,
        Some(Trap::IntegerDivisionByZero) => TrapKind::IntegerDivisionByZero,
        Some(Trap::StackOverflow) => TrapKind::StackOverflow,
        Some(Trap::BadConversionToInteger) => TrapKind::BadConversionToInteger,
        Some(Trap::IndirectCallToNull) | Some(Trap::BadSignature) | Some(Trap::TableOutOfBounds) => {
            TrapKind::IndirectCall
        }
        Some(other) => TrapKind::Other(other.to_string()),
        None => TrapKind::Other(format!("{:#}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = [
            HarnessError::MalformedModule(String::new()),
            HarnessError::UnresolvedImport {
                namespace: "env".into(),
                name: "write".into(),
                detail: String::new(),
            },
            HarnessError::InstantiationTrap {
                kind: TrapKind::Unreachable,
                context: TrapContext::default(),
            },
            HarnessError::MissingEntryPoint(String::new()),
            HarnessError::ExecutionTrap {
                kind: TrapKind::Unreachable,
                context: TrapContext::default(),
            },
            HarnessError::Io(io::Error::other("boom")),
            HarnessError::Engine(String::new()),
        ];

        let mut codes: Vec<u8> = errors.iter().map(|e| e.exit_code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_trap_message_includes_debug_report() {
        let err = HarnessError::ExecutionTrap {
            kind: TrapKind::Unreachable,
            context: TrapContext(Some(DebugReport {
                cell_index: 70000,
                value: 12,
            })),
        };

        let msg = err.to_string();
        assert_eq!(
            msg,
            "trap during execution: unreachable instruction executed (debug_terminate: cell 70000, value 12)"
        );
        assert!(!msg.contains('\n'));
    }

    #[test]
    fn test_unresolved_import_names_the_pair() {
        let err = HarnessError::UnresolvedImport {
            namespace: "env".into(),
            name: "read".into(),
            detail: "no host binding".into(),
        };
        assert_eq!(
            err.to_string(),
            "unresolved import `env.read`: no host binding"
        );
        assert_eq!(err.kind_name(), "UnresolvedImport");
    }

    #[test]
    fn test_classify_non_trap_error() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(classify_trap(&err), TrapKind::Other("something else".into()));
    }

    #[test]
    fn test_classify_trap() {
        let err = anyhow::Error::from(wasmtime::Trap::IntegerDivisionByZero);
        assert_eq!(classify_trap(&err), TrapKind::IntegerDivisionByZero);
    }
}
