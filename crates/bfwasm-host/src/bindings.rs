use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufWriter, Read, Write};

use tracing::{debug, warn};
use wasmtime::{Caller, FuncType, Linker, ValType};

/// Namespace used by [`ImportBindingTable::standard`]
pub const DEFAULT_NAMESPACE: &str = "env";

/// A host function that can be bound into a module's import namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFunction {
    /// `(i32) -> ()`: emit the low 8 bits of the argument as one raw byte
    Write,
    /// `() -> i32`: block for one byte of input
    Read,
    /// `(i32, i32) -> ()`: forward a cell index and value to the diagnostic sink
    DebugTerminate,
}

impl HostFunction {
    /// Conventional import name
    pub fn default_name(&self) -> &'static str {
        match self {
            HostFunction::Write => "write",
            HostFunction::Read => "read",
            HostFunction::DebugTerminate => "debug_terminate",
        }
    }

    fn param_count(&self) -> usize {
        match self {
            HostFunction::Write => 1,
            HostFunction::Read => 0,
            HostFunction::DebugTerminate => 2,
        }
    }

    fn result_count(&self) -> usize {
        match self {
            HostFunction::Read => 1,
            HostFunction::Write | HostFunction::DebugTerminate => 0,
        }
    }

    /// Human-readable signature, e.g. `[i32] -> []`
    pub fn signature(&self) -> String {
        format!(
            "[{}] -> [{}]",
            vec!["i32"; self.param_count()].join(" "),
            vec!["i32"; self.result_count()].join(" ")
        )
    }

    /// Check an imported function type against this binding. All values are i32.
    pub fn accepts(&self, ty: &FuncType) -> bool {
        ty.params().len() == self.param_count()
            && ty.results().len() == self.result_count()
            && ty.params().all(|p| matches!(p, ValType::I32))
            && ty.results().all(|r| matches!(r, ValType::I32))
    }
}

/// Render a function type as `[params] -> [results]`
pub(crate) fn describe_func_type(ty: &FuncType) -> String {
    let params: Vec<String> = ty.params().map(|p| p.to_string()).collect();
    let results: Vec<String> = ty.results().map(|r| r.to_string()).collect();
    format!("[{}] -> [{}]", params.join(" "), results.join(" "))
}

/// What `read` returns once the input stream is exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EofPolicy {
    /// Return 0
    #[default]
    Zero,
    /// Return -1, which no real byte can produce
    MinusOne,
}

impl EofPolicy {
    pub fn value(&self) -> i32 {
        match self {
            EofPolicy::Zero => 0,
            EofPolicy::MinusOne => -1,
        }
    }
}

/// One call to `debug_terminate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugReport {
    pub cell_index: i32,
    pub value: i32,
}

impl fmt::Display for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "debug_terminate: cell {}, value {}",
            self.cell_index, self.value
        )
    }
}

/// Raised from inside a host function when one of the harness' streams fails
#[derive(Debug, thiserror::Error)]
#[error("`{binding}` failed: {source}")]
pub(crate) struct HostIoError {
    pub binding: &'static str,
    #[source]
    pub source: io::Error,
}

type Output = Box<dyn Write + Send>;
type Input = Box<dyn Read + Send>;

/// Mapping of `(namespace, name)` to host functions, plus the streams they use
///
/// Built once before instantiation and consumed by the run, so every run gets
/// fresh streams and counters.
pub struct ImportBindingTable {
    entries: BTreeMap<(String, String), HostFunction>,
    output: Output,
    input: Input,
    diagnostics: Output,
    eof_policy: EofPolicy,
}

impl fmt::Debug for ImportBindingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportBindingTable")
            .field("entries", &self.entries)
            .field("eof_policy", &self.eof_policy)
            .finish_non_exhaustive()
    }
}

impl ImportBindingTable {
    pub fn builder() -> ImportBindingTableBuilder {
        ImportBindingTableBuilder::new()
    }

    /// `env.write`, `env.read` and `env.debug_terminate` on stdout, stdin and stderr
    pub fn standard() -> Self {
        Self::builder().standard_imports(DEFAULT_NAMESPACE).build()
    }

    /// Look up the binding for an import
    pub fn get(&self, namespace: &str, name: &str) -> Option<HostFunction> {
        self.entries
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn eof_policy(&self) -> EofPolicy {
        self.eof_policy
    }

    /// Iterate over `(namespace, name, function)` in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, HostFunction)> {
        self.entries
            .iter()
            .map(|((ns, name), func)| (ns.as_str(), name.as_str(), *func))
    }

    /// Split into the linker definitions and the per-run store state
    pub(crate) fn into_parts(self) -> (BTreeMap<(String, String), HostFunction>, HostState) {
        let state = HostState {
            output: BufWriter::new(self.output),
            input: self.input,
            diagnostics: self.diagnostics,
            eof_policy: self.eof_policy,
            bytes_written: 0,
            bytes_read: 0,
            reports: Vec::new(),
        };
        (self.entries, state)
    }
}

/// Builder for [`ImportBindingTable`]
///
/// Streams default to the process' stdout, stdin and stderr.
pub struct ImportBindingTableBuilder {
    entries: BTreeMap<(String, String), HostFunction>,
    output: Option<Output>,
    input: Option<Input>,
    diagnostics: Option<Output>,
    eof_policy: EofPolicy,
}

impl ImportBindingTableBuilder {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            output: None,
            input: None,
            diagnostics: None,
            eof_policy: EofPolicy::default(),
        }
    }

    /// Bind `function` under `namespace.name`, replacing any earlier binding of that pair
    pub fn bind(
        mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        function: HostFunction,
    ) -> Self {
        self.entries
            .insert((namespace.into(), name.into()), function);
        self
    }

    /// Bind `write`, `read` and `debug_terminate` under their conventional names
    pub fn standard_imports(self, namespace: &str) -> Self {
        self.bind(namespace, "write", HostFunction::Write)
            .bind(namespace, "read", HostFunction::Read)
            .bind(namespace, "debug_terminate", HostFunction::DebugTerminate)
    }

    /// Stream receiving bytes from `write`
    pub fn output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    /// Stream consumed by `read`
    pub fn input(mut self, input: impl Read + Send + 'static) -> Self {
        self.input = Some(Box::new(input));
        self
    }

    /// Sink for `debug_terminate` lines
    pub fn diagnostics(mut self, diagnostics: impl Write + Send + 'static) -> Self {
        self.diagnostics = Some(Box::new(diagnostics));
        self
    }

    pub fn eof_policy(mut self, policy: EofPolicy) -> Self {
        self.eof_policy = policy;
        self
    }

    pub fn build(self) -> ImportBindingTable {
        ImportBindingTable {
            entries: self.entries,
            output: self.output.unwrap_or_else(|| Box::new(io::stdout())),
            input: self.input.unwrap_or_else(|| Box::new(io::stdin())),
            diagnostics: self.diagnostics.unwrap_or_else(|| Box::new(io::stderr())),
            eof_policy: self.eof_policy,
        }
    }
}

impl Default for ImportBindingTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run state owned by the wasmtime store
pub(crate) struct HostState {
    output: BufWriter<Output>,
    input: Input,
    diagnostics: Output,
    eof_policy: EofPolicy,
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub reports: Vec<DebugReport>,
}

impl HostState {
    fn write_byte(&mut self, value: i32) -> Result<(), HostIoError> {
        let byte = value as u8;
        self.output
            .write_all(&[byte])
            .map_err(|source| HostIoError {
                binding: "write",
                source,
            })?;
        self.bytes_written += 1;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<i32, HostIoError> {
        // Anything the module printed as a prompt has to be visible before we block
        self.flush_output().map_err(|source| HostIoError {
            binding: "read",
            source,
        })?;

        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => {
                    debug!(target: "harness", "read hit end of input");
                    return Ok(self.eof_policy.value());
                }
                Ok(_) => {
                    self.bytes_read += 1;
                    return Ok(i32::from(buf[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(HostIoError {
                        binding: "read",
                        source,
                    });
                }
            }
        }
    }

    fn debug_terminate(&mut self, cell_index: i32, value: i32) -> Result<(), HostIoError> {
        let report = DebugReport { cell_index, value };
        warn!(target: "harness", "{}", report);
        self.reports.push(report);

        // Keep program output and the diagnostic line in call order
        self.output.flush().map_err(|source| HostIoError {
            binding: "debug_terminate",
            source,
        })?;
        writeln!(self.diagnostics, "{}", report)
            .and_then(|_| self.diagnostics.flush())
            .map_err(|source| HostIoError {
                binding: "debug_terminate",
                source,
            })
    }

    pub fn flush_output(&mut self) -> io::Result<()> {
        self.output.flush()
    }

    pub fn last_report(&self) -> Option<DebugReport> {
        self.reports.last().copied()
    }
}

/// Define every binding of the table in `linker`
pub(crate) fn add_host_imports(
    linker: &mut Linker<HostState>,
    entries: &BTreeMap<(String, String), HostFunction>,
) -> anyhow::Result<()> {
    for ((namespace, name), function) in entries {
        match function {
            HostFunction::Write => {
                linker.func_wrap(
                    namespace,
                    name,
                    |mut caller: Caller<'_, HostState>, value: i32| -> anyhow::Result<()> {
                        caller.data_mut().write_byte(value)?;
                        Ok(())
                    },
                )?;
            }
            HostFunction::Read => {
                linker.func_wrap(
                    namespace,
                    name,
                    |mut caller: Caller<'_, HostState>| -> anyhow::Result<i32> {
                        Ok(caller.data_mut().read_byte()?)
                    },
                )?;
            }
            HostFunction::DebugTerminate => {
                linker.func_wrap(
                    namespace,
                    name,
                    |mut caller: Caller<'_, HostState>,
                     cell_index: i32,
                     value: i32|
                     -> anyhow::Result<()> {
                        caller.data_mut().debug_terminate(cell_index, value)?;
                        Ok(())
                    },
                )?;
            }
        }
    }

    Ok(())
}
