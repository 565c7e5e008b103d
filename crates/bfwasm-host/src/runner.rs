use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use wasmtime::{Engine, ExternType, Instance, Linker, Module, Store, TypedFunc};

use crate::bindings::{add_host_imports, describe_func_type, HostIoError, HostState};
use crate::engine::create_engine;
use crate::error::{classify_trap, TrapContext};
use crate::{DebugReport, HarnessConfig, HarnessError, ImportBindingTable, TrapKind};

/// Name of the exported entry point
pub const ENTRY_POINT: &str = "main";

/// Observations from a run that completed normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Wall-clock time spent inside `main`
    pub elapsed: Duration,
    pub bytes_written: u64,
    pub bytes_read: u64,
    /// Every `debug_terminate` call, in order
    pub debug_reports: Vec<DebugReport>,
}

/// Runs one module at a time against an import binding table
///
/// The engine is shared across runs; every run gets its own store, so no
/// module state survives from one run to the next.
#[derive(Clone)]
pub struct Harness {
    engine: Engine,
}

impl Harness {
    pub fn new(config: &HarnessConfig) -> Result<Self, HarnessError> {
        Ok(Self {
            engine: create_engine(config)?,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Validate and compile module bytes without running anything
    pub fn compile(&self, module_bytes: &[u8]) -> Result<Module, HarnessError> {
        Module::from_binary(&self.engine, module_bytes)
            .map_err(|e| HarnessError::MalformedModule(format!("{:#}", e)))
    }

    /// Compile, resolve imports, instantiate and invoke `main`
    pub fn run(
        &self,
        module_bytes: &[u8],
        bindings: ImportBindingTable,
    ) -> Result<RunReport, HarnessError> {
        let module = self.compile(module_bytes)?;
        debug!(target: "harness", "Compiled module ({} bytes)", module_bytes.len());

        resolve_imports(&module, &bindings)?;

        let (entries, state) = bindings.into_parts();
        let mut linker = Linker::new(&self.engine);
        add_host_imports(&mut linker, &entries)
            .map_err(|e| HarnessError::Engine(format!("{:#}", e)))?;

        let mut store = Store::new(&self.engine, state);
        let result = execute(&linker, &mut store, &module);

        // Bytes written before a failure still belong on the output stream
        let flushed = store.data_mut().flush_output();
        let report = result?;
        flushed?;

        Ok(report)
    }
}

/// Run a module with a default-configured harness
pub fn run(module_bytes: &[u8], bindings: ImportBindingTable) -> Result<RunReport, HarnessError> {
    Harness::new(&HarnessConfig::default())?.run(module_bytes, bindings)
}

/// Check every declared import against the table, in declaration order
fn resolve_imports(module: &Module, bindings: &ImportBindingTable) -> Result<(), HarnessError> {
    for import in module.imports() {
        let unresolved = |detail: String| HarnessError::UnresolvedImport {
            namespace: import.module().to_string(),
            name: import.name().to_string(),
            detail,
        };

        let function = bindings
            .get(import.module(), import.name())
            .ok_or_else(|| unresolved("no host binding".to_string()))?;

        match import.ty() {
            ExternType::Func(ty) => {
                if !function.accepts(&ty) {
                    return Err(unresolved(format!(
                        "`{}` expects {}, module declares {}",
                        function.default_name(),
                        function.signature(),
                        describe_func_type(&ty)
                    )));
                }
            }
            other => {
                return Err(unresolved(format!(
                    "only functions can be imported, module declares {:?}",
                    other
                )));
            }
        }

        debug!(
            target: "harness",
            "Resolved import {}.{} -> {:?}",
            import.module(),
            import.name(),
            function
        );
    }

    Ok(())
}

fn execute(
    linker: &Linker<HostState>,
    store: &mut Store<HostState>,
    module: &Module,
) -> Result<RunReport, HarnessError> {
    let instance = linker.instantiate(&mut *store, module).map_err(|e| {
        into_trap_error(e, store.data().last_report(), |kind, context| {
            HarnessError::InstantiationTrap { kind, context }
        })
    })?;
    debug!(target: "harness", "Instantiated module");

    let main = entry_point(&instance, store)?;

    info!(target: "harness", "Invoking `{}`", ENTRY_POINT);
    let start = Instant::now();
    let outcome = main.call(&mut *store, ());
    let elapsed = start.elapsed();

    match outcome {
        Ok(()) => {
            let state = store.data();
            info!(
                target: "harness",
                "`{}` returned after {:?} ({} bytes written, {} bytes read)",
                ENTRY_POINT,
                elapsed,
                state.bytes_written,
                state.bytes_read
            );
            Ok(RunReport {
                elapsed,
                bytes_written: state.bytes_written,
                bytes_read: state.bytes_read,
                debug_reports: state.reports.clone(),
            })
        }
        Err(e) => {
            let err = into_trap_error(e, store.data().last_report(), |kind, context| {
                HarnessError::ExecutionTrap { kind, context }
            });
            warn!(target: "harness", "`{}` failed after {:?}: {}", ENTRY_POINT, elapsed, err);
            Err(err)
        }
    }
}

fn entry_point(
    instance: &Instance,
    store: &mut Store<HostState>,
) -> Result<TypedFunc<(), ()>, HarnessError> {
    let func = instance.get_func(&mut *store, ENTRY_POINT).ok_or_else(|| {
        HarnessError::MissingEntryPoint("module has no function export named `main`".to_string())
    })?;

    func.typed::<(), ()>(&*store).map_err(|_| {
        HarnessError::MissingEntryPoint(format!(
            "`main` must take no arguments and return nothing, found {}",
            describe_func_type(&func.ty(&*store))
        ))
    })
}

/// Host stream failures surface as `Io`; everything else is a trap
fn into_trap_error(
    err: anyhow::Error,
    report: Option<DebugReport>,
    make: impl FnOnce(TrapKind, TrapContext) -> HarnessError,
) -> HarnessError {
    match err.downcast::<HostIoError>() {
        Ok(host) => {
            warn!(target: "harness", "{}", host);
            HarnessError::Io(host.source)
        }
        Err(err) => make(classify_trap(&err), TrapContext(report)),
    }
}
