//! Sandboxed evaluation of check scripts
//!
//! A script defines `fn check(rows)` and returns a list of result maps:
//!
//! ```text
//! fn check(rows) {
//!     let v = parse_version(rows[0].version);
//!     if v.num < 80000 {
//!         return [#{ summary: "Old MySQL", severity: "warning", labels: #{} }];
//!     }
//!     []
//! }
//! ```
//!
//! The engine only sees the host functions injected for the check's
//! version. Module imports are disabled and every run is bounded by an
//! operation limit and by caps on string, array and map sizes. Faults
//! inside the engine, including panics, come back as
//! [`ChecksError::Script`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::future::join_all;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{AST, Dynamic, Engine, EvalAltResult, Scope};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::bundle::Check;
use super::error::ChecksError;
use super::funcs::{FuncRegistry, FuncSet, HostFunction};
use super::result::{CheckResult, ScriptResult, parse_script_output};
use crate::Target;

const ENTRY_POINT: &str = "check";
const MAX_OPERATIONS: u64 = 1_000_000;
const MAX_CALL_LEVELS: usize = 32;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_STRING_SIZE: usize = 1024 * 1024;
const MAX_ARRAY_SIZE: usize = 100_000;
const MAX_MAP_SIZE: usize = 100_000;

/// A compiled script with its host functions
pub struct Sandbox {
    check_name: String,
    engine: Engine,
    ast: AST,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("check_name", &self.check_name)
            .finish_non_exhaustive()
    }
}

fn call_host(name: &str, func: &HostFunction, args: &[Dynamic]) -> Result<Dynamic, Box<EvalAltResult>> {
    let args = args
        .iter()
        .map(rhai::serde::from_dynamic::<Value>)
        .collect::<Result<Vec<_>, _>>()?;
    let value = func(&args).map_err(|e| format!("{name}: {e}"))?;
    rhai::serde::to_dynamic(value)
}

fn register(engine: &mut Engine, name: &'static str, func: HostFunction) {
    // Host functions validate their own arity, so expose every arity up to two.
    let f = Arc::clone(&func);
    engine.register_fn(name, move || call_host(name, &f, &[]));
    let f = Arc::clone(&func);
    engine.register_fn(name, move |a: Dynamic| call_host(name, &f, &[a]));
    engine.register_fn(name, move |a: Dynamic, b: Dynamic| {
        call_host(name, &func, &[a, b])
    });
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Sandbox {
    pub fn new(check_name: &str, script: &str, funcs: FuncSet) -> Result<Self, ChecksError> {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_ARRAY_SIZE);
        engine.set_max_map_size(MAX_MAP_SIZE);
        engine.set_module_resolver(DummyModuleResolver::new());

        let name = check_name.to_string();
        engine.on_print(move |s| debug!(check = %name, "print: {s}"));
        let name = check_name.to_string();
        engine.on_debug(move |s, _, pos| debug!(check = %name, %pos, "debug: {s}"));

        for (fn_name, func) in funcs {
            register(&mut engine, fn_name, func);
        }

        let ast = engine.compile(script).map_err(|e| ChecksError::Script {
            check: check_name.to_string(),
            message: format!("failed to compile: {e}"),
        })?;

        Ok(Self {
            check_name: check_name.to_string(),
            engine,
            ast,
        })
    }

    pub fn check_name(&self) -> &str {
        &self.check_name
    }

    /// Run the entry point on a row set and validate what it returns.
    pub fn run(&self, rows: &[Value]) -> Result<Vec<ScriptResult>, ChecksError> {
        let script_error = |message: String| ChecksError::Script {
            check: self.check_name.clone(),
            message,
        };

        let output = catch_unwind(AssertUnwindSafe(|| {
            let rows = rhai::serde::to_dynamic(rows)?;
            self.engine
                .call_fn::<Dynamic>(&mut Scope::new(), &self.ast, ENTRY_POINT, (rows,))
        }))
        .map_err(|payload| script_error(format!("panic: {}", panic_message(payload))))?
        .map_err(|e| script_error(e.to_string()))?;

        let validation_error = |message: String| ChecksError::Validation {
            check: self.check_name.clone(),
            message,
        };
        let output = rhai::serde::from_dynamic::<Value>(&output)
            .map_err(|e| validation_error(e.to_string()))?;
        parse_script_output(&output).map_err(validation_error)
    }
}

/// Evaluates checks against targets using the function set of each check's version
#[derive(Debug, Clone)]
pub struct CheckRunner {
    registry: FuncRegistry,
}

impl CheckRunner {
    pub fn new(registry: FuncRegistry) -> Self {
        Self { registry }
    }

    /// Compile a check. Fails for unsupported versions and invalid scripts.
    pub fn prepare(&self, check: &Check) -> Result<Arc<Sandbox>, ChecksError> {
        let funcs = self.registry.funcs_for_version(check.version)?;
        Sandbox::new(&check.name, &check.script, funcs).map(Arc::new)
    }

    /// Evaluate one check against one target's rows.
    pub fn evaluate(
        &self,
        check: &Check,
        target: &Target,
        rows: &[Value],
    ) -> Result<Vec<CheckResult>, ChecksError> {
        let sandbox = self.prepare(check)?;
        evaluate_prepared(&sandbox, target, rows)
    }

    /// Evaluate a check against many targets in parallel.
    ///
    /// Failures are logged and only drop the affected target's results.
    #[instrument(skip_all, fields(check = %check.name, targets = inputs.len()))]
    pub async fn run_check(&self, check: &Check, inputs: Vec<(Target, Vec<Value>)>) -> Vec<CheckResult> {
        let sandbox = match self.prepare(check) {
            Ok(sandbox) => sandbox,
            Err(e) => {
                warn!(error = %e, "skipping check");
                return vec![];
            }
        };

        let tasks = inputs.into_iter().map(|(target, rows)| {
            let sandbox = Arc::clone(&sandbox);
            let service_id = target.service_id.clone();
            let handle =
                tokio::task::spawn_blocking(move || evaluate_prepared(&sandbox, &target, &rows));
            async move {
                match handle.await {
                    Ok(Ok(results)) => results,
                    Ok(Err(e)) => {
                        warn!(%service_id, error = %e, "check evaluation failed");
                        vec![]
                    }
                    Err(e) => {
                        warn!(%service_id, error = %e, "check evaluation task failed");
                        vec![]
                    }
                }
            }
        });

        let results: Vec<CheckResult> = join_all(tasks).await.into_iter().flatten().collect();
        debug!(results = results.len(), "check finished");
        results
    }
}

fn evaluate_prepared(
    sandbox: &Sandbox,
    target: &Target,
    rows: &[Value],
) -> Result<Vec<CheckResult>, ChecksError> {
    Ok(sandbox
        .run(rows)?
        .into_iter()
        .map(|result| CheckResult::new(sandbox.check_name(), target, result))
        .collect())
}
