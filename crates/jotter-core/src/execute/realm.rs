//! Per-execution realm setup shared by the execution host and the sandbox renderer.

use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::object::Filter;
use rquickjs::{Ctx, Function, Module, Object, Persistent, Promise, Type, Value};

use crate::cell::CellId;
use crate::error::{Error, JsResultExt, Result};
use crate::namespace::JsValueStore;

const PRELUDE: &str = include_str!("prelude.js");

/// Target for console output forwarded from cell realms.
pub const CONSOLE_TARGET: &str = "jotter::console";

/// Upper bound on jobs run while settling a realm after its module finished.
pub(crate) const SETTLE_JOB_BUDGET: usize = 10_000;

/// Lines captured from display and console calls.
#[derive(Clone, Default)]
pub(crate) struct LineSink(Rc<RefCell<Vec<String>>>);

impl LineSink {
    fn push(&self, line: String) {
        self.0.borrow_mut().push(line);
    }

    pub(crate) fn last(&self) -> Option<String> {
        self.0.borrow().last().cloned()
    }

    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Where display and console output goes right now.
///
/// One route per session. Every realm's `display` and `console` write
/// through it, so a function published by an earlier cell prints into the
/// execution that calls it.
#[derive(Clone, Default)]
pub(crate) struct OutputRoute(Rc<RefCell<Option<(CellId, LineSink)>>>);

impl OutputRoute {
    /// Direct output into a fresh sink for `cell_id` until [`OutputRoute::close`].
    pub(crate) fn open(&self, cell_id: CellId) -> LineSink {
        let sink = LineSink::default();
        *self.0.borrow_mut() = Some((cell_id, sink.clone()));
        sink
    }

    pub(crate) fn close(&self) {
        *self.0.borrow_mut() = None;
    }

    fn emit(&self, line: String) -> Option<CellId> {
        let current = self.0.borrow();
        let (cell_id, sink) = current.as_ref()?;
        sink.push(line);
        Some(*cell_id)
    }
}

/// Install `display` and `console` into the realm. Returns the display function.
///
/// Must run before any namespace entry lands on the global object: the
/// prelude captures the builtins it relies on at install time.
pub(crate) fn install_output<'js>(
    ctx: &Ctx<'js>,
    route: &OutputRoute,
) -> Result<Function<'js>> {
    let emit = {
        let route = route.clone();
        Function::new(ctx.clone(), move |level: String, line: String| {
            let Some(cell_id) = route.emit(line.clone()) else {
                tracing::debug!("Dropped output outside of any execution: {}", line);
                return;
            };
            match level.as_str() {
                "display" => {}
                "error" => tracing::error!(target: CONSOLE_TARGET, "[{}] {}", cell_id, line),
                "warn" => tracing::warn!(target: CONSOLE_TARGET, "[{}] {}", cell_id, line),
                "debug" => tracing::debug!(target: CONSOLE_TARGET, "[{}] {}", cell_id, line),
                _ => tracing::info!(target: CONSOLE_TARGET, "[{}] {}", cell_id, line),
            }
        })
        .catch_js(ctx)?
    };

    let installer: Function = ctx.eval(PRELUDE).catch_js(ctx)?;
    installer.call((emit,)).catch_js(ctx)
}

/// Make namespace entries reachable from the realm.
///
/// Every entry becomes a global property, so unqualified reads resolve. The
/// namespace binding itself is a fresh staging object whose prototype holds
/// the snapshot: reads fall through to the snapshot while publication
/// statements land as own properties of the staging object.
pub(crate) fn propagate_namespace<'js>(
    ctx: &Ctx<'js>,
    binding: &str,
    namespace: &JsValueStore,
) -> Result<Object<'js>> {
    let globals = ctx.globals();
    let snapshot = Object::new(ctx.clone()).catch_js(ctx)?;
    let staging = Object::new(ctx.clone()).catch_js(ctx)?;
    staging.set_prototype(Some(&snapshot)).catch_js(ctx)?;

    for (name, value) in namespace.snapshot() {
        let value = value.restore(ctx)?;
        snapshot.set(name.as_str(), value.clone()).catch_js(ctx)?;
        globals.set(name.as_str(), value).catch_js(ctx)?;
    }
    globals.set(binding, staging.clone()).catch_js(ctx)?;
    Ok(staging)
}

/// Declare and evaluate `code` as a module, driving top-level await to completion.
///
/// Returns the module namespace object. A `SyntaxError` while declaring is
/// a parse failure; failing to resolve or load an import is a runtime one.
pub(crate) fn load_module<'js>(ctx: &Ctx<'js>, name: &str, code: &str) -> Result<Object<'js>> {
    let declared = Module::declare(ctx.clone(), name, code).map_err(|_| {
        let thrown = ctx.catch();
        let syntax = thrown
            .as_object()
            .and_then(|object| object.get::<_, String>("name").ok())
            .is_some_and(|kind| kind == "SyntaxError");
        match Error::from_js_value(ctx, thrown) {
            Error::Runtime { message, .. } if syntax => Error::Parse { message },
            other => other,
        }
    })?;
    let (module, promise) = declared.eval().catch_js(ctx)?;
    drive_promise(ctx, &promise)?;
    module.namespace().catch_js(ctx)
}

/// Run queued jobs until `promise` settles.
fn drive_promise<'js>(ctx: &Ctx<'js>, promise: &Promise<'js>) -> Result<()> {
    loop {
        match promise.result::<Value<'js>>() {
            Some(Ok(_)) => return Ok(()),
            Some(Err(_)) => return Err(Error::from_js_catch(ctx)),
            None => {}
        }
        let ran = ctx.execute_pending_job();
        // A job that failed outright (interrupt, out of memory) leaves its
        // exception pending instead of rejecting anything.
        if let Some(thrown) = take_pending(ctx) {
            return Err(Error::from_js_value(ctx, thrown));
        }
        if !ran {
            return Err(Error::Runtime {
                message: "module evaluation never settled".to_string(),
                stack: None,
            });
        }
    }
}

/// Run queued jobs (layout settling after a render), at most `budget` of them.
///
/// Failing jobs are logged and skipped.
pub(crate) fn settle(ctx: &Ctx<'_>, budget: usize) {
    for _ in 0..budget {
        let ran = ctx.execute_pending_job();
        if let Some(thrown) = take_pending(ctx) {
            tracing::warn!("Queued job failed: {}", Error::from_js_value(ctx, thrown));
        }
        if !ran {
            return;
        }
    }
    tracing::warn!("Job queue still busy after {} jobs", budget);
}

/// Take the exception pending on the runtime, if any.
///
/// The engine can leave one behind without reporting it, for example when
/// an interrupt hits while it rejects a module's evaluation promise.
pub(crate) fn take_pending<'js>(ctx: &Ctx<'js>) -> Option<Value<'js>> {
    let thrown = ctx.catch();
    (thrown.type_of() != Type::Uninitialized).then_some(thrown)
}

/// Own enumerable string-keyed properties of `object`.
pub(crate) fn own_entries<'js>(
    ctx: &Ctx<'js>,
    object: &Object<'js>,
) -> Result<Vec<(String, Value<'js>)>> {
    object
        .own_props::<String, Value<'js>>(Filter::new().string().enum_only())
        .map(|entry| entry.catch_js(ctx))
        .collect()
}

/// Keep `values` alive beyond this realm.
pub(crate) fn persist<'js>(
    ctx: &Ctx<'js>,
    values: Vec<(String, Value<'js>)>,
) -> Vec<(String, Persistent<Value<'static>>)> {
    values
        .into_iter()
        .map(|(name, value)| (name, Persistent::save(ctx, value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_delivers_to_open_sink() {
        let route = OutputRoute::default();
        assert_eq!(route.emit("dropped".to_string()), None);

        let sink = route.open(CellId::new(4));
        assert_eq!(route.emit("kept".to_string()), Some(CellId::new(4)));
        route.close();
        assert_eq!(route.emit("late".to_string()), None);

        assert_eq!(sink.take(), vec!["kept"]);
    }

    #[test]
    fn test_reopening_replaces_sink() {
        let route = OutputRoute::default();
        let first = route.open(CellId::new(1));
        let second = route.open(CellId::new(2));
        route.emit("line".to_string());
        assert!(first.take().is_empty());
        assert_eq!(second.take(), vec!["line"]);
    }
}
