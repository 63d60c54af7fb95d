//! Execution host: runs lowered units as single-use modules.
//!
//! Every attempt gets a brand-new realm inside the session runtime, so
//! nothing one cell installs on its global object is visible to the next
//! execution. Cross-cell state flows only through the shared namespace.

use rquickjs::{Context, Ctx, Runtime, Value};

use crate::cell::CellId;
use crate::error::{Error, JsResultExt, Result};
use crate::lower::LoweredUnit;
use crate::namespace::JsValueStore;

use super::context::Interrupt;
use super::outcome::ExecutionOutcome;
use super::realm::{self, LineSink, OutputRoute};

/// Loads and runs lowered units against a shared namespace.
pub struct ExecutionHost {
    namespace_binding: String,
    interrupt: Interrupt,
    output: OutputRoute,
    /// Makes module names unique across attempts.
    sequence: u64,
}

impl ExecutionHost {
    pub(crate) fn new(
        namespace_binding: impl Into<String>,
        interrupt: Interrupt,
        output: OutputRoute,
    ) -> Self {
        Self {
            namespace_binding: namespace_binding.into(),
            interrupt,
            output,
            sequence: 0,
        }
    }

    /// Run `unit` to completion or failure.
    ///
    /// On success, publications and exports are merged into `namespace` as
    /// one batch and a non-`undefined` default export is displayed. On
    /// failure nothing is merged. Failures never escape as `Err`: they are
    /// recorded in the returned outcome next to any lines captured before
    /// the failure.
    pub fn execute(
        &mut self,
        runtime: &Runtime,
        cell_id: CellId,
        unit: &LoweredUnit,
        namespace: &JsValueStore,
    ) -> ExecutionOutcome {
        self.sequence += 1;
        let module_name = format!("cell-{}-{}.js", cell_id.as_u64(), self.sequence);
        tracing::debug!("Loading {} as {}", cell_id, module_name);

        let sink = self.output.open(cell_id);
        let result = self.attempt(runtime, &module_name, unit, namespace, &sink);
        self.output.close();
        let lines = sink.take();

        match result {
            Ok(produced) => ExecutionOutcome::succeeded(lines, produced),
            Err(error) => {
                let error = if self.interrupt.tripped() {
                    Error::Interrupted
                } else {
                    error
                };
                tracing::debug!("{} failed: {}", cell_id, error);
                ExecutionOutcome::failed(lines, &error)
            }
        }
    }

    fn attempt(
        &self,
        runtime: &Runtime,
        module_name: &str,
        unit: &LoweredUnit,
        namespace: &JsValueStore,
        sink: &LineSink,
    ) -> Result<Option<String>> {
        let context = Context::full(runtime)?;
        context.with(|ctx| {
            let result = self.run_module(&ctx, module_name, unit, namespace, sink);
            if result.is_err() {
                // Leave nothing pending for the next realm in this runtime.
                let _ = realm::take_pending(&ctx);
            }
            result
        })
    }

    fn run_module<'js>(
        &self,
        ctx: &Ctx<'js>,
        module_name: &str,
        unit: &LoweredUnit,
        namespace: &JsValueStore,
        sink: &LineSink,
    ) -> Result<Option<String>> {
        let display = realm::install_output(ctx, &self.output)?;
        let staging = realm::propagate_namespace(ctx, &self.namespace_binding, namespace)?;

        let exports = realm::load_module(ctx, module_name, &unit.code)?;

        let mut batch = realm::own_entries(ctx, &staging)?;
        let exported = realm::own_entries(ctx, &exports)?;
        let default = exported
            .iter()
            .find(|(name, _)| name == "default")
            .map(|(_, value)| value.clone());
        batch.extend(exported);

        // A display that throws must leave the namespace untouched.
        let produced = match default {
            Some(value) if !value.is_undefined() => {
                display.call::<_, ()>((value,)).catch_js(ctx)?;
                sink.last()
            }
            _ => None,
        };

        namespace.merge(realm::persist(ctx, batch));
        Ok(produced)
    }

    /// Display form of one namespace entry, rendered in a scratch realm.
    pub fn inspect(
        &self,
        runtime: &Runtime,
        namespace: &JsValueStore,
        name: &str,
    ) -> Result<Option<String>> {
        let Some(value) = namespace.get(name) else {
            return Ok(None);
        };
        let sink = self.output.open(CellId::new(0));
        let context = Context::full(runtime)?;
        let shown = context.with(|ctx| {
            let display = realm::install_output(&ctx, &self.output)?;
            let value: Value = value.restore(&ctx)?;
            display.call::<_, ()>((value,)).catch_js(&ctx)?;
            Ok(sink.last())
        });
        self.output.close();
        shown
    }
}
