//! Notebook session: one runtime, one shared namespace, one set of surfaces.
//!
//! A session is single-threaded: QuickJS values cannot cross threads. The
//! `jotter` crate runs each session on a dedicated thread and exposes an
//! async handle on top of it.

use rquickjs::Runtime;
use rquickjs::loader::ScriptLoader;
use rustc_hash::FxHashMap;

use crate::cell::{CellId, CellUnit, LanguageTag};
use crate::config::EngineConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::execute::realm::{self, OutputRoute, SETTLE_JOB_BUDGET};
use crate::execute::{
    AbortHandle, ExecutionCallback, ExecutionHost, ExecutionOutcome, ExecutionStage, Interrupt,
    SearchPathResolver,
};
use crate::lower::{LoweredUnit, Lowerer};
use crate::namespace::JsValueStore;
use crate::render::{RenderReport, SandboxRenderer};
use crate::transform::CodeTransformer;

/// Last source seen for a cell.
struct CellRecord {
    source: String,
    language: LanguageTag,
}

/// An active notebook session.
pub struct NotebookSession {
    // Field order is drop order: every stored JS value goes before the runtime.
    /// Values published by executed cells.
    namespace: JsValueStore,

    /// Sandbox surfaces of markup cells.
    renderer: SandboxRenderer,

    host: ExecutionHost,
    transformer: CodeTransformer,
    lowerer: Lowerer,

    /// Source of every cell seen so far, for change detection.
    cells: FxHashMap<CellId, CellRecord>,

    /// Execution callback for progress reporting.
    callback: Option<Box<dyn ExecutionCallback>>,

    interrupt: Interrupt,
    config: EngineConfig,
    runtime: Runtime,
}

impl NotebookSession {
    /// Create a session with its own abort handle.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_abort_handle(config, AbortHandle::new())
    }

    /// Create a session that can be interrupted through `abort`.
    pub fn with_abort_handle(config: EngineConfig, abort: AbortHandle) -> Result<Self> {
        config.validate()?;

        let runtime = Runtime::new()?;
        runtime.set_max_stack_size(config.max_stack_size);
        if let Some(limit) = config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        let resolver = SearchPathResolver::new(config.module_search_paths.as_slice())?;
        runtime.set_loader(resolver, ScriptLoader::default());

        let interrupt = Interrupt::new(abort);
        interrupt.install(&runtime);
        let output = OutputRoute::default();

        tracing::info!(
            "Session created (target {}, namespace binding `{}`)",
            config.target,
            config.namespace_binding
        );

        Ok(Self {
            namespace: JsValueStore::new(),
            renderer: SandboxRenderer::new(&config, interrupt.clone(), output.clone()),
            host: ExecutionHost::new(config.namespace_binding.clone(), interrupt.clone(), output),
            transformer: CodeTransformer::new(config.namespace_binding.clone()),
            lowerer: Lowerer::from_config(&config),
            cells: FxHashMap::default(),
            callback: None,
            interrupt,
            config,
            runtime,
        })
    }

    /// Set the execution callback for progress reporting.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }

    pub fn abort_handle(&self) -> &AbortHandle {
        self.interrupt.abort_handle()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn namespace(&self) -> &JsValueStore {
        &self.namespace
    }

    /// Published names, sorted.
    pub fn namespace_names(&self) -> Vec<String> {
        self.namespace.names()
    }

    /// Display form of a published value, as `display(name)` would print it.
    pub fn inspect(&self, name: &str) -> Result<Option<String>> {
        self.host.inspect(&self.runtime, &self.namespace, name)
    }

    /// Record an edit. A changed source tears down the cell's surface.
    pub fn edit_cell(&mut self, cell_id: CellId, source: &str, language: LanguageTag) {
        let changed = match self.cells.get(&cell_id) {
            Some(record) => record.source != source || record.language != language,
            None => false,
        };
        if changed {
            self.renderer.source_changed(cell_id);
        }
        self.cells.insert(
            cell_id,
            CellRecord {
                source: source.to_string(),
                language,
            },
        );
    }

    /// Run one cell through transform → lower → load.
    ///
    /// Markup cells render into their sandbox surface; prose cells produce
    /// an empty outcome.
    pub fn execute(
        &mut self,
        cell_id: CellId,
        source: &str,
        language: LanguageTag,
    ) -> ExecutionOutcome {
        self.edit_cell(cell_id, source, language);
        if !language.is_executable() {
            return ExecutionOutcome::default();
        }

        self.notify(|cb| cb.on_cell_started(cell_id));
        let outcome = match self.prepare(cell_id, source, language) {
            Ok(unit) => self.load(cell_id, &unit),
            Err(error) => ExecutionOutcome::failed(Vec::new(), &error),
        };
        self.finish(cell_id, &outcome);
        outcome
    }

    /// Render a markup cell and report its surface.
    ///
    /// Uses the cell's recorded language when it is a markup dialect, and
    /// typed markup otherwise.
    pub fn render_markup(&mut self, cell_id: CellId, source: &str) -> Result<RenderReport> {
        let language = self
            .cells
            .get(&cell_id)
            .map(|record| record.language)
            .filter(LanguageTag::is_markup)
            .unwrap_or(LanguageTag::MarkupTyped);

        self.edit_cell(cell_id, source, language);
        self.notify(|cb| cb.on_cell_started(cell_id));

        let unit = match self.prepare(cell_id, source, language) {
            Ok(unit) => unit,
            Err(error) => {
                self.finish(cell_id, &ExecutionOutcome::failed(Vec::new(), &error));
                return Err(error);
            }
        };
        let outcome = self.load(cell_id, &unit);
        self.finish(cell_id, &outcome);

        match (outcome.render, outcome.failure) {
            (Some(report), None) => Ok(report),
            (_, Some(failure)) if failure.kind == ErrorKind::Interrupted => Err(Error::Interrupted),
            (_, Some(failure)) => Err(Error::Runtime {
                message: failure.message,
                stack: failure.stack,
            }),
            (None, None) => Err(Error::InvalidOperation(format!(
                "{cell_id} did not produce a surface"
            ))),
        }
    }

    /// Execute cells in order. A failing cell never stops the batch.
    pub fn run_all(&mut self, cells: &[CellUnit]) -> Vec<(CellId, ExecutionOutcome)> {
        tracing::info!("Running {} cells", cells.len());
        cells
            .iter()
            .map(|cell| (cell.id, self.execute(cell.id, &cell.source, cell.language)))
            .collect()
    }

    /// Forget every published binding and surface.
    pub fn reset(&mut self) {
        self.namespace.clear();
        self.renderer.clear();
        tracing::info!("Session reset");
    }

    fn prepare(&self, cell_id: CellId, source: &str, language: LanguageTag) -> Result<LoweredUnit> {
        self.stage(cell_id, ExecutionStage::Transforming);
        let unit = self.transformer.transform(source, language);

        self.stage(cell_id, ExecutionStage::Lowering);
        self.lowerer.lower(&unit, language)
    }

    fn load(&mut self, cell_id: CellId, unit: &LoweredUnit) -> ExecutionOutcome {
        self.stage(cell_id, ExecutionStage::Loading);
        self.interrupt.arm(self.config.execution_timeout());
        self.drain_jobs();
        let outcome = if unit.language.is_markup() {
            self.renderer
                .render(&self.runtime, cell_id, unit, &self.namespace)
        } else {
            self.host
                .execute(&self.runtime, cell_id, unit, &self.namespace)
        };
        // Still armed: a stuck leftover job is cut off by the same deadline.
        self.drain_jobs();
        self.interrupt.disarm();
        outcome
    }

    /// Run jobs queued by earlier realms, discarding their failures.
    ///
    /// An interrupted execution can leave promise jobs behind; they must
    /// not run inside the next cell's module evaluation.
    fn drain_jobs(&self) {
        for _ in 0..SETTLE_JOB_BUDGET {
            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => return,
                Err(exception) => exception.0.with(|ctx| {
                    if let Some(thrown) = realm::take_pending(&ctx) {
                        tracing::debug!(
                            "Discarded leftover job failure: {}",
                            Error::from_js_value(&ctx, thrown)
                        );
                    }
                }),
            }
        }
        tracing::warn!("Job queue still busy after {} jobs", SETTLE_JOB_BUDGET);
    }

    fn finish(&self, cell_id: CellId, outcome: &ExecutionOutcome) {
        match &outcome.failure {
            None => {
                self.stage(cell_id, ExecutionStage::Succeeded);
                if let Some(report) = &outcome.render {
                    let event = report.size_event();
                    self.notify(|cb| cb.on_surface_resized(&event));
                }
                self.notify(|cb| cb.on_cell_completed(cell_id, outcome));
            }
            Some(failure) => {
                self.stage(cell_id, ExecutionStage::Failed);
                self.notify(|cb| cb.on_cell_error(cell_id, failure));
            }
        }
        self.stage(cell_id, ExecutionStage::Idle);
    }

    fn stage(&self, cell_id: CellId, stage: ExecutionStage) {
        tracing::debug!("{} → {:?}", cell_id, stage);
        self.notify(|cb| cb.on_stage(cell_id, stage));
    }

    fn notify(&self, f: impl FnOnce(&dyn ExecutionCallback)) {
        if let Some(callback) = &self.callback {
            f(callback.as_ref());
        }
    }
}
