//! Sandbox renderer for markup cells.
//!
//! Each markup cell owns a surface: a dedicated realm holding a headless
//! element tree with a `#root` container and the markup construction
//! library. Cell code cannot reach the host's realms, and publications it
//! makes inside the surface never reach the shared namespace.
//!
//! ```text
//! source_changed(cell) ──▶ surface torn down, generation += 1
//!
//! render(cell, unit)
//!     │
//!     ├── surface for the current generation (created on demand)
//!     ├── clear #root, propagate namespace
//!     ├── run unit as a module; mount a markup default export
//!     ├── drain the job queue, bounded (layout settles)
//!     └── snapshot #root ──▶ MarkupNode ──▶ HTML + LayoutModel height
//! ```

mod layout;
mod markup;

use rquickjs::{Context, Ctx, Function, Object, Persistent, Runtime, Value};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::CellId;
use crate::config::EngineConfig;
use crate::error::{Error, JsResultExt, Result};
use crate::execute::realm::{self, LineSink, OutputRoute, SETTLE_JOB_BUDGET};
use crate::execute::{ExecutionOutcome, Interrupt};
use crate::lower::LoweredUnit;
use crate::namespace::JsValueStore;

pub use layout::LayoutModel;
pub use markup::MarkupNode;

const MARKUP_LIBRARY: &str = include_str!("markup.js");

/// Identity of one surface instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderSurfaceHandle {
    pub cell_id: CellId,
    /// Incremented every time the cell's source changes.
    pub generation: u64,
}

/// Content height reported after layout settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEvent {
    pub cell_id: CellId,
    pub generation: u64,
    pub height_px: u32,
}

/// What a render produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    pub handle: RenderSurfaceHandle,
    /// Serialized content of `#root`.
    pub html: String,
    pub height_px: u32,
    /// Lines written by `display` and `console` during the render.
    pub lines: Vec<String>,
}

impl RenderReport {
    pub fn size_event(&self) -> SizeEvent {
        SizeEvent {
            cell_id: self.handle.cell_id,
            generation: self.handle.generation,
            height_px: self.height_px,
        }
    }
}

struct RenderSurface {
    generation: u64,
    /// Control object returned by the markup library.
    control: Persistent<Object<'static>>,
    display: Persistent<Function<'static>>,
    context: Context,
}

/// Owns the sandbox surfaces of one session.
pub struct SandboxRenderer {
    surfaces: FxHashMap<CellId, RenderSurface>,
    generations: FxHashMap<CellId, u64>,
    namespace_binding: String,
    layout: LayoutModel,
    interrupt: Interrupt,
    output: OutputRoute,
    sequence: u64,
}

impl SandboxRenderer {
    pub(crate) fn new(config: &EngineConfig, interrupt: Interrupt, output: OutputRoute) -> Self {
        Self {
            surfaces: FxHashMap::default(),
            generations: FxHashMap::default(),
            namespace_binding: config.namespace_binding.clone(),
            layout: LayoutModel::new(&config.surface),
            interrupt,
            output,
            sequence: 0,
        }
    }

    /// Tear down the cell's surface; the next render starts a new generation.
    pub fn source_changed(&mut self, cell_id: CellId) {
        if self.surfaces.remove(&cell_id).is_some() {
            tracing::debug!("Tore down surface for {}", cell_id);
        }
        *self.generations.entry(cell_id).or_insert(0) += 1;
    }

    /// Current surface, if one is live.
    pub fn handle(&self, cell_id: CellId) -> Option<RenderSurfaceHandle> {
        self.surfaces.get(&cell_id).map(|surface| RenderSurfaceHandle {
            cell_id,
            generation: surface.generation,
        })
    }

    /// Drop every surface (session reset). Generations keep counting.
    pub fn clear(&mut self) {
        let cells: Vec<CellId> = self.surfaces.keys().copied().collect();
        for cell_id in cells {
            self.source_changed(cell_id);
        }
    }

    /// Render `unit` into the cell's surface.
    pub fn render(
        &mut self,
        runtime: &Runtime,
        cell_id: CellId,
        unit: &LoweredUnit,
        namespace: &JsValueStore,
    ) -> ExecutionOutcome {
        self.sequence += 1;
        let sink = self.output.open(cell_id);
        let result = self.attempt(runtime, cell_id, unit, namespace, &sink);
        self.output.close();
        let lines = sink.take();
        match result {
            Ok((mut report, produced)) => {
                report.lines = lines.clone();
                tracing::debug!(
                    "Rendered {} generation {} at {}px",
                    cell_id,
                    report.handle.generation,
                    report.height_px
                );
                ExecutionOutcome {
                    render: Some(report),
                    ..ExecutionOutcome::succeeded(lines, produced)
                }
            }
            Err(error) => {
                let error = if self.interrupt.tripped() {
                    Error::Interrupted
                } else {
                    error
                };
                tracing::debug!("Render of {} failed: {}", cell_id, error);
                ExecutionOutcome::failed(lines, &error)
            }
        }
    }

    fn attempt(
        &mut self,
        runtime: &Runtime,
        cell_id: CellId,
        unit: &LoweredUnit,
        namespace: &JsValueStore,
        sink: &LineSink,
    ) -> Result<(RenderReport, Option<String>)> {
        let sequence = self.sequence;
        let binding = self.namespace_binding.clone();
        let layout = self.layout;
        let output = self.output.clone();
        let surface: &RenderSurface = self.surface(runtime, cell_id, &output)?;
        let module_name = format!(
            "surface-{}-{}-{}.js",
            cell_id.as_u64(),
            surface.generation,
            sequence
        );

        let rendered = surface.context.with(|ctx| {
            let result = paint(&ctx, surface, &binding, &module_name, unit, namespace, sink);
            if result.is_err() {
                let _ = realm::take_pending(&ctx);
            }
            result
        });
        let (root, produced) = rendered?;

        let report = RenderReport {
            handle: RenderSurfaceHandle {
                cell_id,
                generation: surface.generation,
            },
            html: root.inner_html(),
            height_px: layout.measure(&root),
            lines: Vec::new(),
        };
        Ok((report, produced))
    }

    fn surface(
        &mut self,
        runtime: &Runtime,
        cell_id: CellId,
        output: &OutputRoute,
    ) -> Result<&mut RenderSurface> {
        if !self.surfaces.contains_key(&cell_id) {
            let generation = *self.generations.entry(cell_id).or_insert(0);
            let surface = open_surface(runtime, generation, output)?;
            tracing::debug!("Opened surface for {} generation {}", cell_id, generation);
            self.surfaces.insert(cell_id, surface);
        }
        self.surfaces
            .get_mut(&cell_id)
            .ok_or(Error::CellNotFound(cell_id))
    }
}

/// Run one unit inside a surface realm and snapshot `#root`.
fn paint<'js>(
    ctx: &Ctx<'js>,
    surface: &RenderSurface,
    binding: &str,
    module_name: &str,
    unit: &LoweredUnit,
    namespace: &JsValueStore,
    sink: &LineSink,
) -> Result<(MarkupNode, Option<String>)> {
    let control = surface.control.clone().restore(ctx)?;
    let display = surface.display.clone().restore(ctx)?;
    let reset: Function = control.get("reset").catch_js(ctx)?;
    reset.call::<_, ()>(()).catch_js(ctx)?;

    // Publications made here stay in the surface.
    realm::propagate_namespace(ctx, binding, namespace)?;

    let exports = realm::load_module(ctx, module_name, &unit.code)?;
    let default: Value = exports.get("default").catch_js(ctx)?;
    let mount: Function = control.get("mountDefault").catch_js(ctx)?;
    let mounted: bool = mount.call((default.clone(),)).catch_js(ctx)?;
    let produced = if !mounted && !default.is_undefined() {
        display.call::<_, ()>((default,)).catch_js(ctx)?;
        sink.last()
    } else {
        None
    };

    realm::settle(ctx, SETTLE_JOB_BUDGET);

    let snapshot: Function = control.get("snapshot").catch_js(ctx)?;
    let json: String = snapshot.call(()).catch_js(ctx)?;
    let root: MarkupNode = serde_json::from_str(&json)?;
    Ok((root, produced))
}

/// Create a surface realm with the markup library and output primitives.
///
/// Both capture their builtins now, before any namespace entry is copied
/// onto the surface's global object.
fn open_surface(
    runtime: &Runtime,
    generation: u64,
    output: &OutputRoute,
) -> Result<RenderSurface> {
    let context = Context::full(runtime)?;
    let (control, display) = context.with(|ctx| -> Result<_> {
        let display = realm::install_output(&ctx, output)?;
        let install: Function = ctx.eval(MARKUP_LIBRARY).catch_js(&ctx)?;
        let control: Object = install.call(()).catch_js(&ctx)?;
        Ok((Persistent::save(&ctx, control), Persistent::save(&ctx, display)))
    })?;
    Ok(RenderSurface {
        generation,
        control,
        display,
        context,
    })
}
