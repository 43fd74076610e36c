//! Core execution engine for the sketch sandbox.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wasmtime::{Engine, Store, TypedFunc};

use crate::engine::{LoopEngine, ProgressReporter, StaticEngine};
use crate::error::{Result, SketchError};
use crate::protocol::RenderMode;
use crate::request::ValidatedRequest;
use crate::sandbox::cache::{ModuleCache, SharedEngine};
use crate::sandbox::capability::{capability_linker, check_imports, define_globals};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::context::{CapabilityContext, TimeVariables};
use crate::sandbox::limits::{StoreData, StoreLimiterExt};
use crate::sandbox::structure::{CompiledSketch, DRAW_EXPORT, SETUP_EXPORT};
use crate::surface::{Raster, RasterFrame};
use crate::vars::ProtocolVariables;

/// Inputs that key one sketch instance.
#[derive(Debug, Clone, Copy)]
pub struct InstanceParams {
    pub seed: i64,
    pub vars: ProtocolVariables,
    pub width: u32,
    pub height: u32,
}

/// Limits applied to every store the sandbox creates.
#[derive(Debug, Clone, Copy)]
struct StoreLimits {
    max_memory: u64,
    max_fuel: Option<u64>,
    timeout: Duration,
}

/// One linked sketch, its store and its entry points.
///
/// Owned by exactly one execution. Entry points are only ever called from
/// the thread that owns the instance.
pub struct SketchInstance {
    store: Store<StoreData>,
    setup: TypedFunc<(), ()>,
    draw: Option<TypedFunc<(), ()>>,
}

impl SketchInstance {
    fn new(
        engine: &Engine,
        compiled: &CompiledSketch,
        params: InstanceParams,
        mode: RenderMode,
        limits: StoreLimits,
    ) -> Result<Self> {
        let surface = Box::new(Raster::new(params.width, params.height));
        let ctx = CapabilityContext::new(params.seed, params.vars, surface);

        let mut store = Store::new(engine, StoreData::new(limits.max_memory, ctx));
        store.configure_limiter();
        store.configure_deadline(limits.timeout);
        if let Some(fuel) = limits.max_fuel {
            store.set_fuel(fuel).map_err(|e| {
                SketchError::RuntimeInit(anyhow::anyhow!("failed to set fuel: {}", e))
            })?;
        }

        let mut linker = capability_linker(engine)?;
        define_globals(&mut linker, &mut store)?;
        check_imports(&linker, &mut store, &compiled.module)?;

        let instance = linker.instantiate(&mut store, &compiled.module).map_err(|e| {
            if store.data().limiter.limit_exceeded() {
                return SketchError::MemoryLimitExceeded(
                    "memory limit exceeded during instantiation".to_string(),
                );
            }
            SketchError::Validation(format!("sketch does not match the capability set: {e:#}"))
        })?;

        let setup = instance
            .get_typed_func::<(), ()>(&mut store, SETUP_EXPORT)
            .map_err(|e| SketchError::Validation(format!("invalid `{SETUP_EXPORT}`: {e}")))?;

        let draw = match mode {
            RenderMode::Static => None,
            RenderMode::Loop => Some(
                instance
                    .get_typed_func::<(), ()>(&mut store, DRAW_EXPORT)
                    .map_err(|e| SketchError::Validation(format!("invalid `{DRAW_EXPORT}`: {e}")))?,
            ),
        };

        Ok(Self { store, setup, draw })
    }

    /// Invoke `setup`.
    pub fn call_setup(&mut self) -> Result<()> {
        let setup = self.setup.clone();
        let result = setup.call(&mut self.store, ());
        self.classify(result)
    }

    /// Invoke `draw`; a static-mode instance has none.
    pub fn call_draw(&mut self) -> Result<()> {
        let draw = self
            .draw
            .clone()
            .ok_or_else(|| SketchError::Execution("draw is not bound in static mode".to_string()))?;
        let result = draw.call(&mut self.store, ());
        self.classify(result)
    }

    /// The capability context.
    pub fn context(&self) -> &CapabilityContext {
        &self.store.data().ctx
    }

    /// The capability context, mutably (used by the engines between calls).
    pub fn context_mut(&mut self) -> &mut CapabilityContext {
        &mut self.store.data_mut().ctx
    }

    /// Publish new timing to the sketch.
    pub fn set_time(&mut self, time: TimeVariables) {
        self.context_mut().time = time;
    }

    /// Highest linear-memory size the sketch reached, in bytes.
    pub fn peak_memory(&self) -> u64 {
        self.store.data().limiter.peak_memory()
    }

    /// Copy the current surface pixels.
    pub fn capture(&self) -> RasterFrame {
        RasterFrame::capture(self.context().surface.as_ref())
    }

    fn classify(&self, result: wasmtime::Result<()>) -> Result<()> {
        result.map_err(|e| {
            if self.store.data().limiter.limit_exceeded() {
                return SketchError::MemoryLimitExceeded(
                    "memory limit exceeded during execution".to_string(),
                );
            }
            SketchError::from_guest(e)
        })
    }
}

/// A sandboxed sketch execution environment.
///
/// Owns its engine and module cache; nothing is shared with other sandboxes.
pub struct SketchSandbox {
    config: SandboxConfig,
    engine: SharedEngine,
    cache: ModuleCache,
}

impl std::fmt::Debug for SketchSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SketchSandbox")
            .field("config", &self.config)
            .field("cached_sketches", &self.cache.len())
            .finish()
    }
}

impl SketchSandbox {
    /// Create a new sketch sandbox with the given configuration.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let engine = SharedEngine::new(config.max_fuel.is_some())?;
        Ok(Self {
            cache: ModuleCache::new(config.cache_capacity),
            config,
            engine,
        })
    }

    /// The sandbox configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The compiled-sketch cache.
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// The deterministic engine sketches are compiled for.
    pub fn engine(&self) -> &Engine {
        self.engine.engine()
    }

    /// Compile `source` (cached) and check its entry points for `mode`.
    pub fn prepare(&self, source: &str, mode: RenderMode) -> Result<Arc<CompiledSketch>> {
        let compiled = self.cache.get_or_compile(&self.engine, source)?;
        compiled.structure.require(mode)?;
        Ok(compiled)
    }

    /// Link `compiled` against a throwaway context without calling any entry
    /// point. Surfaces capability and entry-point type errors.
    pub fn check_linkage(&self, compiled: &CompiledSketch, mode: RenderMode) -> Result<()> {
        let params = InstanceParams {
            seed: 0,
            vars: ProtocolVariables::zeros(),
            width: 1,
            height: 1,
        };
        SketchInstance::new(self.engine.engine(), compiled, params, mode, self.limits()).map(|_| ())
    }

    fn limits(&self) -> StoreLimits {
        StoreLimits {
            max_memory: self.config.max_memory,
            max_fuel: self.config.max_fuel,
            timeout: self.config.timeout,
        }
    }

    /// Run the static state machine for a validated request.
    pub async fn render_static(
        &self,
        request: &ValidatedRequest,
        progress: ProgressReporter,
    ) -> Result<RasterFrame> {
        let compiled = self.prepare(request.source(), RenderMode::Static)?;
        let params = request.instance_params();
        let limits = self.limits();

        self.run_blocking(move |engine| {
            let mut instance =
                SketchInstance::new(engine, &compiled, params, RenderMode::Static, limits)?;
            StaticEngine::new(&progress).run(&mut instance)
        })
        .await
    }

    /// Run the loop state machine for a validated request.
    ///
    /// Returns every frame in order, or nothing at all: a cancelled or failed
    /// render never yields partial output.
    pub async fn render_loop(
        &self,
        request: &ValidatedRequest,
        cancel: CancellationToken,
        progress: ProgressReporter,
    ) -> Result<Vec<RasterFrame>> {
        let compiled = self.prepare(request.source(), RenderMode::Loop)?;
        let params = request.instance_params();
        let limits = self.limits();
        let plan = self.config.loop_plan(request.total_frames().unwrap_or(1));

        self.run_blocking(move |engine| {
            let mut instance =
                SketchInstance::new(engine, &compiled, params, RenderMode::Loop, limits)?;
            LoopEngine::new(plan, &cancel, &progress).run(&mut instance)
        })
        .await
    }

    /// Run `job` on a blocking task while an epoch ticker drives the
    /// per-store deadlines, racing it against the configured timeout.
    async fn run_blocking<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> Result<T> + Send + 'static,
    {
        let timeout = self.config.timeout;
        let epoch_interval = self.config.epoch_tick_interval;
        let engine = self.engine.arc();

        // Spawn the epoch ticker task
        let ticker_engine = Arc::clone(&engine);
        let ticker_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(epoch_interval);
            loop {
                interval.tick().await;
                ticker_engine.increment_epoch();
            }
        });

        let exec_engine = Arc::clone(&engine);
        let mut exec_handle = tokio::task::spawn_blocking(move || job(&exec_engine));

        // The store deadline traps first; the sleep only catches a guest that
        // never reaches an epoch check.
        let backstop = timeout + epoch_interval * 4;

        // Race between execution and timeout
        let result = tokio::select! {
            result = &mut exec_handle => {
                ticker_handle.abort();
                match result {
                    Ok(inner_result) => inner_result,
                    Err(e) => Err(SketchError::Execution(format!("task panicked: {}", e))),
                }
            }
            _ = tokio::time::sleep(backstop) => {
                // Keep ticking until the guest has trapped at its deadline.
                engine.increment_epoch();
                tokio::spawn(async move {
                    let _ = exec_handle.await;
                    ticker_handle.abort();
                });
                Err(SketchError::Timeout(timeout))
            }
        };

        result
    }
}
