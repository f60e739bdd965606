//! # VQPy
//!
//! Declarative queries over video: declare abstract model functions, typed
//! object classes with (historical) properties and per-frame queries in VQL,
//! bind the functions to concrete models, then push frames through a
//! session.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use vqpy::{BBox, Detection, Frame, ReplayDetector, Value, Vqpy};
//!
//! fn main() -> vqpy::Result<()> {
//!     let vqpy = Vqpy::new();
//!
//!     // Bind the frame-level detector and one abstract function
//!     let detector = ReplayDetector::new()
//!         .with_frame(0, vec![Detection::new(BBox::new(0.0, 0.0, 40.0, 20.0), "car", 0.9)]);
//!     vqpy.register_detector(Arc::new(detector))?;
//!     vqpy.register_model("is_car", |_: &Frame, args: &[Value]| -> vqpy::Result<Value> {
//!         Ok(Value::Boolean(match &args[0] {
//!             Value::Object(obj) => obj.label == "car",
//!             _ => false,
//!         }))
//!     })?;
//!
//!     let program = vqpy.compile(
//!         "MODEL is_car(VOBJ) -> BOOL;
//!          CLASS Car WHERE is_car(self) { PROPERTY cx = center_x(bbox); }
//!          QUERY cars SELECT track_id, cx FROM Car;",
//!     )?;
//!
//!     let mut session = vqpy.session(&program)?;
//!     let result = session.process(&Frame::new(0, 0.0))?;
//!     assert_eq!(result.rows("cars").len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! The engine emits `tracing` events; see [`logging::LogConfig`] to install a
//! subscriber.

use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use vqpy_core::query::{compile_source, Planner};

pub mod logging;

// Re-export core types
pub use vqpy_core::{Error, Result};

// Data model
pub use vqpy_core::{BBox, Detection, Frame, VObj};

// Language and runtime
pub use vqpy_core::query::{
    Column, CompileError, CompiledProgram, FrameResult, ParseError, PhysicalPlan, QueryOutput,
    Row, Value,
};
pub use vqpy_core::{Executor, ResolvedProgram};

// Binding points
pub use vqpy_core::{Detector, IouTracker, Model, ModelRegistry, ReplayDetector, Tracker};

// Configuration and result log
pub use vqpy_core::log::{ResultLogReader, ResultLogWriter};
pub use vqpy_core::EngineConfig;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point of the query runtime.
///
/// Holds the model registry and engine configuration. Cloning is cheap and
/// clones share the registry, so models registered through one handle are
/// visible to all of them.
///
/// # Examples
///
/// ```rust
/// use vqpy::{EngineConfig, Vqpy};
///
/// let vqpy = Vqpy::with_config(EngineConfig::default().with_max_history_length(64))?;
/// assert_eq!(vqpy.config().max_history_length, 64);
/// # Ok::<(), vqpy::Error>(())
/// ```
#[derive(Clone, Default)]
pub struct Vqpy {
    registry: Arc<RwLock<ModelRegistry>>,
    config: EngineConfig,
}

impl Vqpy {
    /// Creates a runtime with the default configuration and no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runtime with a custom configuration.
    ///
    /// Fails with [`Error::InvalidOperation`] when the configuration is
    /// out of range.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(RwLock::new(ModelRegistry::new())),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Binds an abstract function to a concrete model.
    ///
    /// Registering a name again replaces the previous binding for sessions
    /// created afterwards.
    pub fn register_model<N, M>(&self, name: N, model: M) -> Result<()>
    where
        N: Into<String>,
        M: Model + 'static,
    {
        self.register_shared_model(name, Arc::new(model))
    }

    /// Binds an abstract function to an already shared model.
    pub fn register_shared_model<N: Into<String>>(
        &self,
        name: N,
        model: Arc<dyn Model>,
    ) -> Result<()> {
        self.registry
            .write()
            .map_err(|_| Error::LockPoisoned)?
            .register(name, model);
        Ok(())
    }

    /// Binds the `objects_in_frame` operation.
    pub fn register_detector(&self, detector: Arc<dyn Detector>) -> Result<()> {
        self.registry
            .write()
            .map_err(|_| Error::LockPoisoned)?
            .set_detector(detector);
        Ok(())
    }

    /// Removes a binding. Fails with [`Error::NotFound`] if the name is unbound.
    pub fn unregister_model(&self, name: &str) -> Result<()> {
        let removed = self
            .registry
            .write()
            .map_err(|_| Error::LockPoisoned)?
            .unregister(name);
        if removed {
            debug!(model = %name, "Unregistered model");
            Ok(())
        } else {
            debug!(model = %name, "No such model to unregister");
            Err(Error::NotFound)
        }
    }

    /// Names of the bound models, sorted
    pub fn model_names(&self) -> Result<Vec<String>> {
        Ok(self
            .registry
            .read()
            .map_err(|_| Error::LockPoisoned)?
            .names())
    }

    /// Parses and type checks a VQL program.
    ///
    /// Compilation does not look at the registry: models are bound when a
    /// session is created.
    pub fn compile(&self, source: &str) -> Result<CompiledProgram> {
        let program = compile_source(source, &self.config)?;
        info!(
            classes = program.classes.len(),
            queries = program.queries.len(),
            "Compiled program"
        );
        Ok(program)
    }

    /// Compiles `source` and renders the physical plan of every query, one
    /// per line.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use vqpy::Vqpy;
    ///
    /// let plan = Vqpy::new().explain("QUERY all SELECT label FROM VObj;")?;
    /// assert_eq!(plan, "all: Project(label) -> ObjectScan");
    /// # Ok::<(), vqpy::Error>(())
    /// ```
    pub fn explain(&self, source: &str) -> Result<String> {
        let program = self.compile(source)?;
        let lines: Vec<String> = Planner::new(&program)
            .plan_all()
            .iter()
            .map(|plan| plan.to_string())
            .collect();
        Ok(lines.join("\n"))
    }

    /// Starts a session over `program` with the built-in IoU tracker.
    ///
    /// The session keeps the models bound at this moment; later registry
    /// changes do not affect it. Fails with [`Error::UnboundModel`] when a
    /// function used by a query, or the detector, has no binding.
    pub fn session(&self, program: &CompiledProgram) -> Result<Session> {
        let resolved = self.resolve(program)?;
        Ok(Session {
            executor: Executor::new(resolved, self.config.clone()),
        })
    }

    /// Starts a session that assigns track ids with a custom tracker.
    pub fn session_with_tracker(
        &self,
        program: &CompiledProgram,
        tracker: Box<dyn Tracker>,
    ) -> Result<Session> {
        let resolved = self.resolve(program)?;
        Ok(Session {
            executor: Executor::with_tracker(resolved, self.config.clone(), tracker),
        })
    }

    fn resolve(&self, program: &CompiledProgram) -> Result<ResolvedProgram> {
        let registry = self.registry.read().map_err(|_| Error::LockPoisoned)?;
        program.resolve(&registry)
    }
}

impl std::fmt::Debug for Vqpy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vqpy")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

/// One ordered stream of frames through a compiled program.
///
/// Owns the tracker state and property histories of the stream.
pub struct Session {
    executor: Executor,
}

impl Session {
    /// Runs every query on the next frame.
    ///
    /// Frame indices must strictly increase within a session.
    pub fn process(&mut self, frame: &Frame) -> Result<FrameResult> {
        self.executor.process(frame)
    }

    /// Processes frames in order, stopping at the first error.
    pub fn run<'f, I>(&mut self, frames: I) -> Result<Vec<FrameResult>>
    where
        I: IntoIterator<Item = &'f Frame>,
    {
        frames
            .into_iter()
            .map(|frame| self.executor.process(frame))
            .collect()
    }

    /// Processes frames in order, appending each result to `log`.
    ///
    /// Returns the number of frames written. The log is synced at the end.
    pub fn run_to_log<'f, I>(&mut self, frames: I, log: &mut ResultLogWriter) -> Result<usize>
    where
        I: IntoIterator<Item = &'f Frame>,
    {
        let mut written = 0;
        for frame in frames {
            let result = self.executor.process(frame)?;
            log.append(&result)?;
            written += 1;
        }
        log.sync()?;
        debug!(frames = written, path = %log.path().display(), "Wrote results to log");
        Ok(written)
    }

    /// Number of live property histories, one per (property, track)
    pub fn history_len(&self) -> usize {
        self.executor.history().len()
    }

    pub fn frames_processed(&self) -> u64 {
        self.executor.frames_processed()
    }

    /// Physical plans of the session's queries, in declaration order
    pub fn plans(&self) -> &[PhysicalPlan] {
        self.executor.plans()
    }
}
