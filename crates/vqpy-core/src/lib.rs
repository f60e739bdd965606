//! # VQPy Core
//!
//! Core types and implementations for the VQPy video query language: the
//! frame data model, the VQL front end and compiler, bounded property
//! histories, object tracking, the per-frame executor and the result log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod detector;
pub mod error;
pub mod format_version;
pub mod frame;
pub mod history;
pub mod log;
pub mod query;
pub mod registry;
pub mod tracker;

pub use config::EngineConfig;
pub use detector::{Detector, ReplayDetector};
pub use error::{Error, Result};
pub use frame::{BBox, Detection, Frame, VObj};
pub use history::HistoryStore;
pub use log::{ResultLogReader, ResultLogWriter};
pub use query::{CompiledProgram, Executor, FrameResult, QueryOutput, ResolvedProgram, Row, Value};
pub use registry::{Model, ModelRegistry};
pub use tracker::{IouTracker, Tracker};
