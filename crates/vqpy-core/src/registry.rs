//! Abstract function registry.
//!
//! A program declares abstract functions (`MODEL name(...) -> T;`) without a
//! body. The registry supplies the concrete implementations they are bound to
//! when a compiled program is resolved.

use crate::detector::Detector;
use crate::frame::Frame;
use crate::query::Value;
use crate::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A concrete implementation of an abstract function.
///
/// `args` are the evaluated call arguments in declaration order; object
/// arguments arrive as [`Value::Object`].
pub trait Model: Send + Sync {
    /// Run the model on one call
    fn infer(&self, frame: &Frame, args: &[Value]) -> Result<Value>;
}

impl<F> Model for F
where
    F: Fn(&Frame, &[Value]) -> Result<Value> + Send + Sync,
{
    fn infer(&self, frame: &Frame, args: &[Value]) -> Result<Value> {
        self(frame, args)
    }
}

/// Name -> model bindings plus the frame-level object detector
#[derive(Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<dyn Model>>,
    detector: Option<Arc<dyn Detector>>,
}

impl ModelRegistry {
    /// Registry with no bindings and no detector
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `model`, replacing any previous binding
    pub fn register<N: Into<String>>(&mut self, name: N, model: Arc<dyn Model>) {
        let name = name.into();
        if self.models.insert(name.clone(), model).is_some() {
            debug!(model = %name, "Replaced model binding");
        } else {
            debug!(model = %name, "Registered model");
        }
    }

    /// Remove a binding. Returns whether it existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.models.remove(name).is_some()
    }

    /// Model bound to `name`, if any
    pub fn get(&self, name: &str) -> Option<Arc<dyn Model>> {
        self.models.get(name).cloned()
    }

    /// Whether `name` is bound
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Bound names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Bind the `objects_in_frame` operation
    pub fn set_detector(&mut self, detector: Arc<dyn Detector>) {
        debug!("Registered object detector");
        self.detector = Some(detector);
    }

    /// The bound detector, if any
    pub fn detector(&self) -> Option<Arc<dyn Detector>> {
        self.detector.clone()
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("detector", &self.detector.is_some())
            .finish()
    }
}
