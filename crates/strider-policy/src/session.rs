//! [`ModelSession`] – the boundary to the inference engine.
//!
//! Backends never talk to onnxruntime (or any other engine) directly;
//! they consume this trait, which exposes exactly the metadata a
//! loaded model declares: input/output tensor names and shapes, with
//! non-positive shape values denoting dynamic dimensions. A production
//! deployment implements the trait over a real runtime; tests and the
//! demo binary use the sessions in [`crate::sim`].

use std::path::Path;

use strider_types::InferenceError;

// ────────────────────────────────────────────────────────────────────────────
// Tensors
// ────────────────────────────────────────────────────────────────────────────

/// A dense `f32` tensor in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    /// Shape; every entry is positive for a concrete tensor.
    pub dims: Vec<i64>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Build a tensor from a shape and its row-major data.
    pub fn new(dims: Vec<i64>, data: Vec<f32>) -> Self {
        Self { dims, data }
    }

    /// Build a zero-filled tensor, materialising dynamic dimensions
    /// (non-positive entries) to `1`.
    pub fn zeros(declared_dims: &[i64]) -> Self {
        let dims: Vec<i64> = if declared_dims.is_empty() {
            vec![1]
        } else {
            declared_dims.iter().map(|&d| dim_or(d, 1)).collect()
        };
        let count: usize = dims.iter().map(|&d| d as usize).product();
        Self {
            dims,
            data: vec![0.0; count],
        }
    }

    /// Total number of elements.
    pub fn element_count(&self) -> usize {
        self.data.len()
    }
}

/// Declared metadata for one model input or output.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
    pub name: String,
    /// Declared shape; non-positive entries are dynamic/unknown.
    pub dims: Vec<i64>,
}

impl TensorInfo {
    pub fn new(name: impl Into<String>, dims: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            dims,
        }
    }

    /// Number of declared dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// The trailing dimension, or `None` when the shape is empty or
    /// the trailing entry is dynamic.
    pub fn last_dim(&self) -> Option<i64> {
        match self.dims.last() {
            Some(&d) if d > 0 => Some(d),
            _ => None,
        }
    }
}

/// Resolve a possibly-dynamic dimension: ONNX metadata uses `-1` or
/// `0` for unknown sizes, so anything non-positive falls back.
pub fn dim_or(d: i64, fallback: i64) -> i64 {
    if d > 0 { d } else { fallback }
}

// ────────────────────────────────────────────────────────────────────────────
// Session traits
// ────────────────────────────────────────────────────────────────────────────

/// A loaded model ready to run.
///
/// `run` takes one tensor per declared input, in declaration order,
/// and returns one tensor per declared output, in declaration order.
pub trait ModelSession: Send {
    /// Declared inputs, in model order.
    fn inputs(&self) -> &[TensorInfo];

    /// Declared outputs, in model order.
    fn outputs(&self) -> &[TensorInfo];

    /// Execute one inference.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Session`] when the underlying engine
    /// rejects the call.
    fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, InferenceError>;
}

/// Factory that opens a model file into a [`ModelSession`].
///
/// The mode registry validates the path (existence, extension) before
/// calling this; the loader only needs to deserialise the model.
pub trait SessionLoader {
    /// Open the model file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Session`] when the file cannot be
    /// deserialised by the engine.
    fn load(&self, path: &Path) -> Result<Box<dyn ModelSession>, InferenceError>;
}
