//! Policy backends: inference over a trained locomotion model.
//!
//! A policy is a pure function `state → action` with every output
//! element clipped to `[-1, 1]`. Two model topologies are supported:
//!
//! - [`MlpPolicy`] – stateless feed-forward; one fixed-shape input
//!   tensor `[1, D]`, exactly one call per inference.
//! - [`LstmPolicy`] – recurrent; hidden and cell vectors are carried
//!   between calls and updated in place from the model's outputs.
//!
//! The neural-network execution engine itself is an external
//! collaborator: backends talk to it only through the
//! [`ModelSession`] trait, whose tensor metadata mirrors what an ONNX
//! session reports (names, shapes with non-positive values for
//! dynamic dimensions). [`sim`] provides in-process sessions for
//! headless tests and demos.

pub mod backend;
pub mod lstm;
pub mod mlp;
pub mod session;
pub mod sim;

pub use backend::{PolicyBackend, PolicyKind};
pub use lstm::LstmPolicy;
pub use mlp::MlpPolicy;
pub use session::{ModelSession, SessionLoader, Tensor, TensorInfo};

/// Clip a raw model output element to the `[-1, 1]` action range.
pub(crate) fn clip_unit(x: f32) -> f32 {
    x.clamp(-1.0, 1.0)
}
