//! [`PolicyBackend`] – closed tagged variant over the two supported
//! model topologies.
//!
//! Backend-specific data (the carried hidden/cell buffers of the
//! recurrent topology) lives only inside its variant; callers see one
//! `infer` capability regardless of topology.

use std::path::Path;

use tracing::debug;

use strider_types::InferenceError;

use crate::lstm::LstmPolicy;
use crate::mlp::MlpPolicy;
use crate::session::SessionLoader;

/// Model topology tag, parsed case-insensitively from mode config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Mlp,
    Lstm,
}

impl PolicyKind {
    /// Parse a topology tag, case-insensitively. Returns `None` for
    /// anything other than `mlp`/`lstm`; the mode layer maps that to
    /// its unsupported-policy-type config error.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "mlp" => Some(PolicyKind::Mlp),
            "lstm" => Some(PolicyKind::Lstm),
            _ => None,
        }
    }
}

/// One trained policy, ready to infer.
pub enum PolicyBackend {
    Mlp(MlpPolicy),
    Lstm(LstmPolicy),
}

impl PolicyBackend {
    /// Open `path` through `loader` and wrap the session in the
    /// backend matching `kind`.
    ///
    /// # Errors
    ///
    /// Any load-time validation failure of the chosen backend (see
    /// [`MlpPolicy::new`] and [`LstmPolicy::new`]).
    pub fn load(
        kind: PolicyKind,
        path: &Path,
        loader: &dyn SessionLoader,
    ) -> Result<Self, InferenceError> {
        let session = loader.load(path)?;
        debug!(path = %path.display(), ?kind, "loaded policy session");
        match kind {
            PolicyKind::Mlp => Ok(PolicyBackend::Mlp(MlpPolicy::new(session)?)),
            PolicyKind::Lstm => Ok(PolicyBackend::Lstm(LstmPolicy::new(session)?)),
        }
    }

    /// Expected state length, as declared by the model.
    pub fn state_dim(&self) -> usize {
        match self {
            PolicyBackend::Mlp(p) => p.state_dim(),
            PolicyBackend::Lstm(p) => p.state_dim(),
        }
    }

    /// Run one inference; the result is clipped to `[-1, 1]`.
    pub fn infer(&mut self, state: &[f32]) -> Result<Vec<f32>, InferenceError> {
        match self {
            PolicyBackend::Mlp(p) => p.infer(state),
            PolicyBackend::Lstm(p) => p.infer(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(PolicyKind::parse("mlp"), Some(PolicyKind::Mlp));
        assert_eq!(PolicyKind::parse("MLP"), Some(PolicyKind::Mlp));
        assert_eq!(PolicyKind::parse("Lstm"), Some(PolicyKind::Lstm));
        assert_eq!(PolicyKind::parse("gru"), None);
        assert_eq!(PolicyKind::parse(""), None);
    }
}
