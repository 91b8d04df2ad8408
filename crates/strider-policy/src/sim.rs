//! Simulated model sessions for headless testing without an
//! inference engine.
//!
//! [`SimMlpSession`] and [`SimLstmSession`] behave like well-formed
//! exported models: they declare the metadata the backends expect and
//! compute a cheap deterministic action (the state's leading elements,
//! attenuated). [`SimSessionLoader`] implements [`SessionLoader`]
//! while ignoring the file contents, so tests and the demo binary can
//! point modes at placeholder `.onnx` files.

use std::path::Path;

use strider_types::InferenceError;

use crate::session::{ModelSession, SessionLoader, Tensor, TensorInfo};

/// Deterministic action function shared by the sim sessions: the
/// first `action_dim` state elements, attenuated into `(-1, 1)`.
fn sim_action(state: &[f32], action_dim: usize) -> Vec<f32> {
    (0..action_dim)
        .map(|i| state.get(i).copied().unwrap_or(0.0) * 0.1)
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Feed-forward sim
// ────────────────────────────────────────────────────────────────────────────

/// Simulated feed-forward model with fixed `[1, state_dim]` input.
pub struct SimMlpSession {
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    action_dim: usize,
}

impl SimMlpSession {
    pub fn new(state_dim: usize, action_dim: usize) -> Box<Self> {
        Box::new(Self {
            inputs: vec![TensorInfo::new("obs", vec![1, state_dim as i64])],
            outputs: vec![TensorInfo::new("actions", vec![1, action_dim as i64])],
            action_dim,
        })
    }
}

impl ModelSession for SimMlpSession {
    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, InferenceError> {
        let state = inputs
            .first()
            .ok_or_else(|| InferenceError::Session("no input tensor supplied".to_string()))?;
        let action = sim_action(&state.data, self.action_dim);
        Ok(vec![Tensor::new(vec![1, self.action_dim as i64], action)])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recurrent sim
// ────────────────────────────────────────────────────────────────────────────

/// Simulated recurrent model: canonical `state`/`h_in`/`c_in` inputs,
/// `actions`/`h_out`/`c_out` outputs. The hidden state accumulates a
/// decayed copy of the state head so carried-state behaviour is
/// observable in tests.
pub struct SimLstmSession {
    inputs: Vec<TensorInfo>,
    outputs: Vec<TensorInfo>,
    action_dim: usize,
    hidden_dim: usize,
}

impl SimLstmSession {
    pub fn new(state_dim: usize, action_dim: usize, hidden_dim: usize) -> Box<Self> {
        Box::new(Self {
            inputs: vec![
                TensorInfo::new("state", vec![1, state_dim as i64]),
                TensorInfo::new("h_in", vec![1, 1, hidden_dim as i64]),
                TensorInfo::new("c_in", vec![1, 1, hidden_dim as i64]),
            ],
            outputs: vec![
                TensorInfo::new("actions", vec![1, action_dim as i64]),
                TensorInfo::new("h_out", vec![1, 1, hidden_dim as i64]),
                TensorInfo::new("c_out", vec![1, 1, hidden_dim as i64]),
            ],
            action_dim,
            hidden_dim,
        })
    }
}

impl ModelSession for SimLstmSession {
    fn inputs(&self) -> &[TensorInfo] {
        &self.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.outputs
    }

    fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, InferenceError> {
        if inputs.len() != 3 {
            return Err(InferenceError::Session(format!(
                "expected 3 input tensors, got {}",
                inputs.len()
            )));
        }
        let state = &inputs[0].data;
        let h_in = &inputs[1].data;
        let c_in = &inputs[2].data;

        let action = sim_action(state, self.action_dim);
        let h_out: Vec<f32> = (0..self.hidden_dim)
            .map(|i| 0.5 * h_in.get(i).copied().unwrap_or(0.0) + action.first().copied().unwrap_or(0.0))
            .collect();
        let c_out: Vec<f32> = (0..self.hidden_dim)
            .map(|i| 0.5 * c_in.get(i).copied().unwrap_or(0.0))
            .collect();

        let hc_dims = vec![1, 1, self.hidden_dim as i64];
        Ok(vec![
            Tensor::new(vec![1, self.action_dim as i64], action),
            Tensor::new(hc_dims.clone(), h_out),
            Tensor::new(hc_dims, c_out),
        ])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loader
// ────────────────────────────────────────────────────────────────────────────

/// Topology the loader should fabricate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimTopology {
    Mlp,
    Lstm,
}

/// [`SessionLoader`] that ignores file contents and fabricates a sim
/// session with the configured dimensions.
pub struct SimSessionLoader {
    pub topology: SimTopology,
    pub state_dim: usize,
    pub action_dim: usize,
    pub hidden_dim: usize,
}

impl SimSessionLoader {
    pub fn mlp(state_dim: usize, action_dim: usize) -> Self {
        Self {
            topology: SimTopology::Mlp,
            state_dim,
            action_dim,
            hidden_dim: 0,
        }
    }

    pub fn lstm(state_dim: usize, action_dim: usize, hidden_dim: usize) -> Self {
        Self {
            topology: SimTopology::Lstm,
            state_dim,
            action_dim,
            hidden_dim,
        }
    }
}

impl SessionLoader for SimSessionLoader {
    fn load(&self, _path: &Path) -> Result<Box<dyn ModelSession>, InferenceError> {
        Ok(match self.topology {
            SimTopology::Mlp => SimMlpSession::new(self.state_dim, self.action_dim),
            SimTopology::Lstm => {
                SimLstmSession::new(self.state_dim, self.action_dim, self.hidden_dim)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PolicyBackend, PolicyKind};

    #[test]
    fn sim_mlp_round_trip_through_backend() {
        let loader = SimSessionLoader::mlp(8, 4);
        let mut backend =
            PolicyBackend::load(PolicyKind::Mlp, Path::new("unused.onnx"), &loader).unwrap();
        assert_eq!(backend.state_dim(), 8);

        let action = backend.infer(&[1.0; 8]).unwrap();
        assert_eq!(action.len(), 4);
        assert!(action.iter().all(|&a| (a - 0.1).abs() < f32::EPSILON));
    }

    #[test]
    fn sim_lstm_round_trip_through_backend() {
        let loader = SimSessionLoader::lstm(6, 4, 2);
        let mut backend =
            PolicyBackend::load(PolicyKind::Lstm, Path::new("unused.onnx"), &loader).unwrap();

        let first = backend.infer(&[1.0; 6]).unwrap();
        assert_eq!(first.len(), 4);
        // Hidden state was updated: second call on a zero state still
        // produces a zero action, but the recurrent buffers decay.
        let second = backend.infer(&[0.0; 6]).unwrap();
        assert!(second.iter().all(|&a| a == 0.0));
    }

    #[test]
    fn sim_mlp_rejects_wrong_state_length() {
        let loader = SimSessionLoader::mlp(8, 4);
        let mut backend =
            PolicyBackend::load(PolicyKind::Mlp, Path::new("unused.onnx"), &loader).unwrap();
        assert!(backend.infer(&[0.0; 5]).is_err());
    }
}
