//! [`MlpPolicy`] – stateless feed-forward backend.
//!
//! The model must declare at least one input and one output, and its
//! first input must have a fixed (non-dynamic) trailing dimension –
//! that dimension is the expected state length. Every inference feeds
//! the state as a `[1, D]` tensor and returns the first output,
//! clipped element-wise to `[-1, 1]`.

use strider_types::InferenceError;

use crate::clip_unit;
use crate::session::{ModelSession, Tensor};

/// Stateless feed-forward policy over one [`ModelSession`].
pub struct MlpPolicy {
    session: Box<dyn ModelSession>,
    state_dim: usize,
}

impl std::fmt::Debug for MlpPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlpPolicy")
            .field("state_dim", &self.state_dim)
            .finish_non_exhaustive()
    }
}

impl MlpPolicy {
    /// Wrap a loaded session, validating its input metadata.
    ///
    /// # Errors
    ///
    /// - [`InferenceError::NoInputs`] / [`InferenceError::NoOutputs`]
    ///   when the model declares none.
    /// - [`InferenceError::DynamicStateDim`] when the first input's
    ///   trailing dimension is dynamic or unknown; the model must be
    ///   re-exported with a fixed dimension.
    pub fn new(session: Box<dyn ModelSession>) -> Result<Self, InferenceError> {
        if session.inputs().is_empty() {
            return Err(InferenceError::NoInputs);
        }
        if session.outputs().is_empty() {
            return Err(InferenceError::NoOutputs);
        }
        let state_dim = session.inputs()[0]
            .last_dim()
            .ok_or(InferenceError::DynamicStateDim)? as usize;
        Ok(Self { session, state_dim })
    }

    /// Expected state length, as declared by the model.
    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    /// Run one inference; the result is clipped to `[-1, 1]`.
    ///
    /// # Errors
    ///
    /// [`InferenceError::StateSizeMismatch`] when `state` does not
    /// match the model's declared input dimension, or a session error.
    pub fn infer(&mut self, state: &[f32]) -> Result<Vec<f32>, InferenceError> {
        if state.len() != self.state_dim {
            return Err(InferenceError::StateSizeMismatch {
                expected: self.state_dim,
                got: state.len(),
            });
        }

        let input = Tensor::new(vec![1, self.state_dim as i64], state.to_vec());
        let mut outputs = self.session.run(vec![input])?;
        if outputs.is_empty() {
            return Err(InferenceError::EmptyOutputs);
        }

        let mut action = outputs.remove(0).data;
        for x in &mut action {
            *x = clip_unit(*x);
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TensorInfo;

    /// Session whose output is the input scaled by a constant factor.
    struct ScalingSession {
        inputs: Vec<TensorInfo>,
        outputs: Vec<TensorInfo>,
        factor: f32,
    }

    impl ScalingSession {
        fn new(state_dim: i64, factor: f32) -> Box<Self> {
            Box::new(Self {
                inputs: vec![TensorInfo::new("obs", vec![1, state_dim])],
                outputs: vec![TensorInfo::new("actions", vec![1, state_dim])],
                factor,
            })
        }
    }

    impl ModelSession for ScalingSession {
        fn inputs(&self) -> &[TensorInfo] {
            &self.inputs
        }

        fn outputs(&self) -> &[TensorInfo] {
            &self.outputs
        }

        fn run(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, InferenceError> {
            let data: Vec<f32> = inputs[0].data.iter().map(|&x| x * self.factor).collect();
            let dims = inputs[0].dims.clone();
            Ok(vec![Tensor::new(dims, data)])
        }
    }

    struct EmptySession {
        inputs: Vec<TensorInfo>,
        outputs: Vec<TensorInfo>,
    }

    impl ModelSession for EmptySession {
        fn inputs(&self) -> &[TensorInfo] {
            &self.inputs
        }

        fn outputs(&self) -> &[TensorInfo] {
            &self.outputs
        }

        fn run(&mut self, _inputs: Vec<Tensor>) -> Result<Vec<Tensor>, InferenceError> {
            Ok(vec![])
        }
    }

    #[test]
    fn infer_clips_to_unit_range() {
        let mut policy = MlpPolicy::new(ScalingSession::new(4, 10.0)).unwrap();
        let action = policy.infer(&[0.5, -0.5, 0.01, 0.0]).unwrap();
        assert_eq!(action, vec![1.0, -1.0, 0.1, 0.0]);
    }

    #[test]
    fn rejects_state_length_mismatch() {
        let mut policy = MlpPolicy::new(ScalingSession::new(4, 1.0)).unwrap();
        let err = policy.infer(&[0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::StateSizeMismatch {
                expected: 4,
                got: 3
            }
        ));
    }

    #[test]
    fn rejects_dynamic_state_dim() {
        let session = Box::new(EmptySession {
            inputs: vec![TensorInfo::new("obs", vec![1, -1])],
            outputs: vec![TensorInfo::new("actions", vec![1, 4])],
        });
        let err = MlpPolicy::new(session).unwrap_err();
        assert!(matches!(err, InferenceError::DynamicStateDim));
    }

    #[test]
    fn rejects_model_without_inputs() {
        let session = Box::new(EmptySession {
            inputs: vec![],
            outputs: vec![TensorInfo::new("actions", vec![1, 4])],
        });
        assert!(matches!(
            MlpPolicy::new(session).unwrap_err(),
            InferenceError::NoInputs
        ));
    }

    #[test]
    fn rejects_model_without_outputs() {
        let session = Box::new(EmptySession {
            inputs: vec![TensorInfo::new("obs", vec![1, 4])],
            outputs: vec![],
        });
        assert!(matches!(
            MlpPolicy::new(session).unwrap_err(),
            InferenceError::NoOutputs
        ));
    }
}
