//! [`LstmPolicy`] – recurrent backend with carried hidden/cell state.
//!
//! Model tensors are matched to logical roles by name against ordered
//! candidate lists, filtered by expected rank: the state input must be
//! rank 2, hidden/cell inputs and outputs rank 3. Candidate lists end
//! with the exporter default names (`input_1`, `output_2`, …) so
//! models exported without explicit naming still resolve.
//!
//! Hidden and cell buffers are created once, sized from the model's
//! declared hidden dimension, and updated in place after every call
//! from whichever output matches the hidden/cell name candidates and
//! trailing dimension. When no output matches, the previous state is
//! carried forward rather than reset. Inputs that are not state,
//! hidden, or cell are fed zero tensors with dynamic dimensions
//! materialised to 1.

use strider_types::InferenceError;

use crate::clip_unit;
use crate::session::{ModelSession, Tensor, TensorInfo, dim_or};

/// Ordered name candidates for the rank-2 state input.
const STATE_INPUT_CANDIDATES: &[&str] = &[
    "state",
    "obs",
    "observation",
    "observations",
    "input",
    "input_0",
    "input0",
];

/// Ordered name candidates for the rank-3 hidden-state input.
const HIDDEN_INPUT_CANDIDATES: &[&str] = &["h_in", "hidden_in", "h0", "h", "input_1", "input1"];

/// Ordered name candidates for the rank-3 cell-state input.
const CELL_INPUT_CANDIDATES: &[&str] = &["c_in", "cell_in", "c0", "c", "input_2", "input2"];

/// Ordered name candidates for the rank-3 hidden-state output.
const HIDDEN_OUTPUT_CANDIDATES: &[&str] = &["h_out", "hn", "hidden", "h", "output_1", "output1"];

/// Ordered name candidates for the rank-3 cell-state output.
const CELL_OUTPUT_CANDIDATES: &[&str] = &["c_out", "cn", "cell", "c", "output_2", "output2"];

/// Recurrent policy over one [`ModelSession`].
pub struct LstmPolicy {
    session: Box<dyn ModelSession>,
    state_idx: usize,
    hidden_idx: usize,
    cell_idx: usize,
    state_dim: usize,
    /// `[seq, batch, H]` shape templates for the recurrent inputs.
    hidden_dims: Vec<i64>,
    cell_dims: Vec<i64>,
    /// Carried recurrent state, reset only at construction.
    hidden: Vec<f32>,
    cell: Vec<f32>,
    /// Zero tensors for inputs that are not state/hidden/cell, keyed
    /// by input index. Built once with materialised dims.
    extra_inputs: Vec<Option<Tensor>>,
}

impl std::fmt::Debug for LstmPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LstmPolicy")
            .field("state_idx", &self.state_idx)
            .field("hidden_idx", &self.hidden_idx)
            .field("cell_idx", &self.cell_idx)
            .field("state_dim", &self.state_dim)
            .field("hidden_dims", &self.hidden_dims)
            .field("cell_dims", &self.cell_dims)
            .finish_non_exhaustive()
    }
}

impl LstmPolicy {
    /// Wrap a loaded session, resolving tensor roles by name.
    ///
    /// # Errors
    ///
    /// - [`InferenceError::NoInputs`] / [`InferenceError::NoOutputs`].
    /// - [`InferenceError::MissingNamedInput`] when no candidate name
    ///   with the expected rank exists for a required role; the error
    ///   lists the names tried and the model's actual inputs.
    /// - [`InferenceError::DynamicStateDim`] when the state input's
    ///   trailing dimension is dynamic or unknown.
    pub fn new(session: Box<dyn ModelSession>) -> Result<Self, InferenceError> {
        if session.inputs().is_empty() {
            return Err(InferenceError::NoInputs);
        }
        if session.outputs().is_empty() {
            return Err(InferenceError::NoOutputs);
        }

        let state_idx = pick_with_rank(session.inputs(), STATE_INPUT_CANDIDATES, "state", 2)?;
        let hidden_idx =
            pick_with_rank(session.inputs(), HIDDEN_INPUT_CANDIDATES, "hidden (h)", 3)?;
        let cell_idx = pick_with_rank(session.inputs(), CELL_INPUT_CANDIDATES, "cell (c)", 3)?;

        let state_dim = session.inputs()[state_idx]
            .last_dim()
            .ok_or(InferenceError::DynamicStateDim)? as usize;

        // Hidden dimension from the declared input shapes, typically
        // [1, 1, H]; dynamic trailing dims fall back to 1.
        let hidden_len = session.inputs()[hidden_idx]
            .dims
            .last()
            .map_or(1, |&d| dim_or(d, 1)) as usize;
        let cell_len = session.inputs()[cell_idx]
            .dims
            .last()
            .map_or(1, |&d| dim_or(d, 1)) as usize;
        let hidden_dims = vec![1, 1, hidden_len as i64];
        let cell_dims = vec![1, 1, cell_len as i64];

        let extra_inputs: Vec<Option<Tensor>> = session
            .inputs()
            .iter()
            .enumerate()
            .map(|(i, info)| {
                if i == state_idx || i == hidden_idx || i == cell_idx {
                    None
                } else {
                    Some(Tensor::zeros(&info.dims))
                }
            })
            .collect();

        Ok(Self {
            session,
            state_idx,
            hidden_idx,
            cell_idx,
            state_dim,
            hidden_dims,
            cell_dims,
            hidden: vec![0.0; hidden_len],
            cell: vec![0.0; cell_len],
            extra_inputs,
        })
    }

    /// Expected state length, as declared by the model.
    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    /// Carried hidden-state buffer (read-only view).
    pub fn hidden(&self) -> &[f32] {
        &self.hidden
    }

    /// Carried cell-state buffer (read-only view).
    pub fn cell(&self) -> &[f32] {
        &self.cell
    }

    /// Run one timestep; the first output tensor is the action,
    /// clipped to `[-1, 1]`. Hidden/cell buffers are updated from the
    /// matching outputs, or carried forward when none match.
    ///
    /// # Errors
    ///
    /// [`InferenceError::StateSizeMismatch`] on a wrong state length,
    /// or a session error.
    pub fn infer(&mut self, state: &[f32]) -> Result<Vec<f32>, InferenceError> {
        if state.len() != self.state_dim {
            return Err(InferenceError::StateSizeMismatch {
                expected: self.state_dim,
                got: state.len(),
            });
        }

        let mut inputs: Vec<Tensor> = Vec::with_capacity(self.session.inputs().len());
        for i in 0..self.session.inputs().len() {
            let tensor = if i == self.state_idx {
                Tensor::new(vec![1, self.state_dim as i64], state.to_vec())
            } else if i == self.hidden_idx {
                Tensor::new(self.hidden_dims.clone(), self.hidden.clone())
            } else if i == self.cell_idx {
                Tensor::new(self.cell_dims.clone(), self.cell.clone())
            } else {
                // Unrecognised input: zero tensor with materialised dims.
                match &self.extra_inputs[i] {
                    Some(zeros) => zeros.clone(),
                    None => Tensor::zeros(&self.session.inputs()[i].dims),
                }
            };
            inputs.push(tensor);
        }

        let outputs = self.session.run(inputs)?;
        if outputs.is_empty() {
            return Err(InferenceError::EmptyOutputs);
        }

        self.update_recurrent_state(&outputs);

        let mut action = outputs.into_iter().next().map(|t| t.data).unwrap_or_default();
        for x in &mut action {
            *x = clip_unit(*x);
        }
        Ok(action)
    }

    /// Copy the new hidden/cell state out of the matching rank-3
    /// outputs. A role with no matching output keeps its previous
    /// value (carry-forward on ambiguity, never a reset).
    fn update_recurrent_state(&mut self, outputs: &[Tensor]) {
        let infos = self.session.outputs();
        update_from_outputs(
            infos,
            outputs,
            HIDDEN_OUTPUT_CANDIDATES,
            self.hidden.len(),
            &mut self.hidden,
        );
        update_from_outputs(
            infos,
            outputs,
            CELL_OUTPUT_CANDIDATES,
            self.cell.len(),
            &mut self.cell,
        );
    }
}

/// Pick the first candidate name present among `infos` whose rank
/// matches `expected_rank`, or fail listing both the names tried and
/// the names the model actually declares.
fn pick_with_rank(
    infos: &[TensorInfo],
    candidates: &[&str],
    role: &'static str,
    expected_rank: usize,
) -> Result<usize, InferenceError> {
    for name in candidates {
        if let Some(idx) = infos.iter().position(|info| info.name == *name) {
            if infos[idx].rank() == expected_rank {
                return Ok(idx);
            }
        }
    }
    Err(InferenceError::MissingNamedInput {
        role,
        tried: candidates.join(", "),
        available: infos
            .iter()
            .map(|info| info.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Find the first candidate-named rank-3 output whose trailing
/// dimension matches `expect_len` and copy it into `holder`. Returns
/// quietly when nothing matches.
fn update_from_outputs(
    infos: &[TensorInfo],
    outputs: &[Tensor],
    candidates: &[&str],
    expect_len: usize,
    holder: &mut Vec<f32>,
) {
    for name in candidates {
        let Some(idx) = infos.iter().position(|info| info.name == *name) else {
            continue;
        };
        let Some(tensor) = outputs.get(idx) else {
            continue;
        };
        if tensor.dims.len() != 3 {
            continue;
        }
        let last = tensor.dims.last().copied().unwrap_or(0);
        if expect_len > 0 && dim_or(last, expect_len as i64) != expect_len as i64 {
            continue;
        }

        if holder.len() == tensor.data.len() {
            holder.copy_from_slice(&tensor.data);
        } else {
            // Size drift between declared and concrete shape: accept
            // the concrete one.
            holder.clear();
            holder.extend_from_slice(&tensor.data);
        }
        return;
    }
}
