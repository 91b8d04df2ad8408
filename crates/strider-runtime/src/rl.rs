//! [`RlRuntime`] – registered modes, the rolling state buffer, and
//! action selection.
//!
//! The state buffer holds the `stack_size` most recent single frames
//! (newest at offset 0) followed by the non-stacked tail. It is
//! resized and zeroed only on a mode switch and mutated in place
//! every tick; observation keys absent from a tick's sensor payload
//! keep their previous values rather than being zero-filled.

use thiserror::Error;
use tracing::{debug, warn};

use strider_types::{Command, InferenceError, ObsMap, ACTION_DIM};

use crate::mode::Mode;

/// Tick-time runtime failure. Configuration problems are caught at
/// registration; these are the errors that can still occur per tick.
#[derive(Debug, Error)]
pub enum RlError {
    #[error("no active mode; call activate() first")]
    NoActiveMode,

    #[error("feedback action length mismatch: expected {expected}, got {got}")]
    FeedbackLength { expected: usize, got: usize },

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Owns every registered mode and the per-tick state assembly.
#[derive(Default)]
pub struct RlRuntime {
    modes: Vec<Mode>,
    active: Option<usize>,
    state: Vec<f32>,
    frame: Vec<f32>,
    last_action: Vec<f32>,
    scaled_action: Vec<f32>,
}

impl RlRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mode. A mode with the same id replaces the prior
    /// registration in place; if that mode is currently active, the
    /// buffers are resized for the replacement immediately.
    pub fn add_mode(&mut self, mode: Mode) {
        if let Some(index) = self.modes.iter().position(|m| m.id == mode.id) {
            self.modes[index] = mode;
            if self.active == Some(index) {
                self.resize_for(index);
            }
        } else {
            self.modes.push(mode);
        }
    }

    /// Switch the active mode. Unknown ids are deliberately ignored
    /// so a host can broadcast mode switches to heterogeneous robots.
    pub fn activate(&mut self, id: i64) {
        match self.modes.iter().position(|m| m.id == id) {
            Some(index) => {
                self.active = Some(index);
                self.resize_for(index);
                debug!(id, "activated mode");
            }
            None => warn!(id, "ignoring activation of unregistered mode"),
        }
    }

    /// Id of the active mode, if any.
    pub fn active_mode_id(&self) -> Option<i64> {
        self.active.map(|i| self.modes[i].id)
    }

    fn resize_for(&mut self, index: usize) {
        let mode = &self.modes[index];
        self.frame = vec![0.0; mode.single_frame_len()];
        self.state = vec![0.0; mode.state_len()];
        self.last_action = vec![0.0; ACTION_DIM];
        self.scaled_action = vec![0.0; ACTION_DIM];
    }

    /// Assemble one tick's full state vector from the sensor payload.
    ///
    /// Any mode-switch request in `cmd` is applied first. `feedback`,
    /// when present, overwrites the last-action memory before the
    /// frame is assembled.
    ///
    /// # Errors
    ///
    /// [`RlError::NoActiveMode`] before the first successful
    /// [`activate`](Self::activate); [`RlError::FeedbackLength`] when
    /// `feedback` is not exactly the action dimension.
    pub fn build_state(
        &mut self,
        obs: &ObsMap,
        cmd: &Command,
        feedback: Option<&[f32]>,
    ) -> Result<Vec<f32>, RlError> {
        if let Some(id) = cmd.mode_id {
            self.activate(id);
        }
        let active = self.active.ok_or(RlError::NoActiveMode)?;

        if let Some(fb) = feedback {
            if fb.len() != ACTION_DIM {
                return Err(RlError::FeedbackLength {
                    expected: ACTION_DIM,
                    got: fb.len(),
                });
            }
            self.last_action.copy_from_slice(fb);
        }

        // The buffers are taken out so the mode can stay borrowed
        // while they are written.
        let mut frame = std::mem::take(&mut self.frame);
        let mut state = std::mem::take(&mut self.state);
        let mode = &self.modes[active];

        let mut offset = 0;
        for key in &mode.stacked_obs_order {
            let len = mode.slot_len(key);
            write_slot(
                &mut frame[offset..offset + len],
                resolve(key, obs, cmd, &self.last_action),
                mode.scale_for(key),
            );
            offset += len;
        }

        // Oldest frame dropped, newest written to slot 0.
        let frame_len = frame.len();
        for k in (1..mode.stack_size).rev() {
            state.copy_within((k - 1) * frame_len..k * frame_len, k * frame_len);
        }
        state[..frame_len].copy_from_slice(&frame);

        let mut base = frame_len * mode.stack_size;
        for key in &mode.non_stacked_obs_order {
            let len = mode.slot_len(key);
            write_slot(
                &mut state[base..base + len],
                resolve(key, obs, cmd, &self.last_action),
                mode.scale_for(key),
            );
            base += len;
        }

        self.frame = frame;
        self.state = state;
        Ok(self.state.clone())
    }

    /// Run the active mode's policy on `state` and return the
    /// action-scaled result. The raw (unscaled) action becomes the
    /// next tick's `last_action`.
    ///
    /// # Errors
    ///
    /// [`RlError::NoActiveMode`], or any [`InferenceError`] from the
    /// policy backend.
    pub fn select_action(&mut self, state: &[f32]) -> Result<Vec<f32>, RlError> {
        let active = self.active.ok_or(RlError::NoActiveMode)?;
        let mode = &mut self.modes[active];

        let raw = mode.policy.infer(state)?;
        self.scaled_action = raw
            .iter()
            .zip(&mode.action_scale)
            .map(|(a, s)| a * s)
            .collect();
        self.last_action = raw;
        Ok(self.scaled_action.clone())
    }
}

/// Source slice for one observation slot. `None` means "leave the
/// slot untouched this tick".
fn resolve<'a>(
    key: &str,
    obs: &'a ObsMap,
    cmd: &'a Command,
    last_action: &'a [f32],
) -> Option<&'a [f32]> {
    match key {
        "command" => cmd.cmd_vector.as_deref(),
        "last_action" => Some(last_action),
        _ => obs.get(key).map(Vec::as_slice),
    }
}

/// Scale `src` into `slot`. A short source is padded with zeros; a
/// missing scale means unscaled.
fn write_slot(slot: &mut [f32], src: Option<&[f32]>, scale: Option<&[f32]>) {
    let Some(src) = src else { return };
    for (j, out) in slot.iter_mut().enumerate() {
        let v = src.get(j).copied().unwrap_or(0.0);
        let s = scale.and_then(|sc| sc.get(j).copied()).unwrap_or(1.0);
        *out = v * s;
    }
}
