//! Shared vocabulary for the strider control core.
//!
//! This crate defines the observation specification (which named
//! observations exist and how many elements each one carries), the
//! [`Command`] record that the host feeds into every tick, and the
//! error taxonomy used across the workspace:
//!
//! - [`ConfigError`] – mode/scale/id validation failures, reported at
//!   registration time and never fatal to the process.
//! - [`InferenceError`] – policy backend shape/name mismatches,
//!   reported at call time.
//! - [`GainsError`] – caller-usage errors around `set_gains`.
//! - [`SafetyFault`] – the diagnostic detail of a safety violation
//!   (joint name, measured value, bound).
//! - [`FatalSignal`] – a terminal stop. Once a component returns this,
//!   the control session is over; the caller must not resume without
//!   re-running startup.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Observation specification
// ────────────────────────────────────────────────────────────────────────────

/// Number of channels in an action vector (and in `last_action`).
pub const ACTION_DIM: usize = 16;

/// Fixed element count per named observation.
///
/// `command` is intentionally absent: its length is mode-dependent and
/// resolved against the active mode's `cmd_vector_length`.
pub const OBS_SPEC: &[(&str, usize)] = &[
    ("dof_pos", 12),
    ("dof_vel", 16),
    ("lin_vel", 3),
    ("ang_vel", 3),
    ("proj_grav", 3),
    ("last_action", ACTION_DIM),
    ("height_map", 144),
];

/// Look up the declared element count of a named observation.
///
/// Returns `None` for unknown keys and for `command` (mode-dependent).
pub fn obs_len(key: &str) -> Option<usize> {
    OBS_SPEC
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, len)| *len)
}

/// Comma-separated sorted list of valid observation keys, used in
/// validation diagnostics.
pub fn valid_obs_keys() -> String {
    let mut keys: Vec<&str> = OBS_SPEC.iter().map(|(name, _)| *name).collect();
    keys.sort_unstable();
    keys.join(", ")
}

/// Per-tick sensor payload keyed by observation name.
///
/// Produced by the hardware monitor and consumed by the observation
/// builder. Values keep their raw (unscaled) units.
pub type ObsMap = HashMap<String, Vec<f32>>;

// ────────────────────────────────────────────────────────────────────────────
// Command record
// ────────────────────────────────────────────────────────────────────────────

/// Host command payload fed into every `build_state` call.
///
/// `mode_id` requests a mode switch before the state is assembled;
/// `cmd_vector` fills the `command` observation slot. Either field may
/// be absent, in which case the corresponding slot keeps its previous
/// contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd_vector: Option<Vec<f32>>,
}

// ────────────────────────────────────────────────────────────────────────────
// Recoverable errors
// ────────────────────────────────────────────────────────────────────────────

/// Mode configuration validation failure, reported at registration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mode config is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("'{field}' must be an integer, not {found}")]
    NotAnInteger { field: &'static str, found: String },

    #[error("'id' must be between 1 and 16, but got {0}")]
    IdOutOfRange(i64),

    #[error("unknown observation key: '{key}'. valid keys: {valid}")]
    UnknownObservation { key: String, valid: String },

    #[error("cmd_vector_length must be >= 0, but got {0}")]
    NegativeCommandLength(i64),

    #[error("stack_size must be >= 1, but got {0}")]
    InvalidStackSize(i64),

    #[error(
        "scale for '{key}' must contain only numeric elements; bool found at index {index}"
    )]
    BoolScaleElement { key: String, index: usize },

    #[error(
        "scale for '{key}' must contain only numbers; non-numeric element at index {index}: {found}"
    )]
    NonNumericScaleElement {
        key: String,
        index: usize,
        found: String,
    },

    #[error("scale for '{key}' must be a number or a flat sequence of numbers, got {found}")]
    ScaleShape { key: String, found: String },

    #[error("scale for '{key}' length mismatch, got: {got}, expected: {expected}")]
    ScaleLength {
        key: String,
        got: usize,
        expected: usize,
    },

    #[error("policy_path does not exist: {}", .0.display())]
    PolicyPathMissing(PathBuf),

    #[error("policy_path is not a regular file: {}", .0.display())]
    PolicyPathNotFile(PathBuf),

    #[error("policy_path must be a .onnx file, but got '{0}'")]
    PolicyPathExtension(String),

    #[error("unsupported policy_type: {0}")]
    UnsupportedPolicyType(String),

    #[error(
        "policy inference output length mismatch: got {got}, expected {expected} ('last_action' length)"
    )]
    PolicyOutputLength { got: usize, expected: usize },

    #[error(
        "policy dry-run inference failed; the state length or dtype may not match the model input: {0}"
    )]
    PolicyDryRun(#[source] InferenceError),
}

/// Policy backend failure, reported when a model is loaded or invoked.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model has no inputs")]
    NoInputs,

    #[error("model has no outputs")]
    NoOutputs,

    #[error(
        "dynamic or unknown state dimension detected; export the model with a fixed last input dimension"
    )]
    DynamicStateDim,

    #[error("state size mismatch: expected {expected} but got {got}")]
    StateSizeMismatch { expected: usize, got: usize },

    #[error("missing {role} input. tried {{{tried}}}. available inputs: {available}")]
    MissingNamedInput {
        role: &'static str,
        tried: String,
        available: String,
    },

    #[error("model returned no outputs")]
    EmptyOutputs,

    #[error("model session failure: {0}")]
    Session(String),
}

/// Caller-usage error around gain configuration.
#[derive(Debug, Error)]
pub enum GainsError {
    #[error("{which} gains length mismatch for the robot: got {got}, expected {expected}")]
    LengthMismatch {
        which: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("wheel motor kp must be zero at channel {channel}, but got {value}")]
    NonZeroWheelKp { channel: usize, value: f32 },

    #[error("{which} gains must be non-negative, but got {value} at channel {channel}")]
    Negative {
        which: &'static str,
        channel: usize,
        value: f32,
    },

    #[error("robot kp and kd must be provided before dispatching actions")]
    NotSet,
}

// ────────────────────────────────────────────────────────────────────────────
// Safety faults and fatal signals
// ────────────────────────────────────────────────────────────────────────────

/// Diagnostic detail of a safety violation. Always escalated into a
/// [`FatalSignal`]; never silently recovered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SafetyFault {
    #[error(
        "position limit exceeded on {joint} (pos={pos:.3} rad, allowed [{lo:.3}, {hi:.3}])"
    )]
    PositionLimit {
        joint: &'static str,
        pos: f32,
        lo: f32,
        hi: f32,
    },

    #[error(
        "excessive negative velocity near lower limit on {joint} (pos={pos:.3} rad, vel={vel:.3} rad/s)"
    )]
    VelocityTowardLower {
        joint: &'static str,
        pos: f32,
        vel: f32,
    },

    #[error(
        "excessive positive velocity near upper limit on {joint} (pos={pos:.3} rad, vel={vel:.3} rad/s)"
    )]
    VelocityTowardUpper {
        joint: &'static str,
        pos: f32,
        vel: f32,
    },

    #[error("connection timeout or emergency flag reported")]
    LinkDown,
}

/// Terminal stop signal. Both kinds halt every motor via the retried
/// emergency-stop sequence before the signal is surfaced; the host
/// loop must exit its tick loop and not resume without re-running
/// startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FatalSignal {
    #[error("e-stop: {reason}")]
    EStop { reason: String },

    #[error("sleep: motors halted at caller request")]
    Sleep,
}

impl FatalSignal {
    /// Build an e-stop signal from any printable reason.
    pub fn estop(reason: impl Into<String>) -> Self {
        FatalSignal::EStop {
            reason: reason.into(),
        }
    }
}

impl From<SafetyFault> for FatalSignal {
    fn from(fault: SafetyFault) -> Self {
        FatalSignal::estop(fault.to_string())
    }
}
