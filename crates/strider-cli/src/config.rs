//! Run configuration – reads `strider.toml` from the working
//! directory, falling back to a self-contained simulated-walk setup
//! when the file is absent.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;

use strider_runtime::ModeConfig;

/// Top-level run configuration.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    /// Control loop frequency.
    #[serde(default = "default_hz")]
    pub hz: f64,

    /// Dispatch actions as raw torques instead of position/velocity
    /// targets under gains.
    #[serde(default)]
    pub torque_ctrl: bool,

    /// Startup deadline for both motor boards, in seconds.
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Per-channel stiffness gains (wheel channels must be zero).
    #[serde(default = "default_kp")]
    pub kp: Vec<f32>,

    /// Per-channel damping gains.
    #[serde(default = "default_kd")]
    pub kd: Vec<f32>,

    /// The single mode registered at startup.
    #[serde(default = "default_mode")]
    pub mode: ModeConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            hz: default_hz(),
            torque_ctrl: false,
            startup_timeout_secs: default_startup_timeout_secs(),
            kp: default_kp(),
            kd: default_kd(),
            mode: default_mode(),
        }
    }
}

/// Default location searched by [`load`].
pub fn config_path() -> PathBuf {
    PathBuf::from("strider.toml")
}

/// Load the run configuration from `path`, or the defaults when the
/// file does not exist.
///
/// # Errors
///
/// I/O or TOML parse failures for a file that does exist.
pub fn load(path: &Path) -> Result<RunConfig, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Ok(RunConfig::default());
    }
    let raw = fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

fn default_hz() -> f64 {
    50.0
}

fn default_startup_timeout_secs() -> u64 {
    30
}

// Demo gains for the 16 channels: per-board [hips, shoulders, legs,
// wheels], wheels velocity-controlled (zero stiffness).
fn default_kp() -> Vec<f32> {
    let front = [100.0, 100.0, 100.0, 100.0, 120.0, 120.0, 0.0, 0.0];
    front.iter().chain(front.iter()).copied().collect()
}

fn default_kd() -> Vec<f32> {
    let front = [1.5, 1.5, 1.5, 1.5, 1.5, 1.5, 0.7, 0.7];
    front.iter().chain(front.iter()).copied().collect()
}

fn default_mode() -> ModeConfig {
    ModeConfig {
        id: Some(json!(1)),
        stacked_obs_order: vec![
            "dof_pos".into(),
            "dof_vel".into(),
            "ang_vel".into(),
            "proj_grav".into(),
            "last_action".into(),
        ],
        non_stacked_obs_order: vec!["command".into()],
        obs_scale: Default::default(),
        action_scale: Some(json!(0.25)),
        stack_size: Some(json!(3)),
        cmd_vector_length: Some(json!(3)),
        policy_path: None,
        policy_type: Some("mlp".into()),
    }
}
