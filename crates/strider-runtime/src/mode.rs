//! Mode configuration validation and the validated [`Mode`] record.
//!
//! A mode arrives as a loosely-typed [`ModeConfig`] (host configs are
//! hand-written, so typed-wrong fields are a real input class, not a
//! programming error) and is validated once at registration. After
//! [`Mode::from_config`] succeeds the mode is immutable: id in range,
//! every observation key known, every scale the right shape and
//! length, the policy loaded and dry-run verified against the action
//! dimension.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use strider_policy::{PolicyBackend, PolicyKind, SessionLoader};
use strider_types::{obs_len, valid_obs_keys, ConfigError, ACTION_DIM};

/// Raw, unvalidated mode configuration as the host supplies it.
///
/// Integer-valued fields are kept as loose [`Value`]s so that a
/// string-typed `id` or a boolean scale element can be rejected with
/// a diagnostic naming the offending value instead of a generic
/// deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub stacked_obs_order: Vec<String>,
    #[serde(default)]
    pub non_stacked_obs_order: Vec<String>,
    #[serde(default)]
    pub obs_scale: HashMap<String, Value>,
    #[serde(default)]
    pub action_scale: Option<Value>,
    #[serde(default)]
    pub stack_size: Option<Value>,
    #[serde(default)]
    pub cmd_vector_length: Option<Value>,
    #[serde(default)]
    pub policy_path: Option<PathBuf>,
    #[serde(default)]
    pub policy_type: Option<String>,
}

/// One registered mode: validated configuration plus its loaded
/// policy backend.
pub struct Mode {
    pub id: i64,
    pub stacked_obs_order: Vec<String>,
    pub non_stacked_obs_order: Vec<String>,
    scales: HashMap<String, Vec<f32>>,
    pub action_scale: Vec<f32>,
    pub stack_size: usize,
    pub cmd_vector_length: usize,
    pub policy_path: PathBuf,
    pub kind: PolicyKind,
    pub policy: PolicyBackend,
}

impl std::fmt::Debug for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mode")
            .field("id", &self.id)
            .field("stacked_obs_order", &self.stacked_obs_order)
            .field("non_stacked_obs_order", &self.non_stacked_obs_order)
            .field("scales", &self.scales)
            .field("action_scale", &self.action_scale)
            .field("stack_size", &self.stack_size)
            .field("cmd_vector_length", &self.cmd_vector_length)
            .field("policy_path", &self.policy_path)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Mode {
    /// Validate `cfg`, load its policy through `loader`, and verify
    /// the policy with one dry-run inference on a zero state.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] describing the first violated rule.
    pub fn from_config(cfg: &ModeConfig, loader: &dyn SessionLoader) -> Result<Self, ConfigError> {
        let id = require_integer("id", cfg.id.as_ref())?;
        if !(1..=16).contains(&id) {
            return Err(ConfigError::IdOutOfRange(id));
        }

        for key in cfg
            .stacked_obs_order
            .iter()
            .chain(&cfg.non_stacked_obs_order)
        {
            check_obs_key(key)?;
        }

        let cmd_vector_length = require_integer("cmd_vector_length", cfg.cmd_vector_length.as_ref())?;
        if cmd_vector_length < 0 {
            return Err(ConfigError::NegativeCommandLength(cmd_vector_length));
        }
        let cmd_vector_length = cmd_vector_length as usize;

        let mut scales = HashMap::with_capacity(cfg.obs_scale.len());
        for (key, value) in &cfg.obs_scale {
            check_obs_key(key)?;
            let expected = slot_len(key, cmd_vector_length);
            scales.insert(key.clone(), normalize_scale(key, value, expected)?);
        }

        let action_scale = match &cfg.action_scale {
            Some(value) => normalize_scale("action_scale", value, ACTION_DIM)?,
            None => vec![1.0; ACTION_DIM],
        };

        let stack_size = require_integer("stack_size", cfg.stack_size.as_ref())?;
        if stack_size < 1 {
            return Err(ConfigError::InvalidStackSize(stack_size));
        }
        let stack_size = stack_size as usize;

        let policy_path = cfg
            .policy_path
            .clone()
            .ok_or(ConfigError::MissingField("policy_path"))?;
        if !policy_path.exists() {
            return Err(ConfigError::PolicyPathMissing(policy_path));
        }
        if !policy_path.is_file() {
            return Err(ConfigError::PolicyPathNotFile(policy_path));
        }
        let onnx = policy_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
        if !onnx {
            return Err(ConfigError::PolicyPathExtension(
                policy_path.display().to_string(),
            ));
        }

        let tag = cfg
            .policy_type
            .as_deref()
            .ok_or(ConfigError::MissingField("policy_type"))?;
        let kind = PolicyKind::parse(tag)
            .ok_or_else(|| ConfigError::UnsupportedPolicyType(tag.to_string()))?;

        let mut mode = Mode {
            id,
            stacked_obs_order: cfg.stacked_obs_order.clone(),
            non_stacked_obs_order: cfg.non_stacked_obs_order.clone(),
            scales,
            action_scale,
            stack_size,
            cmd_vector_length,
            policy: PolicyBackend::load(kind, &policy_path, loader)
                .map_err(ConfigError::PolicyDryRun)?,
            policy_path,
            kind,
        };

        // One zero-state inference proves the state length and the
        // action dimension against the actual model, at registration
        // rather than on the first live tick.
        let zero_state = vec![0.0; mode.state_len()];
        let action = mode
            .policy
            .infer(&zero_state)
            .map_err(ConfigError::PolicyDryRun)?;
        if action.len() != ACTION_DIM {
            return Err(ConfigError::PolicyOutputLength {
                got: action.len(),
                expected: ACTION_DIM,
            });
        }

        debug!(id = mode.id, state_len = mode.state_len(), "mode validated");
        Ok(mode)
    }

    /// Element count of one observation slot under this mode.
    pub fn slot_len(&self, key: &str) -> usize {
        slot_len(key, self.cmd_vector_length)
    }

    /// Scale vector for `key`, if the config supplied one.
    pub fn scale_for(&self, key: &str) -> Option<&[f32]> {
        self.scales.get(key).map(Vec::as_slice)
    }

    /// Length of one stacked frame.
    pub fn single_frame_len(&self) -> usize {
        self.stacked_obs_order.iter().map(|k| self.slot_len(k)).sum()
    }

    /// Length of the non-stacked tail.
    pub fn non_stacked_len(&self) -> usize {
        self.non_stacked_obs_order
            .iter()
            .map(|k| self.slot_len(k))
            .sum()
    }

    /// Total state length fed to the policy.
    pub fn state_len(&self) -> usize {
        self.single_frame_len() * self.stack_size + self.non_stacked_len()
    }
}

/// `command` is valid in the orders but its length comes from the
/// mode, not the observation specification.
fn check_obs_key(key: &str) -> Result<(), ConfigError> {
    if key == "command" || obs_len(key).is_some() {
        Ok(())
    } else {
        Err(ConfigError::UnknownObservation {
            key: key.to_string(),
            valid: format!("command, {}", valid_obs_keys()),
        })
    }
}

fn slot_len(key: &str, cmd_vector_length: usize) -> usize {
    if key == "command" {
        cmd_vector_length
    } else {
        obs_len(key).unwrap_or(0)
    }
}

fn require_integer(field: &'static str, value: Option<&Value>) -> Result<i64, ConfigError> {
    let value = value.ok_or(ConfigError::MissingField(field))?;
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| ConfigError::NotAnInteger {
            field,
            found: n.to_string(),
        }),
        other => Err(ConfigError::NotAnInteger {
            field,
            found: other.to_string(),
        }),
    }
}

/// Accept a scalar (broadcast) or a flat numeric sequence of exactly
/// `expected` elements. Booleans are rejected outright; JSON would
/// otherwise let them coerce through a lenient reader.
fn normalize_scale(key: &str, value: &Value, expected: usize) -> Result<Vec<f32>, ConfigError> {
    match value {
        Value::Number(n) => {
            let scalar = n.as_f64().ok_or_else(|| ConfigError::ScaleShape {
                key: key.to_string(),
                found: n.to_string(),
            })? as f32;
            Ok(vec![scalar; expected])
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Bool(_) => {
                        return Err(ConfigError::BoolScaleElement {
                            key: key.to_string(),
                            index,
                        });
                    }
                    Value::Number(n) => match n.as_f64() {
                        Some(v) => out.push(v as f32),
                        None => {
                            return Err(ConfigError::NonNumericScaleElement {
                                key: key.to_string(),
                                index,
                                found: n.to_string(),
                            });
                        }
                    },
                    other => {
                        return Err(ConfigError::NonNumericScaleElement {
                            key: key.to_string(),
                            index,
                            found: other.to_string(),
                        });
                    }
                }
            }
            if out.len() != expected {
                return Err(ConfigError::ScaleLength {
                    key: key.to_string(),
                    got: out.len(),
                    expected,
                });
            }
            Ok(out)
        }
        other => Err(ConfigError::ScaleShape {
            key: key.to_string(),
            found: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use strider_policy::sim::SimSessionLoader;

    use super::*;

    fn policy_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("walk.onnx");
        std::fs::write(&path, b"model").unwrap();
        path
    }

    fn config(dir: &TempDir) -> ModeConfig {
        ModeConfig {
            id: Some(json!(1)),
            stacked_obs_order: vec!["dof_pos".into(), "last_action".into()],
            non_stacked_obs_order: vec!["command".into()],
            obs_scale: HashMap::new(),
            action_scale: Some(json!(1.0)),
            stack_size: Some(json!(2)),
            cmd_vector_length: Some(json!(3)),
            policy_path: Some(policy_file(dir)),
            policy_type: Some("mlp".into()),
        }
    }

    // dof_pos(12) + last_action(16) stacked twice, command(3) tail.
    fn loader() -> SimSessionLoader {
        SimSessionLoader::mlp(59, ACTION_DIM)
    }

    #[test]
    fn valid_config_registers() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mode = Mode::from_config(&cfg, &loader()).unwrap();
        assert_eq!(mode.id, 1);
        assert_eq!(mode.single_frame_len(), 28);
        assert_eq!(mode.state_len(), 59);
        assert_eq!(mode.kind, PolicyKind::Mlp);
        assert_eq!(mode.action_scale, vec![1.0; ACTION_DIM]);
    }

    #[test]
    fn string_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.id = Some(json!("1"));
        assert!(matches!(
            Mode::from_config(&cfg, &loader()),
            Err(ConfigError::NotAnInteger { field: "id", .. })
        ));
    }

    #[test]
    fn id_out_of_range_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.id = Some(json!(17));
        assert!(matches!(
            Mode::from_config(&cfg, &loader()),
            Err(ConfigError::IdOutOfRange(17))
        ));
    }

    #[test]
    fn unknown_observation_key_lists_valid_keys() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.stacked_obs_order.push("foot_contact".into());
        let err = Mode::from_config(&cfg, &loader()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("foot_contact"));
        assert!(msg.contains("dof_pos"));
        assert!(msg.contains("command"));
    }

    #[test]
    fn scalar_scale_broadcasts() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.obs_scale.insert("dof_pos".into(), json!(0.25));
        let mode = Mode::from_config(&cfg, &loader()).unwrap();
        assert_eq!(mode.scale_for("dof_pos"), Some(&[0.25f32; 12][..]));
    }

    #[test]
    fn bool_scale_element_is_rejected_with_index() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.obs_scale
            .insert("command".into(), json!([1.0, true, 1.0]));
        assert!(matches!(
            Mode::from_config(&cfg, &loader()),
            Err(ConfigError::BoolScaleElement { index: 1, .. })
        ));
    }

    #[test]
    fn non_numeric_scale_element_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.obs_scale
            .insert("command".into(), json!([1.0, "x", 1.0]));
        assert!(matches!(
            Mode::from_config(&cfg, &loader()),
            Err(ConfigError::NonNumericScaleElement { index: 1, .. })
        ));
    }

    #[test]
    fn scale_length_must_match_slot() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.obs_scale.insert("dof_pos".into(), json!([1.0, 2.0]));
        assert!(matches!(
            Mode::from_config(&cfg, &loader()),
            Err(ConfigError::ScaleLength {
                got: 2,
                expected: 12,
                ..
            })
        ));
    }

    #[test]
    fn missing_policy_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.policy_path = Some(dir.path().join("absent.onnx"));
        assert!(matches!(
            Mode::from_config(&cfg, &loader()),
            Err(ConfigError::PolicyPathMissing(_))
        ));
    }

    #[test]
    fn wrong_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        let path = dir.path().join("walk.pt");
        std::fs::write(&path, b"model").unwrap();
        cfg.policy_path = Some(path);
        assert!(matches!(
            Mode::from_config(&cfg, &loader()),
            Err(ConfigError::PolicyPathExtension(_))
        ));
    }

    #[test]
    fn uppercase_extension_is_accepted() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        let path = dir.path().join("walk.ONNX");
        std::fs::write(&path, b"model").unwrap();
        cfg.policy_path = Some(path);
        assert!(Mode::from_config(&cfg, &loader()).is_ok());
    }

    #[test]
    fn unsupported_policy_type_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.policy_type = Some("gru".into());
        assert!(matches!(
            Mode::from_config(&cfg, &loader()),
            Err(ConfigError::UnsupportedPolicyType(t)) if t == "gru"
        ));
    }

    #[test]
    fn dry_run_state_mismatch_fails_registration() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        // Model expects a different state length than the mode computes.
        let loader = SimSessionLoader::mlp(10, ACTION_DIM);
        assert!(matches!(
            Mode::from_config(&cfg, &loader),
            Err(ConfigError::PolicyDryRun(_))
        ));
    }

    #[test]
    fn dry_run_output_length_mismatch_fails_registration() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let loader = SimSessionLoader::mlp(59, 12);
        assert!(matches!(
            Mode::from_config(&cfg, &loader),
            Err(ConfigError::PolicyOutputLength {
                got: 12,
                expected: ACTION_DIM,
            })
        ));
    }

    #[test]
    fn lstm_policy_registers() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir);
        cfg.policy_type = Some("LSTM".into());
        let loader = SimSessionLoader::lstm(59, ACTION_DIM, 8);
        let mode = Mode::from_config(&cfg, &loader).unwrap();
        assert_eq!(mode.kind, PolicyKind::Lstm);
    }

    #[test]
    fn config_deserializes_from_json() {
        let raw = json!({
            "id": 2,
            "stacked_obs_order": ["dof_pos"],
            "non_stacked_obs_order": ["command"],
            "obs_scale": {"dof_pos": 0.5},
            "stack_size": 1,
            "cmd_vector_length": 0,
            "policy_path": "/tmp/walk.onnx",
            "policy_type": "mlp",
        });
        let cfg: ModeConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(cfg.stacked_obs_order, vec!["dof_pos"]);
        assert!(cfg.obs_scale.contains_key("dof_pos"));
    }
}
