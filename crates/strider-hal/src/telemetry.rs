//! Board text-protocol parsing.
//!
//! Telemetry grammar (one board response):
//!
//! ```text
//! OK <REQ> M1 p:0.012 v:-0.43 t:0.11 M2 p:N v:0.0 t:0.0 ...
//!          IMU gx:0.01 gy:0.0 gz:-0.02 pgx:0.0 pgy:0.0 pgz:-1.0
//! ```
//!
//! Status grammar:
//!
//! ```text
//! OK <STATUS> M1 pattern:2 M2 pattern:2 ... EMERGENCY value:off
//! ```
//!
//! Parsing is token-based (whitespace-delimited), so marker `M1`
//! never matches inside `M12` and field lookup is bounded to the
//! tokens belonging to one motor. A packet is all-or-nothing: any
//! missing marker, missing field, or `N` (unavailable) sentinel
//! invalidates the whole packet for that board; the caller records a
//! missed request instead of applying it partially.

use std::collections::HashMap;

use thiserror::Error;

/// Acknowledgement marker required in every telemetry response.
pub const REQ_ACK: &str = "OK <REQ>";

/// Acknowledgement marker required in every status response.
pub const STATUS_ACK: &str = "OK <STATUS>";

/// The `pattern:` value a healthy, connected motor reports.
pub const READY_PATTERN: i64 = 2;

// ────────────────────────────────────────────────────────────────────────────
// Parsed shapes
// ────────────────────────────────────────────────────────────────────────────

/// One motor's telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorFrame {
    /// Raw position (radians), before per-joint offset correction.
    pub position: f32,
    /// Velocity (rad/s), used as-is.
    pub velocity: f32,
    /// Torque estimate, used as-is.
    pub torque: f32,
}

/// One IMU sample from the trailing `IMU` block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuFrame {
    /// Body angular velocity (gx, gy, gz).
    pub gyro: [f32; 3],
    /// Gravity vector projected into the body frame (pgx, pgy, pgz).
    pub proj_grav: [f32; 3],
}

/// A fully validated telemetry packet from one board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardTelemetry {
    /// One frame per expected motor id.
    pub motors: HashMap<u8, MotorFrame>,
    /// Present only when the packet carries a complete IMU block.
    pub imu: Option<ImuFrame>,
}

/// Status summary for one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusReport {
    /// Missing ack, missing motor, or a non-ready `pattern:` value.
    pub disconnected: bool,
    /// The board reported `EMERGENCY ... value:on`.
    pub emergency: bool,
}

/// Why a telemetry packet was rejected. Always a whole-packet
/// verdict; the caller keeps its previous observation values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("response lacks the '{REQ_ACK}' acknowledgement")]
    MissingAck,

    #[error("no marker for motor M{0}")]
    MissingMotor(u8),

    #[error("motor M{id} is missing its '{field}:' field")]
    MissingField { id: u8, field: &'static str },

    #[error("motor M{id} reports '{field}:N' (unavailable)")]
    Unavailable { id: u8, field: &'static str },

    #[error("motor M{id} field '{field}:' is not a number: '{value}'")]
    Malformed {
        id: u8,
        field: &'static str,
        value: String,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Telemetry parsing
// ────────────────────────────────────────────────────────────────────────────

/// Parse one board telemetry response, validating every expected
/// motor id.
///
/// # Errors
///
/// Any [`TelemetryError`]; on error the packet must be discarded as a
/// whole and counted as a missed request.
pub fn parse_telemetry(raw: &str, ids: &[u8]) -> Result<BoardTelemetry, TelemetryError> {
    if !raw.contains(REQ_ACK) {
        return Err(TelemetryError::MissingAck);
    }

    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut motors = HashMap::with_capacity(ids.len());

    for &id in ids {
        let start = find_marker(&tokens, id).ok_or(TelemetryError::MissingMotor(id))?;
        let end = section_end(&tokens, start + 1);

        let position = motor_field(&tokens[start + 1..end], id, "p")?;
        let velocity = motor_field(&tokens[start + 1..end], id, "v")?;
        let torque = motor_field(&tokens[start + 1..end], id, "t")?;

        motors.insert(
            id,
            MotorFrame {
                position,
                velocity,
                torque,
            },
        );
    }

    Ok(BoardTelemetry {
        motors,
        imu: parse_imu(&tokens),
    })
}

/// Parse one board status response.
///
/// Never fails: anything unparseable is reported as a disconnect,
/// which feeds the debounce rather than aborting the tick. An
/// `EMERGENCY ... value:on` marker sets the emergency flag regardless
/// of connection state.
pub fn parse_status(raw: &str, ids: &[u8]) -> StatusReport {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let mut report = StatusReport::default();

    if !raw.contains(STATUS_ACK) {
        report.disconnected = true;
    } else {
        for &id in ids {
            let Some(start) = find_marker(&tokens, id) else {
                report.disconnected = true;
                break;
            };
            let end = section_end(&tokens, start + 1);
            let pattern = tokens[start + 1..end]
                .iter()
                .find_map(|t| t.strip_prefix("pattern:"))
                .and_then(|v| v.parse::<i64>().ok());
            if pattern != Some(READY_PATTERN) {
                report.disconnected = true;
                break;
            }
        }
    }

    if let Some(emg) = tokens.iter().position(|&t| t == "EMERGENCY") {
        let value = tokens[emg + 1..]
            .iter()
            .find_map(|t| t.strip_prefix("value:"));
        if value == Some("on") {
            report.emergency = true;
        }
    }

    report
}

// ────────────────────────────────────────────────────────────────────────────
// Internals
// ────────────────────────────────────────────────────────────────────────────

/// Position of the `M<id>` marker token.
fn find_marker(tokens: &[&str], id: u8) -> Option<usize> {
    let marker = format!("M{id}");
    tokens.iter().position(|&t| t == marker)
}

/// End (exclusive) of one motor's field section: the next motor
/// marker or `IMU` block, or the end of the packet.
fn section_end(tokens: &[&str], from: usize) -> usize {
    tokens[from..]
        .iter()
        .position(|&t| t == "IMU" || is_motor_marker(t))
        .map_or(tokens.len(), |off| from + off)
}

fn is_motor_marker(token: &str) -> bool {
    token
        .strip_prefix('M')
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Extract `<field>:<value>` from one motor's token section.
fn motor_field(section: &[&str], id: u8, field: &'static str) -> Result<f32, TelemetryError> {
    let value = section
        .iter()
        .find_map(|t| t.strip_prefix(field).and_then(|r| r.strip_prefix(':')))
        .ok_or(TelemetryError::MissingField { id, field })?;
    if value == "N" {
        return Err(TelemetryError::Unavailable { id, field });
    }
    value
        .parse::<f32>()
        .map_err(|_| TelemetryError::Malformed {
            id,
            field,
            value: value.to_string(),
        })
}

/// Parse the trailing IMU block. A partial block (any of the six
/// fields missing or malformed) is treated as absent; the caller
/// carries its previous values.
fn parse_imu(tokens: &[&str]) -> Option<ImuFrame> {
    let start = tokens.iter().position(|&t| t == "IMU")?;
    let section = &tokens[start + 1..];

    let field = |name: &str| -> Option<f32> {
        section
            .iter()
            .find_map(|t| t.strip_prefix(name).and_then(|r| r.strip_prefix(':')))
            .and_then(|v| v.parse::<f32>().ok())
    };

    Some(ImuFrame {
        gyro: [field("gx")?, field("gy")?, field("gz")?],
        proj_grav: [field("pgx")?, field("pgy")?, field("pgz")?],
    })
}
