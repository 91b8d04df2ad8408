//! Joint table, safety margins, and index translations.
//!
//! The robot has 12 position-controlled leg joints and 4
//! velocity-controlled wheels, split across two boards:
//!
//! | board | motors | role |
//! |-------|--------|------|
//! | front | M1–M6  | leg joints 0–5 |
//! | front | M7–M8  | wheels (action channels 6–7) |
//! | rear  | M9–M14 | leg joints 6–11 |
//! | rear  | M15–M16| wheels (action channels 14–15) |
//!
//! Three index spaces exist and must never be conflated: *joint*
//! indices (0..12, legs only), *velocity* indices (0..16, all
//! motors), and *action channels* (0..16, the policy's output
//! layout). The functions below are the only translation points.

use strider_types::ACTION_DIM;

/// Leg joint names, indexed by joint index 0..12.
pub const JOINT_NAMES: [&str; 12] = [
    "left_hip_f",
    "right_hip_f",
    "left_shoulder_f",
    "right_shoulder_f",
    "left_leg_f",
    "right_leg_f",
    "left_hip_r",
    "right_hip_r",
    "left_shoulder_r",
    "right_shoulder_r",
    "left_leg_r",
    "right_leg_r",
];

/// Number of leg joints.
pub const JOINT_COUNT: usize = 12;

/// Motor ids served by the front board.
pub const FRONT_MOTOR_IDS: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

/// Motor ids served by the rear board.
pub const REAR_MOTOR_IDS: [u8; 8] = [9, 10, 11, 12, 13, 14, 15, 16];

/// Action channels driving wheels (velocity-controlled, zero kp).
pub const WHEEL_CHANNELS: [usize; 4] = [6, 7, 14, 15];

/// Hard position margin kept away from either joint limit (10°).
pub const POS_MARGIN_RAD: f32 = 0.1745;

/// Width of the velocity-guard band adjacent to a limit (20°).
pub const VEL_MARGIN_RAD: f32 = 0.3491;

/// Velocity magnitude that trips the look-ahead guard inside the
/// band (rad/s).
pub const VEL_LIMIT_RAD_S: f32 = 8.7275;

/// Static per-joint envelope: relative position limits and the
/// calibration offset added to telemetry (and subtracted from
/// commands).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimit {
    pub min_pos: f32,
    pub max_pos: f32,
    pub offset: f32,
}

/// The default envelope shared by every joint on this platform.
pub const DEFAULT_LIMIT: JointLimit = JointLimit {
    min_pos: -3.14,
    max_pos: 3.14,
    offset: 0.0,
};

/// Envelope for the joint at `joint` index (0..12).
pub fn joint_limit(joint: usize) -> JointLimit {
    debug_assert!(joint < JOINT_COUNT);
    DEFAULT_LIMIT
}

/// Motor id whose telemetry feeds `dof_pos[joint]`.
///
/// Front joints 0..6 map to M1..M6; rear joints 6..12 map to M9..M14
/// (the rear board's leg motors).
pub fn motor_id_for_joint(joint: usize) -> u8 {
    debug_assert!(joint < JOINT_COUNT);
    if joint < 6 {
        (joint + 1) as u8
    } else {
        (joint + 3) as u8
    }
}

/// Index into `dof_vel` (16 entries, wheels included) carrying the
/// velocity of leg joint `joint`.
///
/// Front joints line up with their motor ordinal; rear joints skip
/// past the two front wheel slots.
pub fn velocity_index_for_joint(joint: usize) -> usize {
    debug_assert!(joint < JOINT_COUNT);
    if joint < 6 { joint } else { joint + 2 }
}

/// Motor id carrying `dof_vel[index]` (0..16 across both boards).
pub fn motor_id_for_velocity_index(index: usize) -> u8 {
    debug_assert!(index < ACTION_DIM);
    (index + 1) as u8
}

/// Whether action channel `channel` is position-controlled (a leg
/// joint) rather than a velocity-controlled wheel.
pub fn is_position_channel(channel: usize) -> bool {
    debug_assert!(channel < ACTION_DIM);
    channel < 6 || (8..14).contains(&channel)
}

/// Joint index addressed by position-controlled action channel
/// `channel`. Only meaningful when [`is_position_channel`] holds.
pub fn joint_for_channel(channel: usize) -> usize {
    debug_assert!(is_position_channel(channel));
    if channel < 6 { channel } else { channel - 2 }
}
