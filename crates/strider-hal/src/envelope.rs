//! Joint safety envelope.
//!
//! Two checks per leg joint, every tick:
//!
//! 1. Position inside the limit range shrunk by a margin on each side.
//! 2. Near a limit, velocity must not exceed the threshold toward
//!    that limit. Moving away is always allowed.
//!
//! Wheels are continuous-rotation and are never checked.

use strider_types::SafetyFault;

use crate::joints::{
    joint_limit, velocity_index_for_joint, JOINT_COUNT, JOINT_NAMES, POS_MARGIN_RAD,
    VEL_LIMIT_RAD_S, VEL_MARGIN_RAD,
};

/// Check all leg joints against the position and velocity envelope.
///
/// `dof_pos` holds the 12 offset-corrected joint positions; `dof_vel`
/// holds all 16 velocity channels (joints and wheels).
///
/// # Errors
///
/// The first violated joint, as a [`SafetyFault`].
pub fn check_envelope(dof_pos: &[f32], dof_vel: &[f32]) -> Result<(), SafetyFault> {
    for joint in 0..JOINT_COUNT {
        let limit = joint_limit(joint);
        let lo = limit.min_pos + POS_MARGIN_RAD;
        let hi = limit.max_pos - POS_MARGIN_RAD;

        let pos = dof_pos[joint];
        let vel = dof_vel[velocity_index_for_joint(joint)];

        if pos < lo || pos > hi {
            return Err(SafetyFault::PositionLimit {
                joint: JOINT_NAMES[joint],
                pos,
                lo,
                hi,
            });
        }
        if pos < lo + VEL_MARGIN_RAD && vel < -VEL_LIMIT_RAD_S {
            return Err(SafetyFault::VelocityTowardLower {
                joint: JOINT_NAMES[joint],
                pos,
                vel,
            });
        }
        if pos >= hi - VEL_MARGIN_RAD && vel > VEL_LIMIT_RAD_S {
            return Err(SafetyFault::VelocityTowardUpper {
                joint: JOINT_NAMES[joint],
                pos,
                vel,
            });
        }
    }
    Ok(())
}
