//! [`SafetyMonitor`] – the per-tick owner of both board links.
//!
//! Every interaction with the hardware flows through here: startup
//! sequencing, gain configuration, telemetry collection, envelope
//! checking, action dispatch, and the retried emergency-stop
//! sequence. Once any fatal condition is detected the monitor halts
//! every motor before surfacing the [`FatalSignal`]; the host loop
//! must not resume without re-running startup.

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use strider_types::{FatalSignal, GainsError, ObsMap, SafetyFault, ACTION_DIM};

use crate::envelope::check_envelope;
use crate::health::ConnectionHealth;
use crate::joints::{
    is_position_channel, joint_for_channel, joint_limit, motor_id_for_joint,
    motor_id_for_velocity_index, FRONT_MOTOR_IDS, JOINT_COUNT, REAR_MOTOR_IDS, WHEEL_CHANNELS,
};
use crate::link::BoardLink;
use crate::telemetry::{parse_status, parse_telemetry, BoardTelemetry};

/// Nominal control period charged against the link timeout.
pub const TICK_MS: u32 = 20;

/// Pause between emergency-stop retries while a board has not acked.
const ESTOP_RETRY: Duration = Duration::from_millis(10);

/// Pause between startup polls while the boards come up.
const READY_RETRY: Duration = Duration::from_millis(100);

/// Settle time after the boards first report ready.
const READY_SETTLE: Duration = Duration::from_millis(100);

/// Flat-ground fill for the height-map observation channel.
const HEIGHT_MAP_FILL: f32 = 0.6128;

/// Errors surfaced by action dispatch. Gain problems are caller
/// mistakes and recoverable; a fatal signal means the motors have
/// already been stopped.
#[derive(Debug, Error)]
pub enum HalError {
    #[error(transparent)]
    Gains(#[from] GainsError),

    #[error(transparent)]
    Fatal(#[from] FatalSignal),
}

/// Owns the front and rear board links and enforces the safety
/// envelope on everything that crosses them.
pub struct SafetyMonitor<L: BoardLink> {
    front: L,
    rear: L,
    health: ConnectionHealth,
    kp: Option<Vec<f32>>,
    kd: Option<Vec<f32>>,
    obs: ObsMap,
}

impl<L: BoardLink> SafetyMonitor<L> {
    pub fn new(front: L, rear: L) -> Self {
        let mut obs = HashMap::new();
        obs.insert("dof_pos".to_string(), vec![0.0; 12]);
        obs.insert("dof_vel".to_string(), vec![0.0; 16]);
        obs.insert("ang_vel".to_string(), vec![0.0; 3]);
        obs.insert("proj_grav".to_string(), vec![0.0; 3]);
        obs.insert("last_action".to_string(), vec![0.0; ACTION_DIM]);
        obs.insert("height_map".to_string(), vec![HEIGHT_MAP_FILL; 144]);

        Self {
            front,
            rear,
            health: ConnectionHealth::new(TICK_MS),
            kp: None,
            kd: None,
            obs,
        }
    }

    /// Direct access to the front link, for scripted drivers.
    pub fn front_link(&mut self) -> &mut L {
        &mut self.front
    }

    /// Direct access to the rear link, for scripted drivers.
    pub fn rear_link(&mut self) -> &mut L {
        &mut self.rear
    }

    // ────────────────────────────────────────────────────────────────
    // Startup
    // ────────────────────────────────────────────────────────────────

    /// Power up both boards and wait until every motor reports the
    /// ready pattern, then let the hardware settle briefly.
    ///
    /// # Errors
    ///
    /// [`FatalSignal::EStop`] when the boards do not come up within
    /// `timeout`. No motor stop is sent; nothing has been armed yet
    /// that this process could have set in motion.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<(), FatalSignal> {
        let deadline = Instant::now() + timeout;
        loop {
            let front_up = self.front.start(&FRONT_MOTOR_IDS);
            let rear_up = self.rear.start(&REAR_MOTOR_IDS);

            if front_up && rear_up {
                let front_status = self.front.status();
                let rear_status = self.rear.status();
                let f = parse_status(&front_status, &FRONT_MOTOR_IDS);
                let r = parse_status(&rear_status, &REAR_MOTOR_IDS);
                if !f.disconnected && !r.disconnected && !f.emergency && !r.emergency {
                    thread::sleep(READY_SETTLE);
                    info!("motor boards ready");
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(FatalSignal::estop("motor boards not ready before deadline"));
            }
            thread::sleep(READY_RETRY);
        }
    }

    /// Validate and store the stiffness/damping gains used for
    /// position-mode dispatch.
    ///
    /// # Errors
    ///
    /// [`GainsError`] when a slice is the wrong length, a wheel
    /// channel has non-zero stiffness, or any gain is negative.
    pub fn set_gains(&mut self, kp: &[f32], kd: &[f32]) -> Result<(), GainsError> {
        for (which, gains) in [("kp", kp), ("kd", kd)] {
            if gains.len() != ACTION_DIM {
                return Err(GainsError::LengthMismatch {
                    which,
                    got: gains.len(),
                    expected: ACTION_DIM,
                });
            }
            if let Some(channel) = gains.iter().position(|&g| g < 0.0) {
                return Err(GainsError::Negative {
                    which,
                    channel,
                    value: gains[channel],
                });
            }
        }
        for &channel in &WHEEL_CHANNELS {
            if kp[channel] != 0.0 {
                return Err(GainsError::NonZeroWheelKp {
                    channel,
                    value: kp[channel],
                });
            }
        }
        self.kp = Some(kp.to_vec());
        self.kd = Some(kd.to_vec());
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────
    // Per-tick observation path
    // ────────────────────────────────────────────────────────────────

    /// Poll both boards' status, charge the health debounce, then
    /// collect a fresh observation snapshot.
    ///
    /// # Errors
    ///
    /// [`FatalSignal`] on a reported emergency, an expired link, or an
    /// envelope violation. The motors are stopped before returning.
    pub fn check_safety(&mut self) -> Result<ObsMap, FatalSignal> {
        let front_status = self.front.status();
        let rear_status = self.rear.status();
        let f = parse_status(&front_status, &FRONT_MOTOR_IDS);
        let r = parse_status(&rear_status, &REAR_MOTOR_IDS);

        self.health.record_status(f.disconnected || r.disconnected);

        if f.emergency || r.emergency || self.health.is_expired() {
            return Err(self.trip(SafetyFault::LinkDown.into()));
        }

        self.get_obs()
    }

    /// Request one telemetry packet from each board and merge it into
    /// the observation snapshot. A packet that fails to parse on
    /// either board leaves the previous values in place and charges
    /// one missed request; the snapshot is still returned.
    ///
    /// # Errors
    ///
    /// [`FatalSignal`] when the fresh joint state violates the safety
    /// envelope. The motors are stopped before returning.
    pub fn get_obs(&mut self) -> Result<ObsMap, FatalSignal> {
        let front_raw = self.front.request(&FRONT_MOTOR_IDS);
        let rear_raw = self.rear.request(&REAR_MOTOR_IDS);

        let front = parse_telemetry(&front_raw, &FRONT_MOTOR_IDS);
        let rear = parse_telemetry(&rear_raw, &REAR_MOTOR_IDS);

        match (front, rear) {
            (Ok(front), Ok(rear)) => {
                self.health.record_clean_round_trip();
                self.merge_telemetry(&front, &rear);
                if let Err(fault) = self.check_joint_envelope() {
                    return Err(self.trip(fault.into()));
                }
            }
            (front, rear) => {
                self.health.record_missed_request();
                if let Err(e) = front {
                    warn!(board = "front", error = %e, "telemetry packet rejected");
                }
                if let Err(e) = rear {
                    warn!(board = "rear", error = %e, "telemetry packet rejected");
                }
            }
        }

        Ok(self.obs.clone())
    }

    fn merge_telemetry(&mut self, front: &BoardTelemetry, rear: &BoardTelemetry) {
        let motor = |id: u8| {
            if id <= 8 {
                front.motors.get(&id)
            } else {
                rear.motors.get(&id)
            }
        };

        if let Some(dof_pos) = self.obs.get_mut("dof_pos") {
            for joint in 0..JOINT_COUNT {
                if let Some(frame) = motor(motor_id_for_joint(joint)) {
                    dof_pos[joint] = frame.position + joint_limit(joint).offset;
                }
            }
        }
        if let Some(dof_vel) = self.obs.get_mut("dof_vel") {
            for (index, slot) in dof_vel.iter_mut().enumerate() {
                if let Some(frame) = motor(motor_id_for_velocity_index(index)) {
                    *slot = frame.velocity;
                }
            }
        }
        if let Some(imu) = rear.imu.or(front.imu) {
            if let Some(ang_vel) = self.obs.get_mut("ang_vel") {
                ang_vel.copy_from_slice(&imu.gyro);
            }
            if let Some(proj_grav) = self.obs.get_mut("proj_grav") {
                proj_grav.copy_from_slice(&imu.proj_grav);
            }
        }
    }

    fn check_joint_envelope(&self) -> Result<(), SafetyFault> {
        match (self.obs.get("dof_pos"), self.obs.get("dof_vel")) {
            (Some(pos), Some(vel)) => check_envelope(pos, vel),
            _ => Ok(()),
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Dispatch
    // ────────────────────────────────────────────────────────────────

    /// Dispatch one 16-channel action to both boards.
    ///
    /// In position mode, position channels command the target joint
    /// angle (offset removed) under the stored gains and wheel
    /// channels command a velocity. In torque mode every channel is a
    /// raw torque with zero gains.
    ///
    /// # Errors
    ///
    /// [`GainsError::NotSet`] before [`set_gains`](Self::set_gains); a
    /// [`FatalSignal`] (motors already stopped) when the action has
    /// the wrong length.
    pub fn do_action(&mut self, action: &[f32], torque_ctrl: bool) -> Result<(), HalError> {
        let (kp, kd) = match (&self.kp, &self.kd) {
            (Some(kp), Some(kd)) => (kp.clone(), kd.clone()),
            _ => return Err(GainsError::NotSet.into()),
        };

        if action.len() != ACTION_DIM {
            let reason = format!(
                "action length {} does not match the {ACTION_DIM} motor channels",
                action.len()
            );
            return Err(self.trip(FatalSignal::estop(reason)).into());
        }

        let mut pos = [0.0f32; ACTION_DIM];
        let mut vel = [0.0f32; ACTION_DIM];
        let mut torque = [0.0f32; ACTION_DIM];
        let (kp, kd) = if torque_ctrl {
            torque.copy_from_slice(action);
            ([0.0f32; ACTION_DIM], [0.0f32; ACTION_DIM])
        } else {
            for channel in 0..ACTION_DIM {
                if is_position_channel(channel) {
                    let joint = joint_for_channel(channel);
                    pos[channel] = action[channel] - joint_limit(joint).offset;
                } else {
                    vel[channel] = action[channel];
                }
            }
            let mut kp_arr = [0.0f32; ACTION_DIM];
            let mut kd_arr = [0.0f32; ACTION_DIM];
            kp_arr.copy_from_slice(&kp);
            kd_arr.copy_from_slice(&kd);
            (kp_arr, kd_arr)
        };

        self.front.operate(
            &FRONT_MOTOR_IDS,
            &pos[..8],
            &vel[..8],
            &kp[..8],
            &kd[..8],
            &torque[..8],
        );
        self.rear.operate(
            &REAR_MOTOR_IDS,
            &pos[8..],
            &vel[8..],
            &kp[8..],
            &kd[8..],
            &torque[8..],
        );

        if let Some(last_action) = self.obs.get_mut("last_action") {
            last_action.copy_from_slice(action);
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────
    // Terminal paths
    // ────────────────────────────────────────────────────────────────

    /// Stop every motor, retrying each board until it acks, and
    /// return the e-stop signal for the host loop to surface.
    pub fn estop(&mut self, reason: impl Into<String>) -> FatalSignal {
        self.trip(FatalSignal::estop(reason))
    }

    /// Halt every motor at caller request (clean shutdown).
    pub fn sleep_motors(&mut self) -> FatalSignal {
        self.trip(FatalSignal::Sleep)
    }

    /// The one path that stops hardware. Retries each board's stop
    /// command until that board acknowledges; never gives up.
    fn trip(&mut self, signal: FatalSignal) -> FatalSignal {
        warn!(%signal, "stopping all motors");
        let mut front_acked = false;
        let mut rear_acked = false;
        loop {
            if !front_acked {
                front_acked = self.front.emergency_stop(&FRONT_MOTOR_IDS);
            }
            if !rear_acked {
                rear_acked = self.rear.emergency_stop(&REAR_MOTOR_IDS);
            }
            if front_acked && rear_acked {
                return signal;
            }
            thread::sleep(ESTOP_RETRY);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sim::SimBoard;

    fn monitor() -> SafetyMonitor<SimBoard> {
        SafetyMonitor::new(SimBoard::front(), SimBoard::rear())
    }

    fn demo_gains() -> (Vec<f32>, Vec<f32>) {
        let mut kp = vec![100.0; ACTION_DIM];
        for &w in &WHEEL_CHANNELS {
            kp[w] = 0.0;
        }
        let kd = vec![1.5; ACTION_DIM];
        (kp, kd)
    }

    #[test]
    fn wait_ready_succeeds_on_healthy_boards() {
        let mut m = monitor();
        assert!(m.wait_ready(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn wait_ready_times_out_when_board_never_readies() {
        let mut m = monitor();
        m.front_link().set_pattern(0);
        let err = m.wait_ready(Duration::ZERO).unwrap_err();
        assert!(matches!(err, FatalSignal::EStop { .. }));
    }

    #[test]
    fn set_gains_rejects_nonzero_wheel_kp() {
        let mut m = monitor();
        let (mut kp, kd) = demo_gains();
        kp[6] = 50.0;
        assert!(matches!(
            m.set_gains(&kp, &kd),
            Err(GainsError::NonZeroWheelKp { channel: 6, .. })
        ));
    }

    #[test]
    fn set_gains_rejects_wrong_length_and_negatives() {
        let mut m = monitor();
        let (kp, kd) = demo_gains();
        assert!(matches!(
            m.set_gains(&kp[..8], &kd),
            Err(GainsError::LengthMismatch { which: "kp", got: 8, .. })
        ));
        let mut bad_kd = kd.clone();
        bad_kd[2] = -1.0;
        assert!(matches!(
            m.set_gains(&kp, &bad_kd),
            Err(GainsError::Negative { which: "kd", channel: 2, .. })
        ));
    }

    #[test]
    fn get_obs_merges_joint_and_imu_telemetry() {
        let mut m = monitor();
        m.front_link().set_motor(1, 0.25, 1.0, 0.0);
        // Rear leg joint 6 reads from motor M9.
        m.rear_link().set_motor(9, -0.5, 0.0, 0.0);
        // Wheel velocity channel 6 reads from motor M7.
        m.front_link().set_motor(7, 0.0, 3.0, 0.0);
        m.rear_link().set_imu([0.1, 0.2, 0.3], [0.0, 0.0, -1.0]);

        let obs = m.get_obs().unwrap();
        assert_eq!(obs["dof_pos"][0], 0.25);
        assert_eq!(obs["dof_pos"][6], -0.5);
        assert_eq!(obs["dof_vel"][0], 1.0);
        assert_eq!(obs["dof_vel"][6], 3.0);
        assert_eq!(obs["ang_vel"], vec![0.1, 0.2, 0.3]);
        assert_eq!(obs["proj_grav"], vec![0.0, 0.0, -1.0]);
        assert_eq!(obs["height_map"].len(), 144);
        assert_eq!(obs["height_map"][0], HEIGHT_MAP_FILL);
    }

    #[test]
    fn rejected_packet_keeps_previous_values() {
        let mut m = monitor();
        m.front_link().set_motor(1, 0.25, 0.0, 0.0);
        let obs = m.get_obs().unwrap();
        assert_eq!(obs["dof_pos"][0], 0.25);

        m.front_link().set_motor(1, 2.0, 0.0, 0.0);
        m.front_link().drop_next_requests(1);
        let obs = m.get_obs().unwrap();
        assert_eq!(obs["dof_pos"][0], 0.25);
    }

    #[test]
    fn sustained_missed_requests_become_fatal() {
        let mut m = monitor();
        m.front_link().drop_next_requests(10);
        for _ in 0..10 {
            assert!(m.check_safety().is_ok());
        }
        // Ten missed 20 ms round-trips have expired the link.
        assert!(m.check_safety().is_err());
        assert!(m.front_link().estop_attempts() >= 1);
        assert!(m.rear_link().estop_attempts() >= 1);
    }

    #[test]
    fn emergency_flag_is_fatal_and_stops_motors() {
        let mut m = monitor();
        m.rear_link().set_emergency(true);
        let err = m.check_safety().unwrap_err();
        assert!(err.to_string().contains("emergency"));
        assert_eq!(m.front_link().estop_attempts(), 1);
    }

    #[test]
    fn envelope_violation_in_telemetry_is_fatal() {
        let mut m = monitor();
        m.front_link().set_motor(1, 3.2, 0.0, 0.0);
        let err = m.get_obs().unwrap_err();
        assert!(err.to_string().contains("position limit"));
        assert_eq!(m.rear_link().estop_attempts(), 1);
    }

    #[test]
    fn do_action_requires_gains() {
        let mut m = monitor();
        assert!(matches!(
            m.do_action(&[0.0; ACTION_DIM], false),
            Err(HalError::Gains(GainsError::NotSet))
        ));
    }

    #[test]
    fn do_action_splits_channels_across_boards() {
        let mut m = monitor();
        let (kp, kd) = demo_gains();
        m.set_gains(&kp, &kd).unwrap();

        let mut action = [0.0f32; ACTION_DIM];
        action[0] = 0.5; // front position channel
        action[6] = 2.0; // front wheel channel
        action[8] = -0.5; // rear position channel
        action[15] = -2.0; // rear wheel channel
        m.do_action(&action, false).unwrap();

        let front_call = m.front_link().last_operate().unwrap();
        assert_eq!(front_call.pos[0], 0.5);
        assert_eq!(front_call.vel[6], 2.0);
        assert_eq!(front_call.pos[6], 0.0);
        assert_eq!(front_call.kp[0], 100.0);
        assert_eq!(front_call.kp[6], 0.0);

        let rear_call = m.rear_link().last_operate().unwrap();
        assert_eq!(rear_call.pos[0], -0.5);
        assert_eq!(rear_call.vel[7], -2.0);

        let obs = m.get_obs().unwrap();
        assert_eq!(obs["last_action"][0], 0.5);
        assert_eq!(obs["last_action"][15], -2.0);
    }

    #[test]
    fn torque_mode_zeroes_gains() {
        let mut m = monitor();
        let (kp, kd) = demo_gains();
        m.set_gains(&kp, &kd).unwrap();

        let action = [0.1f32; ACTION_DIM];
        m.do_action(&action, true).unwrap();
        let call = m.front_link().last_operate().unwrap();
        assert_eq!(call.torque[3], 0.1);
        assert_eq!(call.kp[0], 0.0);
        assert_eq!(call.kd[0], 0.0);
        assert_eq!(call.pos[0], 0.0);
    }

    #[test]
    fn wrong_action_length_is_fatal() {
        let mut m = monitor();
        let (kp, kd) = demo_gains();
        m.set_gains(&kp, &kd).unwrap();
        let err = m.do_action(&[0.0; 12], false).unwrap_err();
        assert!(matches!(err, HalError::Fatal(FatalSignal::EStop { .. })));
        assert_eq!(m.front_link().estop_attempts(), 1);
    }

    #[test]
    fn estop_retries_until_both_boards_ack() {
        let mut m = monitor();
        m.front_link().refuse_next_estops(3);
        let signal = m.estop("operator stop");
        assert!(matches!(signal, FatalSignal::EStop { .. }));
        assert_eq!(m.front_link().estop_attempts(), 4);
        // The rear board acked on the first round and was not re-sent.
        assert_eq!(m.rear_link().estop_attempts(), 1);
    }

    #[test]
    fn sleep_retries_like_estop() {
        let mut m = monitor();
        m.rear_link().refuse_next_estops(2);
        assert_eq!(m.sleep_motors(), FatalSignal::Sleep);
        assert_eq!(m.rear_link().estop_attempts(), 3);
    }
}
