//! [`SimBoard`] – a scripted in-process motor board.
//!
//! Renders the same wire grammar a real board produces, from state
//! the caller can manipulate between ticks: joint positions, the
//! ready pattern, the emergency flag, dropped packets, and refused
//! acknowledgements. This is the driver behind headless runs and the
//! monitor's tests.

use std::collections::BTreeMap;

use crate::joints::{FRONT_MOTOR_IDS, REAR_MOTOR_IDS};
use crate::link::BoardLink;
use crate::telemetry::{READY_PATTERN, REQ_ACK, STATUS_ACK};

/// One recorded `operate` dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct OperateCall {
    pub ids: Vec<u8>,
    pub pos: Vec<f32>,
    pub vel: Vec<f32>,
    pub kp: Vec<f32>,
    pub kd: Vec<f32>,
    pub torque: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default)]
struct MotorState {
    position: f32,
    velocity: f32,
    torque: f32,
}

/// Scripted stand-in for one motor board.
#[derive(Debug, Default)]
pub struct SimBoard {
    motors: BTreeMap<u8, MotorState>,
    imu: Option<([f32; 3], [f32; 3])>,
    pattern: i64,
    emergency: bool,
    drop_requests: u32,
    refuse_starts: u32,
    refuse_estops: u32,
    started: bool,
    estop_attempts: u32,
    operate_calls: Vec<OperateCall>,
}

impl SimBoard {
    /// A board serving the given motor ids, all motors at rest.
    pub fn new(ids: &[u8]) -> Self {
        Self {
            motors: ids.iter().map(|&id| (id, MotorState::default())).collect(),
            pattern: READY_PATTERN,
            ..Self::default()
        }
    }

    /// The front board (motors M1..M8, no IMU).
    pub fn front() -> Self {
        Self::new(&FRONT_MOTOR_IDS)
    }

    /// The rear board (motors M9..M16, carries the IMU).
    pub fn rear() -> Self {
        let mut board = Self::new(&REAR_MOTOR_IDS);
        board.imu = Some(([0.0; 3], [0.0, 0.0, -1.0]));
        board
    }

    // ────────────────────────────────────────────────────────────────
    // Scripting knobs
    // ────────────────────────────────────────────────────────────────

    /// Set one motor's reported position, velocity, and torque.
    pub fn set_motor(&mut self, id: u8, position: f32, velocity: f32, torque: f32) {
        self.motors.insert(
            id,
            MotorState {
                position,
                velocity,
                torque,
            },
        );
    }

    /// Set the IMU sample rendered at the end of each telemetry packet.
    pub fn set_imu(&mut self, gyro: [f32; 3], proj_grav: [f32; 3]) {
        self.imu = Some((gyro, proj_grav));
    }

    /// Override the `pattern:` value every motor reports.
    pub fn set_pattern(&mut self, pattern: i64) {
        self.pattern = pattern;
    }

    /// Raise or clear the board's emergency flag.
    pub fn set_emergency(&mut self, emergency: bool) {
        self.emergency = emergency;
    }

    /// Answer the next `n` telemetry requests with garbage.
    pub fn drop_next_requests(&mut self, n: u32) {
        self.drop_requests = n;
    }

    /// Refuse the next `n` start commands.
    pub fn refuse_next_starts(&mut self, n: u32) {
        self.refuse_starts = n;
    }

    /// Refuse the next `n` emergency-stop commands.
    pub fn refuse_next_estops(&mut self, n: u32) {
        self.refuse_estops = n;
    }

    // ────────────────────────────────────────────────────────────────
    // Inspection
    // ────────────────────────────────────────────────────────────────

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Total emergency-stop commands received, acked or not.
    pub fn estop_attempts(&self) -> u32 {
        self.estop_attempts
    }

    /// The most recent `operate` dispatch, if any.
    pub fn last_operate(&self) -> Option<&OperateCall> {
        self.operate_calls.last()
    }

    /// Every `operate` dispatch in arrival order.
    pub fn operate_calls(&self) -> &[OperateCall] {
        &self.operate_calls
    }
}

impl BoardLink for SimBoard {
    fn start(&mut self, _ids: &[u8]) -> bool {
        if self.refuse_starts > 0 {
            self.refuse_starts -= 1;
            return false;
        }
        self.started = true;
        true
    }

    fn status(&mut self) -> String {
        let mut out = String::from(STATUS_ACK);
        for &id in self.motors.keys() {
            out.push_str(&format!(" M{id} pattern:{}", self.pattern));
        }
        let value = if self.emergency { "on" } else { "off" };
        out.push_str(&format!(" EMERGENCY value:{value}"));
        out
    }

    fn request(&mut self, ids: &[u8]) -> String {
        if self.drop_requests > 0 {
            self.drop_requests -= 1;
            return String::from("ERR timeout");
        }
        let mut out = String::from(REQ_ACK);
        for &id in ids {
            let m = self.motors.get(&id).copied().unwrap_or_default();
            out.push_str(&format!(
                " M{id} p:{} v:{} t:{}",
                m.position, m.velocity, m.torque
            ));
        }
        if let Some((gyro, pg)) = self.imu {
            out.push_str(&format!(
                " IMU gx:{} gy:{} gz:{} pgx:{} pgy:{} pgz:{}",
                gyro[0], gyro[1], gyro[2], pg[0], pg[1], pg[2]
            ));
        }
        out
    }

    fn operate(
        &mut self,
        ids: &[u8],
        pos: &[f32],
        vel: &[f32],
        kp: &[f32],
        kd: &[f32],
        torque: &[f32],
    ) {
        self.operate_calls.push(OperateCall {
            ids: ids.to_vec(),
            pos: pos.to_vec(),
            vel: vel.to_vec(),
            kp: kp.to_vec(),
            kd: kd.to_vec(),
            torque: torque.to_vec(),
        });
    }

    fn emergency_stop(&mut self, _ids: &[u8]) -> bool {
        self.estop_attempts += 1;
        if self.refuse_estops > 0 {
            self.refuse_estops -= 1;
            return false;
        }
        self.started = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{parse_status, parse_telemetry};

    #[test]
    fn rendered_telemetry_round_trips_through_the_parser() {
        let mut board = SimBoard::rear();
        board.set_motor(12, 0.75, -1.25, 0.5);
        board.set_imu([0.1, 0.0, 0.0], [0.0, 0.0, -1.0]);

        let raw = board.request(&REAR_MOTOR_IDS);
        let t = parse_telemetry(&raw, &REAR_MOTOR_IDS).unwrap();
        assert_eq!(t.motors[&12].position, 0.75);
        assert_eq!(t.motors[&12].velocity, -1.25);
        assert_eq!(t.imu.unwrap().gyro, [0.1, 0.0, 0.0]);
    }

    #[test]
    fn rendered_status_round_trips_through_the_parser() {
        let mut board = SimBoard::front();
        let report = parse_status(&board.status(), &FRONT_MOTOR_IDS);
        assert!(!report.disconnected);
        assert!(!report.emergency);

        board.set_emergency(true);
        assert!(parse_status(&board.status(), &FRONT_MOTOR_IDS).emergency);

        board.set_emergency(false);
        board.set_pattern(0);
        assert!(parse_status(&board.status(), &FRONT_MOTOR_IDS).disconnected);
    }

    #[test]
    fn dropped_requests_are_consumed() {
        let mut board = SimBoard::front();
        board.drop_next_requests(1);
        assert!(parse_telemetry(&board.request(&FRONT_MOTOR_IDS), &FRONT_MOTOR_IDS).is_err());
        assert!(parse_telemetry(&board.request(&FRONT_MOTOR_IDS), &FRONT_MOTOR_IDS).is_ok());
    }

    #[test]
    fn refused_start_acks_are_consumed() {
        let mut board = SimBoard::front();
        board.refuse_next_starts(2);
        assert!(!board.start(&FRONT_MOTOR_IDS));
        assert!(!board.start(&FRONT_MOTOR_IDS));
        assert!(board.start(&FRONT_MOTOR_IDS));
        assert!(board.is_started());
    }
}
