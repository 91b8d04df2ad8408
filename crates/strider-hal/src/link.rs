//! [`BoardLink`] – abstract transport to one motor board.
//!
//! The physical transport (UDP socket, CAN bridge, serial line) lives
//! outside this crate; drivers implement this trait and the rest of
//! the stack only ever talks to it. Telemetry and status come back as
//! raw protocol strings so the parsing in [`crate::telemetry`] stays
//! the single source of truth for the wire grammar.

/// Transport to one motor board, addressed by its motor-id set.
///
/// All calls are synchronous and blocking; a transport failure is
/// expressed in-band (a `false` acknowledgement, or a response string
/// that fails protocol parsing) rather than as an error type.
pub trait BoardLink: Send {
    /// Ask the board to power up and arm the given motors. Returns
    /// `true` when the board acknowledged the start command.
    fn start(&mut self, ids: &[u8]) -> bool;

    /// Fetch the board's status string (connection patterns, emergency
    /// flag).
    fn status(&mut self) -> String;

    /// Request one telemetry packet for the given motors.
    fn request(&mut self, ids: &[u8]) -> String;

    /// Send one operation command. All slices are indexed in the same
    /// order as `ids`.
    fn operate(
        &mut self,
        ids: &[u8],
        pos: &[f32],
        vel: &[f32],
        kp: &[f32],
        kd: &[f32],
        torque: &[f32],
    );

    /// Command an emergency stop for the given motors. Returns `true`
    /// when the board acknowledged it.
    fn emergency_stop(&mut self, ids: &[u8]) -> bool;
}
