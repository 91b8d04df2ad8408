//! Debounced link-health accounting.
//!
//! One transient parse failure or status hiccup must not stop the
//! robot; a sustained outage must. Two counters feed the verdict:
//! accumulated disconnect time from status polls, and the number of
//! consecutive telemetry round-trips that failed to parse. Either one
//! crossing the timeout expires the link.

/// Milliseconds of sustained silence before the link is declared dead.
pub const LINK_TIMEOUT_MS: u32 = 200;

/// Tracks board-link liveness across control ticks.
#[derive(Debug, Clone)]
pub struct ConnectionHealth {
    disconnected_ms: u32,
    missed_requests: u32,
    tick_ms: u32,
    timeout_ms: u32,
}

impl ConnectionHealth {
    /// `tick_ms` is the nominal control period; each disconnected
    /// status poll and each missed telemetry round-trip charges one
    /// tick toward the timeout.
    pub fn new(tick_ms: u32) -> Self {
        Self {
            disconnected_ms: 0,
            missed_requests: 0,
            tick_ms,
            timeout_ms: LINK_TIMEOUT_MS,
        }
    }

    /// Record the outcome of one status poll. A clean poll clears the
    /// accumulated disconnect time entirely.
    pub fn record_status(&mut self, disconnected: bool) {
        if disconnected {
            self.disconnected_ms += self.tick_ms;
        } else {
            self.disconnected_ms = 0;
        }
    }

    /// One telemetry request failed to parse on either board.
    pub fn record_missed_request(&mut self) {
        self.missed_requests += 1;
    }

    /// Both boards returned a valid telemetry packet this tick.
    pub fn record_clean_round_trip(&mut self) {
        self.missed_requests = 0;
    }

    /// True once either counter has accumulated a full timeout.
    pub fn is_expired(&self) -> bool {
        self.disconnected_ms.max(self.missed_requests * self.tick_ms) >= self.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_link_is_healthy() {
        assert!(!ConnectionHealth::new(20).is_expired());
    }

    #[test]
    fn ten_disconnected_polls_expire_at_20ms_tick() {
        let mut h = ConnectionHealth::new(20);
        for _ in 0..9 {
            h.record_status(true);
        }
        assert!(!h.is_expired());
        h.record_status(true);
        assert!(h.is_expired());
    }

    #[test]
    fn clean_status_resets_disconnect_time() {
        let mut h = ConnectionHealth::new(20);
        for _ in 0..9 {
            h.record_status(true);
        }
        h.record_status(false);
        h.record_status(true);
        assert!(!h.is_expired());
    }

    #[test]
    fn missed_requests_expire_independently() {
        let mut h = ConnectionHealth::new(20);
        for _ in 0..9 {
            h.record_missed_request();
        }
        assert!(!h.is_expired());
        h.record_missed_request();
        assert!(h.is_expired());
    }

    #[test]
    fn clean_round_trip_resets_missed_count() {
        let mut h = ConnectionHealth::new(20);
        for _ in 0..9 {
            h.record_missed_request();
        }
        h.record_clean_round_trip();
        h.record_missed_request();
        assert!(!h.is_expired());
    }
}
