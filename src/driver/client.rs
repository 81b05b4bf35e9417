//! Client sessions tracked by the conductor

use crate::counters::NULL_COUNTER_ID;

/// One attached client, created on its first command and destroyed when its
/// keepalives stop.
#[derive(Debug)]
pub struct ClientSession {
    pub client_id: i64,
    pub last_keepalive_ns: i64,
    pub heartbeat_counter_id: i32,
}

impl ClientSession {
    pub fn new(client_id: i64, now_ns: i64) -> Self {
        Self {
            client_id,
            last_keepalive_ns: now_ns,
            heartbeat_counter_id: NULL_COUNTER_ID,
        }
    }

    /// Record a keepalive
    pub fn on_keepalive(&mut self, now_ns: i64) {
        self.last_keepalive_ns = now_ns;
    }

    /// Whether the liveness window has elapsed without a keepalive
    pub fn has_timed_out(&self, now_ns: i64, timeout_ns: i64) -> bool {
        now_ns > self.last_keepalive_ns + timeout_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_window() {
        let mut client = ClientSession::new(7, 1_000);
        assert!(!client.has_timed_out(1_000, 500));
        assert!(!client.has_timed_out(1_500, 500));
        assert!(client.has_timed_out(1_501, 500));

        client.on_keepalive(2_000);
        assert!(!client.has_timed_out(2_400, 500));
    }
}
