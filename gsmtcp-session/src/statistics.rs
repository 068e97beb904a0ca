//! Command session statistics

/// Command session statistics
///
/// Updated by the session on every exchange; query them at any time to
/// monitor link health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatistics {
    /// Number of command lines sent
    pub commands_sent: u64,
    /// Number of waits that ended in a match
    pub responses_matched: u64,
    /// Number of waits that timed out
    pub timeouts: u64,
    /// Number of raw payload bytes written
    pub raw_bytes_written: u64,
    /// Number of data bytes handed to readers
    pub data_bytes_read: u64,
    /// Number of sends truncated by the modem's byte ceiling
    pub partial_sends: u64,
    /// Number of unread bytes dropped when a new command was issued
    pub stale_bytes_discarded: u64,
}

impl SessionStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all counters to zero
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_commands_sent(&mut self) {
        self.commands_sent += 1;
    }

    pub fn increment_responses_matched(&mut self) {
        self.responses_matched += 1;
    }

    pub fn increment_timeouts(&mut self) {
        self.timeouts += 1;
    }

    pub fn increment_partial_sends(&mut self) {
        self.partial_sends += 1;
    }

    pub fn add_raw_bytes_written(&mut self, count: usize) {
        self.raw_bytes_written += count as u64;
    }

    pub fn add_data_bytes_read(&mut self, count: usize) {
        self.data_bytes_read += count as u64;
    }

    pub fn add_stale_bytes_discarded(&mut self, count: usize) {
        self.stale_bytes_discarded += count as u64;
    }

    /// Fraction of waits that timed out
    ///
    /// # Returns
    /// A value between 0.0 and 1.0, or 0.0 if no wait has completed
    pub fn timeout_rate(&self) -> f64 {
        let waits = self.responses_matched + self.timeouts;
        if waits == 0 {
            0.0
        } else {
            self.timeouts as f64 / waits as f64
        }
    }
}
