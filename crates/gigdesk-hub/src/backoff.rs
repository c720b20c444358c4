use std::time::Duration;

/// Automatic reconnect schedule, applied after an established connection drops.
/// Attempt `n` waits `delays[n]` before dialing; once the schedule is exhausted
/// the channel gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delays: Vec<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ],
        }
    }
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }
}
