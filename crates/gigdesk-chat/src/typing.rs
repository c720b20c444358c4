use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Quiet period after which the indicator hides itself.
pub const TYPING_TIMEOUT: Duration = Duration::from_millis(1000);

/// "Peer is typing" flag with a sliding deadline.
#[derive(Debug)]
pub struct TypingIndicator {
    timeout: Duration,
    typist: Option<Uuid>,
    deadline: Option<Instant>,
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new(TYPING_TIMEOUT)
    }
}

impl TypingIndicator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            typist: None,
            deadline: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.typist.is_some()
    }

    pub fn typist(&self) -> Option<Uuid> {
        self.typist
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Record a typing notice. Returns true if the indicator just turned on;
    /// otherwise only the deadline moves.
    pub fn on_typing(&mut self, sender: Uuid, now: Instant) -> bool {
        let was_active = self.is_active();
        self.typist = Some(sender);
        self.deadline = Some(now + self.timeout);
        !was_active
    }

    /// Hide the indicator if its deadline passed. Returns true if it did.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.clear();
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.typist = None;
        self.deadline = None;
    }
}
