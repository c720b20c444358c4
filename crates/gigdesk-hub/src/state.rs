/// Lifecycle of the hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Guarded connection state transitions.
///
/// Each run of the connection driver is tagged with an epoch handed out by
/// [`begin_connect`](Self::begin_connect). Transitions requested with a stale
/// epoch (a driver that was stopped and replaced) are refused, so a late
/// driver can never resurrect a stopped channel.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    epoch: u64,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            epoch: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Disconnected -> Connecting. Returns the epoch of the new run, or `None`
    /// when a connection already exists or is being established.
    pub fn begin_connect(&mut self) -> Option<u64> {
        if self.state != ConnectionState::Disconnected {
            return None;
        }
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        Some(self.epoch)
    }

    /// Connecting | Reconnecting -> Connected.
    pub fn established(&mut self, epoch: u64) -> bool {
        self.transition(epoch, |s| {
            matches!(s, ConnectionState::Connecting | ConnectionState::Reconnecting)
                .then_some(ConnectionState::Connected)
        })
    }

    /// Connected -> Reconnecting.
    pub fn lost(&mut self, epoch: u64) -> bool {
        self.transition(epoch, |s| {
            (s == ConnectionState::Connected).then_some(ConnectionState::Reconnecting)
        })
    }

    /// Connecting | Reconnecting -> Disconnected, after a failed dial or an
    /// exhausted reconnect schedule.
    pub fn give_up(&mut self, epoch: u64) -> bool {
        self.transition(epoch, |s| {
            matches!(s, ConnectionState::Connecting | ConnectionState::Reconnecting)
                .then_some(ConnectionState::Disconnected)
        })
    }

    /// Any -> Disconnected. Returns false if already disconnected, so a second
    /// stop is a no-op. Invalidates the running driver's epoch.
    pub fn stop(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        self.epoch += 1;
        true
    }

    fn transition<F>(&mut self, epoch: u64, next: F) -> bool
    where
        F: FnOnce(ConnectionState) -> Option<ConnectionState>,
    {
        if epoch != self.epoch {
            return false;
        }
        match next(self.state) {
            Some(state) => {
                self.state = state;
                true
            }
            None => false,
        }
    }
}
