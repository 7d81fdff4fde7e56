//! Node state definitions.

/// Node operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Node is wiring its components.
    Starting,
    /// Quote loops are running and requests are served.
    Running,
    /// Background loops are being cancelled, no new requests.
    ShuttingDown,
    /// Every background loop has exited.
    Stopped,
}

impl NodeState {
    /// Check if the node is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, NodeState::Running)
    }

    /// Check if the node is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Stopped)
    }
}
