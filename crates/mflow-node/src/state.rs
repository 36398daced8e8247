/// The state machine of a node. A failed start transitions directly
/// `Starting` -> `Idle` with a surfaced error. At most one `Running`
/// occurrence at a time per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl Default for NodeState {
    fn default() -> Self {
        NodeState::Idle
    }
}
