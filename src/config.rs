//! Engine configuration (§6.5).

/// The single recognized configuration option: the maximum number of
/// concurrent sub-tasks a fan-out pool admits before back-pressuring the
/// producer (§5).
#[derive(Debug, Clone)]
pub struct Config {
    pub resolve_node_breadth_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resolve_node_breadth_limit: 20,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolve_node_breadth_limit(mut self, limit: usize) -> Self {
        assert!(limit > 0, "resolveNodeBreadthLimit must be a positive integer");
        self.resolve_node_breadth_limit = limit;
        self
    }
}
