//! Coordination-store key namespace (§3): four logical regions under a
//! single configurable prefix.

#[derive(Debug, Clone)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn leader(&self) -> String {
        format!("{}:leader", self.prefix)
    }

    pub fn node(&self, node_id: &str) -> String {
        format!("{}:node/{}", self.prefix, node_id)
    }

    /// Pattern matching every live node-health key, for prefix enumeration.
    pub fn node_pattern(&self) -> String {
        format!("{}:node/*", self.prefix)
    }

    pub fn heartbeat_count(&self) -> String {
        format!("{}:heartbeat_count", self.prefix)
    }

    pub fn work_queue(&self) -> String {
        format!("{}:work_queue", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_a_single_prefix() {
        let keys = Keys::new("argus");
        assert_eq!(keys.leader(), "argus:leader");
        assert_eq!(keys.node("node-a"), "argus:node/node-a");
        assert_eq!(keys.node_pattern(), "argus:node/*");
        assert_eq!(keys.heartbeat_count(), "argus:heartbeat_count");
        assert_eq!(keys.work_queue(), "argus:work_queue");
    }
}
