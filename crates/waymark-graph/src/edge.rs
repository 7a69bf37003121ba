use serde::{Deserialize, Serialize};

use waymark_core::types::NodeId;

/// A directed edge from an output socket to an input socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Source node id.
    pub source: NodeId,
    /// Output socket index on the source.
    pub source_socket: usize,
    /// Target node id.
    pub target: NodeId,
    /// Input socket index on the target.
    pub target_socket: usize,
}

impl Connection {
    pub fn new(
        source: NodeId,
        source_socket: usize,
        target: NodeId,
        target_socket: usize,
    ) -> Self {
        Self {
            source,
            source_socket,
            target,
            target_socket,
        }
    }

    /// Connect socket 0 to socket 0, the only sockets in the base model.
    pub fn linear(source: NodeId, target: NodeId) -> Self {
        Self::new(source, 0, target, 0)
    }

    pub fn touches(&self, id: &NodeId) -> bool {
        &self.source == id || &self.target == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touches() {
        let a = NodeId::from_str("a");
        let b = NodeId::from_str("b");
        let c = Connection::linear(a.clone(), b.clone());
        assert!(c.touches(&a));
        assert!(c.touches(&b));
        assert!(!c.touches(&NodeId::from_str("c")));
        assert_eq!(c.source_socket, 0);
        assert_eq!(c.target_socket, 0);
    }
}
