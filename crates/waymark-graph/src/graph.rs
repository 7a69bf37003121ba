//! The command graph: owned node set, linear connections, and the
//! id-based attachment relations layered on top of them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;

use waymark_core::error::{Result, WaymarkError};
use waymark_core::types::NodeId;

use crate::edge::Connection;
use crate::kind::NodeKind;
use crate::node::CommandNode;

/// A graph shared between the editing context and the execution engine.
pub type SharedGraph = Arc<RwLock<Graph>>;

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, CommandNode>,
    /// Insertion order, preserved for serialization.
    order: Vec<NodeId>,
    connections: Vec<Connection>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedGraph {
        Arc::new(RwLock::new(self))
    }

    /// Add a node. Returns its id.
    pub fn add_node(&mut self, node: CommandNode) -> NodeId {
        let id = node.id().clone();
        if self.nodes.insert(id.clone(), node).is_none() {
            self.order.push(id.clone());
        }
        id
    }

    pub fn node(&self, id: &NodeId) -> Option<&CommandNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut CommandNode> {
        self.nodes.get_mut(id)
    }

    fn require(&self, id: &NodeId) -> Result<&CommandNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| WaymarkError::NodeNotFound(id.to_string()))
    }

    fn require_mut(&mut self, id: &NodeId) -> Result<&mut CommandNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| WaymarkError::NodeNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &CommandNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    // ── Connections ────────────────────────────────────────────────

    /// Connect an output socket to an input socket.
    ///
    /// Both sockets are single-occupancy; any connection already using
    /// either one is replaced and returned.
    pub fn connect(
        &mut self,
        source: &NodeId,
        source_socket: usize,
        target: &NodeId,
        target_socket: usize,
    ) -> Result<Vec<Connection>> {
        let src = self.require(source)?;
        let dst = self.require(target)?;

        if source == target {
            return Err(WaymarkError::Cycle(source.to_string()));
        }
        if source_socket >= src.kind().output_sockets() {
            return Err(WaymarkError::InvalidSocket {
                node: source.to_string(),
                socket: source_socket,
            });
        }
        if target_socket >= dst.kind().input_sockets() {
            return Err(WaymarkError::InvalidSocket {
                node: target.to_string(),
                socket: target_socket,
            });
        }
        for id in [source, target] {
            if self.is_attached(id) {
                return Err(WaymarkError::InvalidAttachment(format!(
                    "node {} is attached to another node and cannot be connected",
                    id
                )));
            }
        }

        let mut replaced = Vec::new();
        self.connections.retain(|c| {
            let clash = (&c.source == source && c.source_socket == source_socket)
                || (&c.target == target && c.target_socket == target_socket);
            if clash {
                replaced.push(c.clone());
            }
            !clash
        });
        self.connections.push(Connection::new(
            source.clone(),
            source_socket,
            target.clone(),
            target_socket,
        ));

        debug!(
            source = %source,
            target = %target,
            replaced = replaced.len(),
            "Connected nodes"
        );
        Ok(replaced)
    }

    /// Remove the connection leaving `source` at `source_socket`.
    pub fn disconnect(&mut self, source: &NodeId, source_socket: usize) -> Option<Connection> {
        let idx = self
            .connections
            .iter()
            .position(|c| &c.source == source && c.source_socket == source_socket)?;
        Some(self.connections.remove(idx))
    }

    /// The node after `id` in execution order.
    pub fn next_node(&self, id: &NodeId) -> Option<&NodeId> {
        self.connections
            .iter()
            .find(|c| &c.source == id && c.source_socket == 0)
            .map(|c| &c.target)
    }

    pub fn previous_node(&self, id: &NodeId) -> Option<&NodeId> {
        self.connections
            .iter()
            .find(|c| &c.target == id && c.target_socket == 0)
            .map(|c| &c.source)
    }

    /// Take a node out of the linear chain, stitching its predecessor to its
    /// successor so the sequence stays continuous.
    fn unlink(&mut self, id: &NodeId) {
        let incoming: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| &c.target == id)
            .cloned()
            .collect();
        let outgoing: Vec<Connection> = self
            .connections
            .iter()
            .filter(|c| &c.source == id)
            .cloned()
            .collect();

        self.connections.retain(|c| !c.touches(id));

        if let ([inc], [out]) = (incoming.as_slice(), outgoing.as_slice()) {
            if inc.source != out.target {
                debug!(from = %inc.source, to = %out.target, "Re-stitched chain around removed node");
                self.connections.push(Connection::new(
                    inc.source.clone(),
                    inc.source_socket,
                    out.target.clone(),
                    out.target_socket,
                ));
            }
        }
    }

    // ── Traversal ──────────────────────────────────────────────────

    /// The single designated start node.
    pub fn start_node(&self) -> Result<NodeId> {
        let starts: Vec<&CommandNode> = self
            .nodes()
            .filter(|n| n.kind() == NodeKind::Start)
            .collect();
        match starts.as_slice() {
            [] => Err(WaymarkError::NoStartNode),
            [start] => Ok(start.id().clone()),
            many => Err(WaymarkError::MultipleStartNodes(many.len())),
        }
    }

    /// Walk from the start node along outgoing connections until an end
    /// node or a node without a successor.
    pub fn execution_order(&self) -> Result<Vec<NodeId>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(self.start_node()?);

        while let Some(id) = current {
            if !seen.insert(id.clone()) {
                return Err(WaymarkError::Cycle(id.to_string()));
            }
            let is_end = self.require(&id)?.kind() == NodeKind::End;
            current = if is_end {
                None
            } else {
                self.next_node(&id).cloned()
            };
            order.push(id);
        }
        Ok(order)
    }

    /// Check structural integrity: one start node, no dangling references,
    /// and an acyclic execution order.
    ///
    /// `connect` keeps a single connection per input socket, so a loop built
    /// through it is cut off from the start node and never walked. Only a
    /// hand-assembled connection list can make the walk revisit a node.
    pub fn validate(&self) -> Result<()> {
        for c in &self.connections {
            self.require(&c.source)?;
            self.require(&c.target)?;
        }
        for node in self.nodes() {
            for p in node.parameters() {
                if let Some(provider) = p.attached() {
                    self.require(provider)?;
                }
            }
            if let Some(sensor) = node.sensor() {
                self.require(sensor)?;
            }
            for action in node.actions() {
                self.require(action)?;
            }
        }
        self.execution_order().map(|_| ())
    }

    // ── Attachments ────────────────────────────────────────────────

    /// Source `param` on `node` from `provider`.
    pub fn attach_parameter(
        &mut self,
        node: &NodeId,
        param: &str,
        provider: &NodeId,
    ) -> Result<()> {
        if !self.require(provider)?.kind().is_provider() {
            return Err(WaymarkError::InvalidAttachment(format!(
                "node {} is not a value provider",
                provider
            )));
        }
        if node == provider || self.provider_chain_reaches(provider, node) {
            return Err(WaymarkError::InvalidAttachment(format!(
                "attaching {} to {}.{} would create a cycle",
                provider, node, param
            )));
        }

        let target = self.require_mut(node)?;
        let slot = target.parameter_mut(param).ok_or_else(|| {
            WaymarkError::InvalidAttachment(format!("node {} has no parameter '{}'", node, param))
        })?;
        slot.attach(provider.clone());
        debug!(node = %node, param, provider = %provider, "Attached parameter provider");
        Ok(())
    }

    /// Revert `param` to its literal value. Returns the former provider.
    pub fn detach_parameter(&mut self, node: &NodeId, param: &str) -> Result<Option<NodeId>> {
        let target = self.require_mut(node)?;
        let slot = target.parameter_mut(param).ok_or_else(|| {
            WaymarkError::InvalidAttachment(format!("node {} has no parameter '{}'", node, param))
        })?;
        Ok(slot.detach())
    }

    /// Whether following parameter attachments from `from` reaches `target`.
    fn provider_chain_reaches(&self, from: &NodeId, target: &NodeId) -> bool {
        let mut stack = vec![from];
        let mut visited = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.parameters().iter().filter_map(|p| p.attached()));
            }
        }
        false
    }

    /// Gate `control` on `sensor`. Returns the sensor it replaced.
    ///
    /// A sensor belongs to at most one control node; attaching it elsewhere
    /// moves it.
    pub fn attach_sensor(&mut self, control: &NodeId, sensor: &NodeId) -> Result<Option<NodeId>> {
        if !self.require(control)?.kind().is_control() {
            return Err(WaymarkError::InvalidAttachment(format!(
                "node {} cannot hold a sensor",
                control
            )));
        }
        if !self.require(sensor)?.kind().is_sensor() {
            return Err(WaymarkError::InvalidAttachment(format!(
                "node {} is not a sensor",
                sensor
            )));
        }

        for n in self.nodes.values_mut() {
            if n.sensor.as_ref() == Some(sensor) {
                n.sensor = None;
            }
        }
        let previous = self.require_mut(control)?.sensor.replace(sensor.clone());
        debug!(control = %control, sensor = %sensor, "Attached sensor");
        Ok(previous)
    }

    pub fn detach_sensor(&mut self, control: &NodeId) -> Option<NodeId> {
        self.nodes.get_mut(control).and_then(|n| n.sensor.take())
    }

    /// Append `action` to the nested sequence of `control`.
    ///
    /// The action leaves the linear chain (its neighbours are re-stitched)
    /// and any previous parent.
    pub fn attach_action(&mut self, control: &NodeId, action: &NodeId) -> Result<()> {
        if !self.require(control)?.kind().is_control() {
            return Err(WaymarkError::InvalidAttachment(format!(
                "node {} cannot hold actions",
                control
            )));
        }
        if !self.require(action)?.kind().is_command() {
            return Err(WaymarkError::InvalidAttachment(format!(
                "node {} cannot run as an action",
                action
            )));
        }
        if control == action || self.action_ancestors(control).contains(action) {
            return Err(WaymarkError::InvalidAttachment(format!(
                "attaching {} under {} would nest it inside itself",
                action, control
            )));
        }

        self.unlink(action);
        for n in self.nodes.values_mut() {
            n.actions.retain(|a| a != action);
        }
        self.require_mut(control)?.actions.push(action.clone());
        debug!(control = %control, action = %action, "Attached action");
        Ok(())
    }

    pub fn detach_action(&mut self, control: &NodeId, action: &NodeId) -> bool {
        match self.nodes.get_mut(control) {
            Some(n) => {
                let before = n.actions.len();
                n.actions.retain(|a| a != action);
                n.actions.len() != before
            }
            None => false,
        }
    }

    /// Control nodes enclosing `id`, innermost first.
    fn action_ancestors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = id.clone();
        while let Some(parent) = self.parent_action_control(&current) {
            if ancestors.contains(parent) {
                break;
            }
            ancestors.push(parent.clone());
            current = parent.clone();
        }
        ancestors
    }

    /// The control node `sensor` gates, if any.
    pub fn parent_control(&self, sensor: &NodeId) -> Option<&NodeId> {
        self.nodes()
            .find(|n| n.sensor() == Some(sensor))
            .map(|n| n.id())
    }

    /// The control node whose action list contains `action`, if any.
    pub fn parent_action_control(&self, action: &NodeId) -> Option<&NodeId> {
        self.nodes()
            .find(|n| n.actions().contains(action))
            .map(|n| n.id())
    }

    /// Whether `id` is referenced by any attachment relation.
    pub fn is_attached(&self, id: &NodeId) -> bool {
        self.nodes.values().any(|n| {
            n.sensor() == Some(id)
                || n.actions().contains(id)
                || n.parameters().iter().any(|p| p.attached() == Some(id))
        })
    }

    /// Whether `id` takes part in the linear connection graph, as opposed to
    /// only appearing through attachments.
    pub fn is_linear_member(&self, id: &NodeId) -> bool {
        match self.nodes.get(id) {
            Some(n) => !n.kind().is_provider() && !self.is_attached(id),
            None => false,
        }
    }

    // ── Deletion ───────────────────────────────────────────────────

    /// Delete a node.
    ///
    /// Severs its connections (re-stitching predecessor to successor), clears
    /// every attachment that references it, and deletes the sensor and
    /// action children it owns.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<CommandNode> {
        if !self.contains(id) {
            return Err(WaymarkError::NodeNotFound(id.to_string()));
        }

        self.unlink(id);
        let node = self.require(id)?.clone();
        self.nodes.remove(id);
        self.order.retain(|o| o != id);

        for n in self.nodes.values_mut() {
            if n.sensor.as_ref() == Some(id) {
                n.sensor = None;
            }
            n.actions.retain(|a| a != id);
            for p in n.parameters_mut() {
                if p.attached() == Some(id) {
                    p.detach();
                }
            }
        }

        for child in node.sensor().into_iter().chain(node.actions()) {
            if self.contains(child) {
                self.remove_node(child)?;
            }
        }

        debug!(node = %id, kind = ?node.kind(), "Removed node");
        Ok(node)
    }
}
