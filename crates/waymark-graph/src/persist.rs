//! On-disk graph format.
//!
//! Provider, sensor, and action nodes only appear through attachment fields;
//! connections touching them are never written. Loading rebuilds relations in
//! a fixed order (parameter providers, then sensors, then actions) and drops
//! references to ids that do not exist.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use waymark_core::error::Result;
use waymark_core::types::NodeId;

use crate::graph::Graph;
use crate::kind::NodeKind;
use crate::node::{CommandNode, Position};
use crate::parameter::{ParamType, Parameter};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphFile {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub parameters: Vec<ParameterRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_sensor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_control_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attached_action_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_action_control_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRecord {
    pub name: String,
    pub string_value: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_provider_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub source_node_id: String,
    pub target_node_id: String,
    #[serde(default)]
    pub source_socket: usize,
    #[serde(default)]
    pub target_socket: usize,
}

impl Graph {
    pub fn to_file(&self) -> GraphFile {
        let nodes = self
            .nodes()
            .map(|node| NodeRecord {
                id: node.id().to_string(),
                kind: node.kind(),
                mode: node.mode().map(str::to_string),
                position: node.position,
                parameters: node
                    .parameters()
                    .iter()
                    .map(|p| ParameterRecord {
                        name: p.name().to_string(),
                        string_value: p.raw().to_string(),
                        ty: p.ty(),
                        attached_provider_id: p.attached().map(NodeId::to_string),
                    })
                    .collect(),
                attached_sensor_id: node.sensor().map(NodeId::to_string),
                parent_control_id: self.parent_control(node.id()).map(NodeId::to_string),
                attached_action_ids: node.actions().iter().map(NodeId::to_string).collect(),
                parent_action_control_id: self
                    .parent_action_control(node.id())
                    .map(NodeId::to_string),
            })
            .collect();

        let connections = self
            .connections()
            .iter()
            .filter(|c| self.is_linear_member(&c.source) && self.is_linear_member(&c.target))
            .map(|c| ConnectionRecord {
                source_node_id: c.source.to_string(),
                target_node_id: c.target.to_string(),
                source_socket: c.source_socket,
                target_socket: c.target_socket,
            })
            .collect();

        GraphFile { nodes, connections }
    }

    /// Rebuild a graph. Never fails: invalid modes fall back to the kind's
    /// default, and unresolvable references are dropped.
    pub fn from_file(file: &GraphFile) -> Self {
        let mut graph = Graph::new();

        for record in &file.nodes {
            let mut node = CommandNode::with_id(NodeId::from_str(&record.id), record.kind);
            node.position = record.position;
            if let Some(mode) = &record.mode {
                if node.set_mode(mode).is_err() {
                    debug!(node = %record.id, mode = %mode, "Unknown mode, keeping default");
                }
            }
            for p in &record.parameters {
                match node.parameter_mut(&p.name) {
                    Some(slot) => {
                        slot.set_value(p.string_value.clone());
                    }
                    None => node.push_parameter(Parameter::new(&p.name, p.ty, &p.string_value)),
                }
            }
            graph.add_node(node);
        }

        for c in &file.connections {
            let source = NodeId::from_str(&c.source_node_id);
            let target = NodeId::from_str(&c.target_node_id);
            if let Err(e) = graph.connect(&source, c.source_socket, &target, c.target_socket) {
                debug!(source = %source, target = %target, error = %e, "Dropped connection");
            }
        }

        // Parameter providers first; sensors and actions may rely on them.
        for record in &file.nodes {
            let id = NodeId::from_str(&record.id);
            for p in &record.parameters {
                if let Some(provider) = &p.attached_provider_id {
                    let provider = NodeId::from_str(provider);
                    if let Err(e) = graph.attach_parameter(&id, &p.name, &provider) {
                        debug!(node = %id, param = %p.name, error = %e, "Dropped parameter attachment");
                    }
                }
            }
        }

        for record in &file.nodes {
            let id = NodeId::from_str(&record.id);
            let link = match (&record.attached_sensor_id, &record.parent_control_id) {
                (Some(sensor), _) => Some((id.clone(), NodeId::from_str(sensor))),
                (None, Some(parent)) => Some((NodeId::from_str(parent), id.clone())),
                (None, None) => None,
            };
            if let Some((control, sensor)) = link {
                if graph.node(&control).and_then(|n| n.sensor()) == Some(&sensor) {
                    continue;
                }
                if let Err(e) = graph.attach_sensor(&control, &sensor) {
                    debug!(control = %control, sensor = %sensor, error = %e, "Dropped sensor attachment");
                }
            }
        }

        // Parent lists carry the order; child back-references fill gaps.
        for record in &file.nodes {
            let control = NodeId::from_str(&record.id);
            for action in &record.attached_action_ids {
                attach_action_logged(&mut graph, &control, &NodeId::from_str(action));
            }
        }
        for record in &file.nodes {
            if let Some(parent) = &record.parent_action_control_id {
                let action = NodeId::from_str(&record.id);
                if graph.parent_action_control(&action).is_none() {
                    attach_action_logged(&mut graph, &NodeId::from_str(parent), &action);
                }
            }
        }

        graph
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_file())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: GraphFile = serde_json::from_str(json)?;
        Ok(Self::from_file(&file))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

fn attach_action_logged(graph: &mut Graph, control: &NodeId, action: &NodeId) {
    if graph.parent_action_control(action) == Some(control) {
        return;
    }
    if let Err(e) = graph.attach_action(control, action) {
        debug!(control = %control, action = %action, error = %e, "Dropped action attachment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Value;

    #[test]
    fn test_unknown_ids_dropped() {
        let json = r#"{
            "nodes": [
                {"id": "s", "kind": "start"},
                {"id": "c", "kind": "control",
                 "attachedSensorId": "ghost",
                 "attachedActionIds": ["missing"]},
                {"id": "g", "kind": "goto", "mode": "y",
                 "parameters": [{"name": "y", "stringValue": "80", "type": "integer",
                                 "attachedProviderId": "nowhere"}]}
            ],
            "connections": [
                {"sourceNodeId": "s", "targetNodeId": "c"},
                {"sourceNodeId": "c", "targetNodeId": "void"}
            ]
        }"#;
        let graph = Graph::from_json(json).unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.connections().len(), 1);
        let control = graph.node(&NodeId::from_str("c")).unwrap();
        assert!(control.sensor().is_none());
        assert!(control.actions().is_empty());
        let y = graph.node(&NodeId::from_str("g")).unwrap().parameter("y").unwrap();
        assert!(!y.is_attached());
        assert_eq!(y.literal(), Value::Int(80));
    }

    #[test]
    fn test_invalid_mode_falls_back() {
        let json = r#"{"nodes": [{"id": "f", "kind": "follow", "mode": "everyone"}]}"#;
        let graph = Graph::from_json(json).unwrap();
        let node = graph.node(&NodeId::from_str("f")).unwrap();
        assert_eq!(node.mode(), Some("player"));
    }

    #[test]
    fn test_connections_to_attached_nodes_excluded() {
        let mut graph = Graph::new();
        let start = graph.add_node(CommandNode::new(NodeKind::Start));
        let control = graph.add_node(CommandNode::new(NodeKind::Control));
        let end = graph.add_node(CommandNode::new(NodeKind::End));
        let mine = graph.add_node(CommandNode::new(NodeKind::Mine));
        graph.connect(&start, 0, &control, 0).unwrap();
        graph.connect(&control, 0, &end, 0).unwrap();
        graph.attach_action(&control, &mine).unwrap();

        let file = graph.to_file();
        assert_eq!(file.connections.len(), 2);
        assert!(file
            .connections
            .iter()
            .all(|c| c.source_node_id != mine.to_string() && c.target_node_id != mine.to_string()));
    }

    #[test]
    fn test_action_order_from_child_back_references() {
        let json = r#"{
            "nodes": [
                {"id": "c", "kind": "control"},
                {"id": "a1", "kind": "mine", "parentActionControlId": "c"},
                {"id": "a2", "kind": "farm", "parentActionControlId": "c"}
            ]
        }"#;
        let graph = Graph::from_json(json).unwrap();
        let control = graph.node(&NodeId::from_str("c")).unwrap();
        assert_eq!(
            control.actions(),
            &[NodeId::from_str("a1"), NodeId::from_str("a2")]
        );
    }

    #[test]
    fn test_extra_parameter_kept() {
        let json = r#"{"nodes": [{"id": "m", "kind": "mine",
            "parameters": [{"name": "note", "stringValue": "left tunnel", "type": "string"}]}]}"#;
        let graph = Graph::from_json(json).unwrap();
        let node = graph.node(&NodeId::from_str("m")).unwrap();
        assert_eq!(node.parameter("note").unwrap().raw(), "left tunnel");
        assert_eq!(node.parameter("block").unwrap().raw(), "stone");
    }

    #[test]
    fn test_save_load_file() {
        let mut graph = Graph::new();
        let start = graph.add_node(CommandNode::new(NodeKind::Start).at(10.0, 20.0));
        let end = graph.add_node(CommandNode::new(NodeKind::End));
        graph.connect(&start, 0, &end, 0).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.json");
        graph.save(&path).unwrap();
        let loaded = Graph::load(&path).unwrap();

        assert_eq!(loaded.next_node(&start), Some(&end));
        assert_eq!(loaded.node(&start).unwrap().position, Position { x: 10.0, y: 20.0 });
    }
}
