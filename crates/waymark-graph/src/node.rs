use serde::{Deserialize, Serialize};

use waymark_core::error::{Result, WaymarkError};
use waymark_core::types::NodeId;

use crate::kind::NodeKind;
use crate::parameter::Parameter;

/// Canvas position, persisted for the editor only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// A typed unit of work in the graph.
///
/// Sensor and action relations hold ids into the owning [`crate::Graph`];
/// they are only changed through the graph so deletion can sweep them.
#[derive(Debug, Clone)]
pub struct CommandNode {
    id: NodeId,
    kind: NodeKind,
    mode: Option<String>,
    pub position: Position,
    parameters: Vec<Parameter>,
    pub(crate) sensor: Option<NodeId>,
    pub(crate) actions: Vec<NodeId>,
}

impl CommandNode {
    /// Create a node with a fresh id, default mode, and default parameters.
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        let mode = kind.default_mode().map(str::to_string);
        let parameters = kind.default_parameters(mode.as_deref());
        Self {
            id,
            kind,
            mode,
            position: Position::default(),
            parameters,
            sensor: None,
            actions: vec![],
        }
    }

    /// Builder form of [`CommandNode::set_mode`].
    pub fn with_mode(mut self, mode: &str) -> Result<Self> {
        self.set_mode(mode)?;
        Ok(self)
    }

    /// Builder form of [`CommandNode::set_param`]. Unknown names are ignored.
    pub fn with_param(mut self, name: &str, raw: impl Into<String>) -> Self {
        self.set_param(name, raw);
        self
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    /// Switch mode and reseed parameters, keeping the raw values of
    /// parameters that exist under both modes.
    pub fn set_mode(&mut self, mode: &str) -> Result<()> {
        if !self.kind.modes().contains(&mode) {
            return Err(WaymarkError::Config(format!(
                "mode '{}' is not valid for {}",
                mode,
                self.kind.label()
            )));
        }
        let mut fresh = self.kind.default_parameters(Some(mode));
        for param in &mut fresh {
            if let Some(old) = self.parameter(param.name()) {
                if old.ty() == param.ty() {
                    *param = old.clone();
                }
            }
        }
        self.mode = Some(mode.to_string());
        self.parameters = fresh;
        Ok(())
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    pub(crate) fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name() == name)
    }

    pub(crate) fn parameters_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.parameters.iter_mut()
    }

    pub(crate) fn push_parameter(&mut self, param: Parameter) {
        self.parameters.push(param);
    }

    /// Set a parameter's raw text. Returns false when the name is unknown
    /// or the text does not parse as the declared type.
    pub fn set_param(&mut self, name: &str, raw: impl Into<String>) -> bool {
        match self.parameter_mut(name) {
            Some(param) => param.set_value(raw),
            None => false,
        }
    }

    pub fn sensor(&self) -> Option<&NodeId> {
        self.sensor.as_ref()
    }

    pub fn actions(&self) -> &[NodeId] {
        &self.actions
    }
}
