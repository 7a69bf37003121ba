//! Read-time parameter resolution.
//!
//! An attached parameter's value is computed on every read by walking the
//! provider chain; nothing is cached, so live providers (player position,
//! proximity sensors) are always current. Any miss along the chain falls back
//! to the parameter's own literal.

use tracing::debug;

use waymark_core::backend::WorldView;
use waymark_core::command::{Command, FollowTarget, Goal};
use waymark_core::types::WorldPos;

use crate::graph::Graph;
use crate::kind::NodeKind;
use crate::node::CommandNode;
use crate::parameter::{Parameter, Value};

/// Longest provider chain followed before giving up.
const MAX_DEPTH: usize = 16;

/// Resolves parameter values against a graph and, optionally, a live world.
///
/// Read-only: safe to use from any context holding a read view of the graph.
pub struct Resolver<'a> {
    graph: &'a Graph,
    world: Option<&'a dyn WorldView>,
}

impl<'a> Resolver<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self { graph, world: None }
    }

    pub fn with_world(mut self, world: &'a dyn WorldView) -> Self {
        self.world = Some(world);
        self
    }

    /// Effective value of `param`, before any representation is requested.
    pub fn resolve(&self, param: &Parameter) -> Value {
        self.resolve_at(param, 0)
    }

    pub fn resolve_string(&self, param: &Parameter) -> String {
        self.resolve(param).to_text()
    }

    pub fn resolve_int(&self, param: &Parameter) -> i64 {
        self.int_at(param, 0)
    }

    pub fn resolve_double(&self, param: &Parameter) -> f64 {
        self.double_at(param, 0)
    }

    pub fn resolve_bool(&self, param: &Parameter) -> bool {
        self.bool_at(param, 0)
    }

    fn resolve_at(&self, param: &Parameter, depth: usize) -> Value {
        let Some(provider_id) = param.attached() else {
            return param.literal();
        };
        if depth >= MAX_DEPTH {
            debug!(param = param.name(), "Provider chain too deep, using literal");
            return param.literal();
        }
        let Some(provider) = self.graph.node(provider_id) else {
            debug!(param = param.name(), provider = %provider_id, "Provider missing, using literal");
            return param.literal();
        };
        match self.provide(provider, param.name(), depth + 1) {
            Some(value) => value,
            None => {
                debug!(
                    param = param.name(),
                    provider = %provider_id,
                    kind = ?provider.kind(),
                    "Provider lacks field, using literal"
                );
                param.literal()
            }
        }
    }

    fn int_at(&self, param: &Parameter, depth: usize) -> i64 {
        self.resolve_at(param, depth)
            .as_int()
            .or_else(|| param.literal().as_int())
            .unwrap_or_default()
    }

    fn double_at(&self, param: &Parameter, depth: usize) -> f64 {
        self.resolve_at(param, depth)
            .as_double()
            .or_else(|| param.literal().as_double())
            .unwrap_or_default()
    }

    fn bool_at(&self, param: &Parameter, depth: usize) -> bool {
        self.resolve_at(param, depth)
            .as_bool()
            .or_else(|| param.literal().as_bool())
            .unwrap_or_default()
    }

    /// Look up the sub-field a provider exposes for a parameter named `field`.
    fn provide(&self, provider: &CommandNode, field: &str, depth: usize) -> Option<Value> {
        let sub = |name: &str| provider.parameter(name);

        match provider.kind() {
            NodeKind::Coordinates => {
                let axis = axis_name(field)?;
                sub(axis).map(|p| self.resolve_at(p, depth))
            }
            NodeKind::PlayerPosition => {
                let axis = axis_name(field)?;
                if let Some(pos) = self.world.and_then(|w| w.player_position()) {
                    return Some(Value::Double(axis_of(&pos, axis)));
                }
                sub(axis).map(|p| self.resolve_at(p, depth))
            }
            NodeKind::NumberValue | NodeKind::TextValue | NodeKind::BooleanValue => {
                sub("value").map(|p| self.resolve_at(p, depth))
            }
            NodeKind::Not => sub("input").map(|p| Value::Bool(!self.bool_at(p, depth))),
            NodeKind::ProximitySensor => {
                let player = self.world.and_then(|w| w.player_position())?;
                let at = |name: &str| sub(name).map(|p| self.double_at(p, depth));
                let center = WorldPos::new(at("x")?, at("y")?, at("z")?);
                let range = at("range")?;
                Some(Value::Bool(player.distance_to(&center) <= range))
            }
            _ => None,
        }
    }

    /// Evaluate a sensor node's boolean output. Nodes that are not sensors,
    /// or sensors that cannot observe the world, read as false.
    pub fn evaluate_sensor(&self, sensor: &CommandNode) -> bool {
        let Some(field) = sensor.kind().sensor_field() else {
            return false;
        };
        self.provide(sensor, field, 0)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn int(&self, node: &CommandNode, name: &str) -> i64 {
        node.parameter(name)
            .map(|p| self.resolve_int(p))
            .unwrap_or_default()
    }

    fn text(&self, node: &CommandNode, name: &str) -> String {
        node.parameter(name)
            .map(|p| self.resolve_string(p))
            .unwrap_or_default()
    }

    fn double(&self, node: &CommandNode, name: &str) -> f64 {
        node.parameter(name)
            .map(|p| self.resolve_double(p))
            .unwrap_or_default()
    }

    fn goal(&self, node: &CommandNode) -> Goal {
        match node.mode() {
            Some("xz") => Goal::Xz {
                x: self.int(node, "x"),
                z: self.int(node, "z"),
            },
            Some("y") => Goal::Y {
                y: self.int(node, "y"),
            },
            _ => Goal::Xyz {
                x: self.int(node, "x"),
                y: self.int(node, "y"),
                z: self.int(node, "z"),
            },
        }
    }

    /// Build the backend command for `node` from its resolved parameters.
    /// Returns `None` for kinds that issue no backend command.
    pub fn build_command(&self, node: &CommandNode) -> Option<Command> {
        let command = match node.kind() {
            NodeKind::Goto => match node.mode() {
                Some("block") => Command::GotoBlock {
                    block: self.text(node, "block"),
                },
                _ => match self.goal(node) {
                    Goal::Xyz { x, y, z } => Command::GotoXyz { x, y, z },
                    Goal::Xz { x, z } => Command::GotoXz { x, z },
                    Goal::Y { y } => Command::GotoY { y },
                },
            },
            NodeKind::Mine => Command::Mine {
                block: self.text(node, "block"),
                quantity: self.int(node, "quantity"),
            },
            NodeKind::Build => Command::Build {
                schematic: self.text(node, "schematic"),
                x: self.int(node, "x"),
                y: self.int(node, "y"),
                z: self.int(node, "z"),
            },
            NodeKind::Explore => Command::Explore {
                x: self.int(node, "x"),
                z: self.int(node, "z"),
            },
            NodeKind::Farm => Command::Farm {
                range: self.int(node, "range"),
            },
            NodeKind::Path => Command::Path,
            NodeKind::SetGoal => Command::SetGoal {
                goal: self.goal(node),
            },
            NodeKind::Follow => Command::Follow {
                target: match node.mode() {
                    Some("players") => FollowTarget::Players,
                    Some("entities") => FollowTarget::Entities,
                    _ => FollowTarget::Player(self.text(node, "target")),
                },
            },
            NodeKind::Stop => Command::Stop,
            NodeKind::Message => Command::Message {
                text: self.text(node, "text"),
            },
            NodeKind::Wait => Command::Wait {
                millis: (self.double(node, "seconds").max(0.0) * 1000.0) as u64,
            },
            _ => return None,
        };
        Some(command)
    }
}

fn axis_name(field: &str) -> Option<&'static str> {
    match field {
        "x" => Some("x"),
        "y" => Some("y"),
        "z" => Some("z"),
        _ => None,
    }
}

fn axis_of(pos: &WorldPos, axis: &str) -> f64 {
    match axis {
        "x" => pos.x,
        "y" => pos.y,
        _ => pos.z,
    }
}
