use serde::{Deserialize, Serialize};

use crate::parameter::{ParamType, Parameter};

/// The closed catalog of node kinds.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    // Tracked commands
    Goto,
    Mine,
    Build,
    Explore,
    Farm,
    Path,
    // Immediate commands
    SetGoal,
    Follow,
    Stop,
    Message,
    Wait,
    // Control
    Control,
    // Value providers
    Coordinates,
    PlayerPosition,
    NumberValue,
    TextValue,
    BooleanValue,
    ProximitySensor,
    Not,
}

const COORD_MODES: &[&str] = &["xyz", "xz", "y"];
const GOTO_MODES: &[&str] = &["xyz", "xz", "y", "block"];
const FOLLOW_MODES: &[&str] = &["player", "players", "entities"];
const CONTROL_MODES: &[&str] = &["if", "while"];
const XYZ: &[&str] = &["x", "y", "z"];

impl NodeKind {
    pub const ALL: [NodeKind; 21] = [
        NodeKind::Start,
        NodeKind::End,
        NodeKind::Goto,
        NodeKind::Mine,
        NodeKind::Build,
        NodeKind::Explore,
        NodeKind::Farm,
        NodeKind::Path,
        NodeKind::SetGoal,
        NodeKind::Follow,
        NodeKind::Stop,
        NodeKind::Message,
        NodeKind::Wait,
        NodeKind::Control,
        NodeKind::Coordinates,
        NodeKind::PlayerPosition,
        NodeKind::NumberValue,
        NodeKind::TextValue,
        NodeKind::BooleanValue,
        NodeKind::ProximitySensor,
        NodeKind::Not,
    ];

    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::End => "End",
            NodeKind::Goto => "Goto",
            NodeKind::Mine => "Mine",
            NodeKind::Build => "Build",
            NodeKind::Explore => "Explore",
            NodeKind::Farm => "Farm",
            NodeKind::Path => "Path",
            NodeKind::SetGoal => "Set Goal",
            NodeKind::Follow => "Follow",
            NodeKind::Stop => "Stop",
            NodeKind::Message => "Message",
            NodeKind::Wait => "Wait",
            NodeKind::Control => "Control",
            NodeKind::Coordinates => "Coordinates",
            NodeKind::PlayerPosition => "Player Position",
            NodeKind::NumberValue => "Number",
            NodeKind::TextValue => "Text",
            NodeKind::BooleanValue => "Boolean",
            NodeKind::ProximitySensor => "Proximity Sensor",
            NodeKind::Not => "Not",
        }
    }

    /// Valid modes for this kind; empty when the kind has no modes.
    pub fn modes(self) -> &'static [&'static str] {
        match self {
            NodeKind::Goto => GOTO_MODES,
            NodeKind::SetGoal => COORD_MODES,
            NodeKind::Follow => FOLLOW_MODES,
            NodeKind::Control => CONTROL_MODES,
            _ => &[],
        }
    }

    pub fn default_mode(self) -> Option<&'static str> {
        self.modes().first().copied()
    }

    /// Pure value sources. They only appear through attachments.
    pub fn is_provider(self) -> bool {
        matches!(
            self,
            NodeKind::Coordinates
                | NodeKind::PlayerPosition
                | NodeKind::NumberValue
                | NodeKind::TextValue
                | NodeKind::BooleanValue
                | NodeKind::ProximitySensor
                | NodeKind::Not
        )
    }

    /// Providers that expose a boolean and can gate a control node.
    pub fn is_sensor(self) -> bool {
        matches!(
            self,
            NodeKind::BooleanValue | NodeKind::ProximitySensor | NodeKind::Not
        )
    }

    /// Kinds that accept a sensor and nested actions.
    pub fn is_control(self) -> bool {
        matches!(self, NodeKind::Control)
    }

    /// Kinds that may run as a nested action of a control node.
    pub fn is_command(self) -> bool {
        !self.is_provider() && !matches!(self, NodeKind::Start | NodeKind::End)
    }

    /// The sub-parameter that carries a sensor's boolean output.
    pub fn sensor_field(self) -> Option<&'static str> {
        match self {
            NodeKind::BooleanValue | NodeKind::Not => Some("value"),
            NodeKind::ProximitySensor => Some("active"),
            _ => None,
        }
    }

    /// Fields a provider exposes to attached parameters.
    pub fn provided_fields(self) -> &'static [&'static str] {
        match self {
            NodeKind::Coordinates | NodeKind::PlayerPosition => XYZ,
            NodeKind::NumberValue
            | NodeKind::TextValue
            | NodeKind::BooleanValue
            | NodeKind::Not => &["value"],
            NodeKind::ProximitySensor => &["active"],
            _ => &[],
        }
    }

    pub fn input_sockets(self) -> usize {
        if self == NodeKind::Start || self.is_provider() {
            0
        } else {
            1
        }
    }

    pub fn output_sockets(self) -> usize {
        if self == NodeKind::End || self.is_provider() {
            0
        } else {
            1
        }
    }

    /// Parameters a freshly created node of this kind and mode starts with.
    pub fn default_parameters(self, mode: Option<&str>) -> Vec<Parameter> {
        use ParamType::*;
        let p = |name: &str, ty: ParamType, raw: &str| Parameter::new(name, ty, raw);

        match self {
            NodeKind::Goto | NodeKind::SetGoal => match mode.unwrap_or("xyz") {
                "xz" => vec![p("x", Integer, "0"), p("z", Integer, "0")],
                "y" => vec![p("y", Integer, "64")],
                "block" => vec![p("block", String, "diamond_ore")],
                _ => vec![
                    p("x", Integer, "0"),
                    p("y", Integer, "64"),
                    p("z", Integer, "0"),
                ],
            },
            NodeKind::Mine => vec![p("block", String, "stone"), p("quantity", Integer, "0")],
            NodeKind::Build => vec![
                p("schematic", String, "house.schematic"),
                p("x", Integer, "0"),
                p("y", Integer, "64"),
                p("z", Integer, "0"),
            ],
            NodeKind::Explore => vec![p("x", Integer, "0"), p("z", Integer, "0")],
            NodeKind::Farm => vec![p("range", Integer, "32")],
            NodeKind::Follow => match mode.unwrap_or("player") {
                "player" => vec![p("target", String, "")],
                _ => vec![],
            },
            NodeKind::Message => vec![p("text", String, "")],
            NodeKind::Wait => vec![p("seconds", Double, "1.0")],
            NodeKind::Control => match mode.unwrap_or("if") {
                "while" => vec![p("max_iterations", Integer, "100")],
                _ => vec![],
            },
            NodeKind::Coordinates | NodeKind::PlayerPosition => vec![
                p("x", Double, "0"),
                p("y", Double, "64"),
                p("z", Double, "0"),
            ],
            NodeKind::NumberValue => vec![p("value", Double, "0")],
            NodeKind::TextValue => vec![p("value", String, "")],
            NodeKind::BooleanValue => vec![p("value", Boolean, "false")],
            NodeKind::ProximitySensor => vec![
                p("x", Double, "0"),
                p("y", Double, "64"),
                p("z", Double, "0"),
                p("range", Double, "5"),
            ],
            NodeKind::Not => vec![p("input", Boolean, "false")],
            NodeKind::Start | NodeKind::End | NodeKind::Path | NodeKind::Stop => vec![],
        }
    }
}
