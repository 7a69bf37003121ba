//! Command graph model.
//!
//! A graph is a set of [`CommandNode`]s joined by [`Connection`]s that fix
//! linear execution order. On top of that sit attachments: parameters sourced
//! from provider nodes, sensors gating control nodes, and nested action lists.
//! Attachments are id lookups into the graph, never owning references.

pub mod edge;
pub mod graph;
pub mod kind;
pub mod node;
pub mod parameter;
pub mod persist;
pub mod resolver;

pub use edge::Connection;
pub use graph::{Graph, SharedGraph};
pub use kind::NodeKind;
pub use node::{CommandNode, Position};
pub use parameter::{ParamType, Parameter, Value};
pub use persist::GraphFile;
pub use resolver::Resolver;
