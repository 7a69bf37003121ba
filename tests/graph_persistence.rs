use waymark_core::types::NodeId;
use waymark_graph::{CommandNode, Graph, NodeKind};

fn id(s: &str) -> NodeId {
    NodeId::from_str(s)
}

fn assert_control_relations(graph: &Graph) {
    let control = graph.node(&id("c")).expect("control");
    assert_eq!(control.sensor(), Some(&id("sensor")));
    assert_eq!(control.actions(), &[id("a1"), id("a2")]);
    assert_eq!(graph.parent_control(&id("sensor")), Some(&id("c")));
    assert_eq!(graph.parent_action_control(&id("a1")), Some(&id("c")));
    assert_eq!(graph.parent_action_control(&id("a2")), Some(&id("c")));
}

const NODES_HEAD: &str = r#"
    {"id": "s", "kind": "start"},
    {"id": "e", "kind": "end"}
"#;

const CONNECTIONS: &str = r#"
    {"sourceNodeId": "s", "targetNodeId": "c"},
    {"sourceNodeId": "c", "targetNodeId": "e"}
"#;

fn file(nodes: &str) -> String {
    format!(r#"{{"nodes": [{NODES_HEAD}, {nodes}], "connections": [{CONNECTIONS}]}}"#)
}

#[test]
fn test_relations_from_parent_fields_only() {
    let json = file(
        r#"
        {"id": "c", "kind": "control", "attachedSensorId": "sensor",
         "attachedActionIds": ["a1", "a2"]},
        {"id": "sensor", "kind": "boolean_value"},
        {"id": "a1", "kind": "mine"},
        {"id": "a2", "kind": "farm"}
    "#,
    );
    assert_control_relations(&Graph::from_json(&json).expect("parse"));
}

#[test]
fn test_relations_from_child_fields_only() {
    let json = file(
        r#"
        {"id": "c", "kind": "control"},
        {"id": "sensor", "kind": "boolean_value", "parentControlId": "c"},
        {"id": "a1", "kind": "mine", "parentActionControlId": "c"},
        {"id": "a2", "kind": "farm", "parentActionControlId": "c"}
    "#,
    );
    assert_control_relations(&Graph::from_json(&json).expect("parse"));
}

#[test]
fn test_relations_from_both_fields() {
    let json = file(
        r#"
        {"id": "c", "kind": "control", "attachedSensorId": "sensor",
         "attachedActionIds": ["a1", "a2"]},
        {"id": "sensor", "kind": "boolean_value", "parentControlId": "c"},
        {"id": "a1", "kind": "mine", "parentActionControlId": "c"},
        {"id": "a2", "kind": "farm", "parentActionControlId": "c"}
    "#,
    );
    let graph = Graph::from_json(&json).expect("parse");
    assert_control_relations(&graph);
    assert_eq!(
        graph.execution_order().expect("order"),
        vec![id("s"), id("c"), id("e")]
    );
}

#[test]
fn test_save_and_load_round_trip() {
    let mut graph = Graph::new();
    let start = graph.add_node(CommandNode::new(NodeKind::Start));
    let goto = graph.add_node(
        CommandNode::new(NodeKind::Goto)
            .with_mode("xz")
            .expect("mode")
            .with_param("x", "12"),
    );
    let control = graph.add_node(CommandNode::new(NodeKind::Control));
    let end = graph.add_node(CommandNode::new(NodeKind::End));
    let coords = graph.add_node(CommandNode::new(NodeKind::Coordinates).with_param("z", "-7.5"));
    let sensor = graph.add_node(CommandNode::new(NodeKind::BooleanValue).with_param("value", "true"));
    let action = graph.add_node(CommandNode::new(NodeKind::Message).with_param("text", "hi"));
    graph.connect(&start, 0, &goto, 0).expect("connect");
    graph.connect(&goto, 0, &control, 0).expect("connect");
    graph.connect(&control, 0, &end, 0).expect("connect");
    graph.attach_parameter(&goto, "z", &coords).expect("attach param");
    graph.attach_sensor(&control, &sensor).expect("attach sensor");
    graph.attach_action(&control, &action).expect("attach action");

    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("graph.json");
    graph.save(&path).expect("save");
    let loaded = Graph::load(&path).expect("load");

    assert_eq!(loaded.len(), graph.len());
    assert_eq!(
        loaded.execution_order().expect("order"),
        vec![start, goto.clone(), control.clone(), end]
    );
    let reloaded_goto = loaded.node(&goto).expect("goto");
    assert_eq!(reloaded_goto.mode(), Some("xz"));
    assert_eq!(reloaded_goto.parameter("x").expect("x").raw(), "12");
    assert_eq!(
        reloaded_goto.parameter("z").expect("z").attached(),
        Some(&coords)
    );
    assert_eq!(loaded.node(&control).expect("control").sensor(), Some(&sensor));
    assert_eq!(loaded.node(&control).expect("control").actions(), &[action]);
}

#[test]
fn test_delete_splices_and_persists() {
    let mut graph = Graph::new();
    let a = graph.add_node(CommandNode::new(NodeKind::Start));
    let b = graph.add_node(CommandNode::new(NodeKind::Mine));
    let c = graph.add_node(CommandNode::new(NodeKind::End));
    graph.connect(&a, 0, &b, 0).expect("connect");
    graph.connect(&b, 0, &c, 0).expect("connect");

    graph.remove_node(&b).expect("remove");
    assert_eq!(graph.next_node(&a), Some(&c));

    let file = graph.to_file();
    assert_eq!(file.connections.len(), 1);
    assert_eq!(file.connections[0].source_node_id, a.to_string());
    assert_eq!(file.connections[0].target_node_id, c.to_string());
}
