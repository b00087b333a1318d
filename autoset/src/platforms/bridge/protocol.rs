//! Messages exchanged with the page script over the bridge socket.

use crate::element::DomEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier the page script assigns to a node, stable for the node's
/// lifetime. `0` is reserved for the document.
pub type NodeRef = u64;

/// A serialized element subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub nid: NodeRef,
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Concatenated text of the node's own text children.
    #[serde(default)]
    pub text: String,
    /// The live `value` property, for form controls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// `false` when computed style keeps the node from rendering.
    #[serde(default = "rendered_by_default")]
    pub rendered: bool,
    #[serde(default)]
    pub children: Vec<NodeSnapshot>,
}

fn rendered_by_default() -> bool {
    true
}

/// A mutation the page script performs on the live document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Command {
    SetValue { node: NodeRef, value: String },
    SetValueViaPrototype { node: NodeRef, value: String },
    Dispatch { node: NodeRef, event: DomEvent },
    /// mousedown, focus, mouseup, click
    Click { node: NodeRef },
    Focus { node: NodeRef },
    Blur { node: NodeRef },
    SetAttribute { node: NodeRef, name: String, value: String },
    RemoveAttribute { node: NodeRef, name: String },
    /// Serialize the document again.
    Snapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommandEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: &'a str,
    #[serde(flatten)]
    command: &'a Command,
}

impl<'a> CommandEnvelope<'a> {
    pub(crate) fn new(id: &'a str, command: &'a Command) -> Self {
        Self {
            kind: "command",
            id,
            command,
        }
    }
}

/// Everything the page script sends.
///
/// A command is acknowledged only after its effect is visible: when the
/// document changed, the matching snapshot is sent before the ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    Hello {
        #[serde(default)]
        from: Option<String>,
    },
    Snapshot {
        url: String,
        root: NodeSnapshot,
    },
    Ack {
        id: String,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_are_flat_objects_tagged_by_op() {
        let command = Command::SetValueViaPrototype {
            node: 7,
            value: "0.7".into(),
        };
        let wire = serde_json::to_value(CommandEnvelope::new("c1", &command)).unwrap();
        assert_eq!(
            wire,
            json!({"type": "command", "id": "c1", "op": "setValueViaPrototype", "node": 7, "value": "0.7"})
        );

        let wire = serde_json::to_value(CommandEnvelope::new("c2", &Command::Snapshot)).unwrap();
        assert_eq!(wire, json!({"type": "command", "id": "c2", "op": "snapshot"}));
    }

    #[test]
    fn sparse_snapshots_fill_in_defaults() {
        let message: HostMessage = serde_json::from_value(json!({
            "type": "snapshot",
            "url": "https://aistudio.google.com/prompts/new_chat",
            "root": {"nid": 1, "tag": "body", "children": [
                {"nid": 2, "tag": "input", "attrs": {"type": "number"}, "value": "1"},
                {"nid": 3, "tag": "div", "rendered": false}
            ]}
        }))
        .unwrap();

        let root = match message {
            HostMessage::Snapshot { root, .. } => root,
            other => panic!("expected a snapshot, got {other:?}"),
        };
        assert_eq!(root.children[0].value.as_deref(), Some("1"));
        assert!(root.children[0].rendered);
        assert!(root.children[0].children.is_empty());
        assert!(!root.children[1].rendered);
    }

    #[test]
    fn failed_acks_carry_the_page_error() {
        let message: HostMessage =
            serde_json::from_str(r#"{"type":"ack","id":"c9","ok":false,"error":"node 4 is gone"}"#)
                .unwrap();
        assert_eq!(
            message,
            HostMessage::Ack {
                id: "c9".into(),
                ok: false,
                error: Some("node 4 is gone".into()),
            }
        );
    }
}
