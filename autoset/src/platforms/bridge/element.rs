use super::engine::{BridgeEngine, DOCUMENT};
use super::protocol::{Command, NodeRef};
use crate::element::{DomEvent, ElementImpl};
use crate::{AutomationError, Element};

/// A handle to one node of the mirrored page.
#[derive(Clone)]
pub struct BridgeElement {
    engine: BridgeEngine,
    node: NodeRef,
}

impl std::fmt::Debug for BridgeElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeElement")
            .field("node", &self.node)
            .field("tag", &self.tag())
            .finish()
    }
}

impl BridgeElement {
    pub(super) fn new(engine: BridgeEngine, node: NodeRef) -> Self {
        Self { engine, node }
    }

    pub fn node(&self) -> NodeRef {
        self.node
    }

    /// Forward a mutation of this node, refusing nodes the page no longer has.
    fn command(&self, command: Command) -> Result<(), AutomationError> {
        if !self.is_attached() {
            return Err(AutomationError::ElementDetached(format!("node {}", self.node)));
        }
        self.engine.send(command)
    }
}

impl ElementImpl for BridgeElement {
    fn object_id(&self) -> usize {
        self.node as usize
    }

    fn tag(&self) -> String {
        self.engine
            .mirror()
            .nodes
            .get(&self.node)
            .map(|n| n.tag.clone())
            .unwrap_or_default()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.engine.mirror().nodes.get(&self.node)?.attrs.get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError> {
        self.command(Command::SetAttribute {
            node: self.node,
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    fn remove_attribute(&self, name: &str) -> Result<(), AutomationError> {
        self.command(Command::RemoveAttribute {
            node: self.node,
            name: name.to_string(),
        })
    }

    fn text_content(&self) -> String {
        self.engine.mirror().text_content(self.node)
    }

    fn children(&self) -> Result<Vec<Element>, AutomationError> {
        let ids = self
            .engine
            .mirror()
            .nodes
            .get(&self.node)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        Ok(ids.into_iter().map(|id| self.engine.element(id)).collect())
    }

    fn parent(&self) -> Result<Option<Element>, AutomationError> {
        let parent = self
            .engine
            .mirror()
            .nodes
            .get(&self.node)
            .and_then(|n| n.parent)
            .filter(|p| *p != DOCUMENT);
        Ok(parent.map(|id| self.engine.element(id)))
    }

    fn is_attached(&self) -> bool {
        self.engine.mirror().contains(self.node)
    }

    fn is_visible(&self) -> Result<bool, AutomationError> {
        Ok(self.engine.mirror().is_visible(self.node))
    }

    fn value(&self) -> Result<String, AutomationError> {
        let mirror = self.engine.mirror();
        match mirror.nodes.get(&self.node) {
            Some(node) => Ok(node.value.clone().unwrap_or_default()),
            None => Err(AutomationError::ElementDetached(format!("node {}", self.node))),
        }
    }

    fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        self.command(Command::SetValue {
            node: self.node,
            value: value.to_string(),
        })
    }

    fn set_value_via_prototype(&self, value: &str) -> Result<(), AutomationError> {
        self.command(Command::SetValueViaPrototype {
            node: self.node,
            value: value.to_string(),
        })
    }

    fn dispatch_event(&self, event: &DomEvent) -> Result<(), AutomationError> {
        self.command(Command::Dispatch {
            node: self.node,
            event: event.clone(),
        })
    }

    fn click(&self) -> Result<(), AutomationError> {
        self.command(Command::Click { node: self.node })
    }

    fn focus(&self) -> Result<(), AutomationError> {
        self.command(Command::Focus { node: self.node })
    }

    fn blur(&self) -> Result<(), AutomationError> {
        self.command(Command::Blur { node: self.node })
    }

    fn clone_box(&self) -> Box<dyn ElementImpl> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
