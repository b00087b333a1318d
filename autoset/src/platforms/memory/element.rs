use super::engine::{MemoryEngine, NodeId};
use crate::element::{DomEvent, ElementImpl};
use crate::{AutomationError, Element};
use tracing::trace;

/// A handle to one node of a [`MemoryEngine`] document.
#[derive(Clone)]
pub struct MemoryElement {
    engine: MemoryEngine,
    node: NodeId,
}

impl std::fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryElement")
            .field("node", &self.node.index())
            .field("tag", &self.engine.lock().tag(self.node))
            .finish()
    }
}

impl MemoryElement {
    pub(crate) fn new(engine: MemoryEngine, node: NodeId) -> Self {
        Self { engine, node }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    fn wrap(&self, node: NodeId) -> Element {
        self.engine.element(node)
    }
}

impl ElementImpl for MemoryElement {
    fn object_id(&self) -> usize {
        self.node.index()
    }

    fn tag(&self) -> String {
        self.engine.lock().tag(self.node)
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.engine.lock().attribute(self.node, name)
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError> {
        self.engine
            .mutate(|state| state.set_attribute(self.node, name, value))
    }

    fn remove_attribute(&self, name: &str) -> Result<(), AutomationError> {
        self.engine
            .mutate(|state| state.remove_attribute(self.node, name))
    }

    fn text_content(&self) -> String {
        self.engine.lock().text_content(self.node)
    }

    fn children(&self) -> Result<Vec<Element>, AutomationError> {
        let ids = self.engine.lock().element_children(self.node);
        Ok(ids.into_iter().map(|id| self.wrap(id)).collect())
    }

    fn parent(&self) -> Result<Option<Element>, AutomationError> {
        let parent = self.engine.lock().parent_element(self.node);
        Ok(parent.map(|id| self.wrap(id)))
    }

    fn is_attached(&self) -> bool {
        self.engine.lock().is_attached(self.node)
    }

    fn is_visible(&self) -> Result<bool, AutomationError> {
        Ok(self.engine.lock().is_visible(self.node))
    }

    fn value(&self) -> Result<String, AutomationError> {
        self.engine.lock().value(self.node)
    }

    fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        self.engine
            .mutate(|state| state.set_value_instance(self.node, value))
    }

    fn set_value_via_prototype(&self, value: &str) -> Result<(), AutomationError> {
        self.engine
            .mutate(|state| state.set_value_prototype(self.node, value))
    }

    fn dispatch_event(&self, event: &DomEvent) -> Result<(), AutomationError> {
        trace!(node = self.node.index(), kind = %event.kind, "dispatch");
        self.engine
            .mutate(|state| state.dispatch(self.node, &event.kind, event.bubbles))
    }

    fn click(&self) -> Result<(), AutomationError> {
        self.engine.click_node(self.node)
    }

    fn focus(&self) -> Result<(), AutomationError> {
        self.engine.mutate(|state| state.focus(self.node))
    }

    fn blur(&self) -> Result<(), AutomationError> {
        self.engine.mutate(|state| state.blur(self.node))
    }

    fn clone_box(&self) -> Box<dyn ElementImpl> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
