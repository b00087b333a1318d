use super::element::MemoryElement;
use crate::platforms::DomEngine;
use crate::utils::{format_number, parse_number};
use crate::{AutomationError, Element};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Index of a node in a [`MemoryEngine`] document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Host reaction to a click on an element.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickBehavior {
    /// Flip a `"true"`/`"false"` ARIA state attribute (switches).
    ToggleAria { attribute: String },
    /// Mount an overlay with one option per entry, a backdrop and a panel
    /// (popup-driven select widgets).
    OpenOptions {
        options: Vec<String>,
        selected_text: NodeId,
    },
    /// Pick an option: rewrite the select's displayed text and unmount the overlay.
    ChooseOption {
        overlay: NodeId,
        selected_text: NodeId,
        text: String,
    },
    /// Unmount an overlay (backdrop clicks).
    Dismiss { overlay: NodeId },
    /// Toggle the `hidden` attribute of another node (collapsible panels).
    ToggleHidden { target: NodeId },
}

/// Everything the agent did to the document, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DomAction {
    InstanceWrite { node: NodeId, value: String },
    PrototypeWrite { node: NodeId, value: String },
    Event { node: NodeId, kind: String, bubbles: bool },
    Click { node: NodeId },
    Focus { node: NodeId },
    Blur { node: NodeId },
    AttributeSet { node: NodeId, name: String, value: String },
    AttributeRemoved { node: NodeId, name: String },
}

impl DomAction {
    pub fn node(&self) -> NodeId {
        match self {
            DomAction::InstanceWrite { node, .. }
            | DomAction::PrototypeWrite { node, .. }
            | DomAction::Event { node, .. }
            | DomAction::Click { node }
            | DomAction::Focus { node }
            | DomAction::Blur { node }
            | DomAction::AttributeSet { node, .. }
            | DomAction::AttributeRemoved { node, .. } => *node,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            DomAction::InstanceWrite { .. } | DomAction::PrototypeWrite { .. }
        )
    }
}

/// Declarative description of an element to insert.
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    value: Option<String>,
    bound: bool,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((name.to_string(), value.to_string()));
        self
    }

    pub fn class(self, class: &str) -> Self {
        self.attr("class", class)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    /// Initial `value` property.
    pub fn value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// Bind the control to a framework model: instance-level writes are
    /// swallowed, `input`/`change` commit the property into the model and
    /// `blur` re-renders the property from the model.
    pub fn bound(mut self) -> Self {
        self.bound = true;
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone)]
struct Binding {
    model: String,
    rejects_writes: bool,
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: BTreeMap<String, String>,
    value: String,
    binding: Option<Binding>,
    on_click: Option<ClickBehavior>,
    click_delay: Option<Duration>,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Debug)]
pub(crate) struct DomState {
    nodes: Vec<Node>,
    root: NodeId,
    body: NodeId,
    url: String,
    focused: Option<NodeId>,
    actions: Vec<DomAction>,
}

impl DomState {
    fn new(url: &str) -> Self {
        let mut state = Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Document,
            }],
            root: NodeId(0),
            body: NodeId(0),
            url: url.to_string(),
            focused: None,
            actions: Vec::new(),
        };
        let root = state.root;
        state.body = state.insert(root, ElementSpec::new("body"));
        state
    }

    fn create_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    fn insert(&mut self, parent: NodeId, spec: ElementSpec) -> NodeId {
        let attrs: BTreeMap<String, String> = spec.attrs.into_iter().collect();
        let value = spec
            .value
            .or_else(|| attrs.get("value").cloned())
            .unwrap_or_default();
        let binding = spec.bound.then(|| Binding {
            model: value.clone(),
            rejects_writes: false,
        });
        let id = self.create_node(
            Some(parent),
            NodeKind::Element(ElementData {
                tag: spec.tag,
                attrs,
                value,
                binding,
                on_click: None,
                click_delay: None,
            }),
        );
        if let Some(text) = spec.text {
            self.create_node(Some(id), NodeKind::Text(text));
        }
        for child in spec.children {
            self.insert(id, child);
        }
        id
    }

    fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(id.0)?.kind {
            NodeKind::Element(data) => Some(data),
            _ => None,
        }
    }

    fn element_or_err(&self, id: NodeId) -> Result<&ElementData, AutomationError> {
        self.element(id)
            .ok_or_else(|| AutomationError::Internal(format!("node {} is not an element", id.0)))
    }

    fn live_element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, AutomationError> {
        if !self.is_attached(id) {
            return Err(AutomationError::ElementDetached(format!("node {}", id.0)));
        }
        self.element_mut(id)
            .ok_or_else(|| AutomationError::Internal(format!("node {} is not an element", id.0)))
    }

    pub(crate) fn is_document(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id.0).map(|n| &n.kind),
            Some(NodeKind::Document)
        )
    }

    pub(crate) fn tag(&self, id: NodeId) -> String {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Element(data)) => data.tag.clone(),
            Some(NodeKind::Document) => "#document".to_string(),
            Some(NodeKind::Text(_)) => "#text".to_string(),
            None => String::new(),
        }
    }

    pub(crate) fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.element(id)?.attrs.get(name).cloned()
    }

    pub(crate) fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), AutomationError> {
        let data = self.live_element_mut(id)?;
        data.attrs.insert(name.to_string(), value.to_string());
        self.actions.push(DomAction::AttributeSet {
            node: id,
            name: name.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    pub(crate) fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), AutomationError> {
        let data = self.live_element_mut(id)?;
        if data.attrs.remove(name).is_some() {
            self.actions.push(DomAction::AttributeRemoved {
                node: id,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn text_content(&self, id: NodeId) -> String {
        let Some(node) = self.nodes.get(id.0) else {
            return String::new();
        };
        match &node.kind {
            NodeKind::Text(text) => text.clone(),
            _ => node
                .children
                .iter()
                .map(|child| self.text_content(*child))
                .collect(),
        }
    }

    fn set_text(&mut self, id: NodeId, text: &str) {
        let old = std::mem::take(&mut self.nodes[id.0].children);
        for child in old {
            self.nodes[child.0].parent = None;
        }
        self.create_node(Some(id), NodeKind::Text(text.to_string()));
    }

    /// Element children only; text nodes are not exposed as elements.
    pub(crate) fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(id.0)
            .map(|n| {
                n.children
                    .iter()
                    .copied()
                    .filter(|c| self.element(*c).is_some())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `parentElement` semantics: the document is never returned.
    pub(crate) fn parent_element(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get(id.0)?.parent?;
        self.element(parent).map(|_| parent)
    }

    pub(crate) fn is_attached(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = self.nodes.get(current.0).and_then(|n| n.parent);
        }
        false
    }

    fn hides_subtree(data: &ElementData) -> bool {
        if data.attrs.contains_key("hidden") {
            return true;
        }
        data.attrs
            .get("style")
            .map(|s| s.replace(' ', "").contains("display:none"))
            .unwrap_or(false)
    }

    pub(crate) fn is_visible(&self, id: NodeId) -> bool {
        if !self.is_attached(id) {
            return false;
        }
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(data) = self.element(current) {
                if Self::hides_subtree(data) {
                    return false;
                }
            }
            cursor = self.nodes.get(current.0).and_then(|n| n.parent);
        }
        true
    }

    pub(crate) fn value(&self, id: NodeId) -> Result<String, AutomationError> {
        if self.is_document(id) {
            return Ok(String::new());
        }
        Ok(self.element_or_err(id)?.value.clone())
    }

    pub(crate) fn set_value_instance(&mut self, id: NodeId, value: &str) -> Result<(), AutomationError> {
        let data = self.live_element_mut(id)?;
        // frameworks that intercept the instance setter swallow this write
        if data.binding.is_none() {
            data.value = value.to_string();
        }
        self.actions.push(DomAction::InstanceWrite {
            node: id,
            value: value.to_string(),
        });
        Ok(())
    }

    pub(crate) fn set_value_prototype(&mut self, id: NodeId, value: &str) -> Result<(), AutomationError> {
        let data = self.live_element_mut(id)?;
        data.value = value.to_string();
        self.actions.push(DomAction::PrototypeWrite {
            node: id,
            value: value.to_string(),
        });
        Ok(())
    }

    /// The value the framework accepts for a raw property value: numeric
    /// controls clamp to `min`/`max`, garbage keeps the previous model.
    fn sanitize(data: &ElementData, raw: &str, previous: &str) -> String {
        let numeric = data.tag == "input"
            && matches!(
                data.attrs.get("type").map(String::as_str),
                Some("number") | Some("range")
            );
        if !numeric {
            return raw.to_string();
        }
        let Some(mut parsed) = parse_number(raw) else {
            return previous.to_string();
        };
        if let Some(min) = data.attrs.get("min").and_then(|m| parse_number(m)) {
            parsed = parsed.max(min);
        }
        if let Some(max) = data.attrs.get("max").and_then(|m| parse_number(m)) {
            parsed = parsed.min(max);
        }
        format_number(parsed)
    }

    fn commit(data: &mut ElementData) {
        let Some(binding) = data.binding.as_ref() else {
            return;
        };
        let next = if binding.rejects_writes {
            binding.model.clone()
        } else {
            Self::sanitize(data, &data.value, &binding.model)
        };
        data.value = next.clone();
        if let Some(binding) = data.binding.as_mut() {
            binding.model = next;
        }
    }

    fn rerender(data: &mut ElementData) {
        if let Some(binding) = data.binding.as_ref() {
            data.value = binding.model.clone();
        }
    }

    pub(crate) fn dispatch(
        &mut self,
        id: NodeId,
        kind: &str,
        bubbles: bool,
    ) -> Result<(), AutomationError> {
        let data = self.live_element_mut(id)?;
        match kind {
            "input" | "change" => Self::commit(data),
            "blur" => Self::rerender(data),
            _ => {}
        }
        self.actions.push(DomAction::Event {
            node: id,
            kind: kind.to_string(),
            bubbles,
        });
        Ok(())
    }

    pub(crate) fn focus(&mut self, id: NodeId) -> Result<(), AutomationError> {
        self.live_element_mut(id)?;
        self.focused = Some(id);
        self.actions.push(DomAction::Focus { node: id });
        Ok(())
    }

    pub(crate) fn blur(&mut self, id: NodeId) -> Result<(), AutomationError> {
        let data = self.live_element_mut(id)?;
        Self::rerender(data);
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.actions.push(DomAction::Blur { node: id });
        Ok(())
    }

    /// Record the click and return the host reaction, if the element is
    /// enabled and has one.
    pub(crate) fn click(
        &mut self,
        id: NodeId,
    ) -> Result<Option<(ClickBehavior, Option<Duration>)>, AutomationError> {
        let data = self.live_element_mut(id)?;
        let disabled = data.attrs.contains_key("disabled")
            || data.attrs.get("aria-disabled").map(String::as_str) == Some("true");
        let reaction = if disabled {
            None
        } else {
            data.on_click.clone().map(|b| (b, data.click_delay))
        };
        self.focused = Some(id);
        self.actions.push(DomAction::Click { node: id });
        Ok(reaction)
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes.get(id.0).and_then(|n| n.parent) {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.parent = None;
        }
    }

    fn apply(&mut self, origin: NodeId, behavior: ClickBehavior) {
        match behavior {
            ClickBehavior::ToggleAria { attribute } => {
                if let Some(data) = self.element_mut(origin) {
                    let on = data.attrs.get(&attribute).map(String::as_str) == Some("true");
                    data.attrs
                        .insert(attribute, if on { "false" } else { "true" }.to_string());
                }
            }
            ClickBehavior::OpenOptions {
                options,
                selected_text,
            } => {
                let body = self.body;
                let overlay = self.insert(body, ElementSpec::new("div").class("cdk-overlay-container"));
                let backdrop = self.insert(overlay, ElementSpec::new("div").class("cdk-overlay-backdrop"));
                if let Some(data) = self.element_mut(backdrop) {
                    data.on_click = Some(ClickBehavior::Dismiss { overlay });
                }
                let panel = self.insert(
                    overlay,
                    ElementSpec::new("div")
                        .class("mat-mdc-select-panel")
                        .attr("role", "listbox"),
                );
                for text in options {
                    let option = self.insert(
                        panel,
                        ElementSpec::new("mat-option").attr("role", "option").child(
                            ElementSpec::new("span")
                                .class("mdc-list-item__primary-text")
                                .text(&text),
                        ),
                    );
                    if let Some(data) = self.element_mut(option) {
                        data.on_click = Some(ClickBehavior::ChooseOption {
                            overlay,
                            selected_text,
                            text,
                        });
                    }
                }
                debug!(overlay = overlay.0, "Mounted option overlay");
            }
            ClickBehavior::ChooseOption {
                overlay,
                selected_text,
                text,
            } => {
                if self.contains(selected_text) {
                    self.set_text(selected_text, &text);
                }
                self.detach(overlay);
            }
            ClickBehavior::Dismiss { overlay } => self.detach(overlay),
            ClickBehavior::ToggleHidden { target } => {
                if let Some(data) = self.element_mut(target) {
                    if data.attrs.remove("hidden").is_none() {
                        data.attrs.insert("hidden".to_string(), String::new());
                    }
                }
            }
        }
    }
}

/// An in-memory, reactive stand-in for a host page.
///
/// The document simulates what a front-end framework does to form
/// controls and records every write, event and click the agent performs so
/// tests can assert on the exact interaction sequence.
#[derive(Clone)]
pub struct MemoryEngine {
    state: Arc<Mutex<DomState>>,
    notify: Arc<Notify>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryEngine")
            .field("url", &state.url)
            .field("nodes", &state.nodes.len())
            .field("actions", &state.actions.len())
            .finish()
    }
}

impl MemoryEngine {
    pub fn new(url: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(DomState::new(url))),
            notify: Arc::new(Notify::new()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a mutation and wake every mutation waiter.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut DomState) -> R) -> R {
        let result = {
            let mut state = self.lock();
            f(&mut state)
        };
        self.notify.notify_waiters();
        result
    }

    pub fn root(&self) -> NodeId {
        self.lock().root
    }

    pub fn body(&self) -> NodeId {
        self.lock().body
    }

    /// Insert `spec` (and its children) as the last child of `parent`.
    pub fn append(&self, parent: NodeId, spec: ElementSpec) -> NodeId {
        self.mutate(|state| state.insert(parent, spec))
    }

    pub fn set_click_behavior(&self, node: NodeId, behavior: ClickBehavior) {
        self.mutate(|state| {
            if let Some(data) = state.element_mut(node) {
                data.on_click = Some(behavior);
            }
        })
    }

    /// Defer the click reaction of `node`; requires a tokio runtime, without
    /// one the reaction is applied immediately.
    pub fn set_click_delay(&self, node: NodeId, delay: Duration) {
        self.mutate(|state| {
            if let Some(data) = state.element_mut(node) {
                data.click_delay = Some(delay);
            }
        })
    }

    /// Make a bound control discard every committed value.
    pub fn set_rejects_writes(&self, node: NodeId, rejects: bool) {
        self.mutate(|state| {
            if let Some(binding) = state.element_mut(node).and_then(|d| d.binding.as_mut()) {
                binding.rejects_writes = rejects;
            }
        })
    }

    /// Host-side change of a control's value (user edit or re-render).
    pub fn set_host_value(&self, node: NodeId, value: &str) {
        self.mutate(|state| {
            if let Some(data) = state.element_mut(node) {
                data.value = value.to_string();
                if let Some(binding) = data.binding.as_mut() {
                    binding.model = value.to_string();
                }
            }
        })
    }

    /// Host-side attribute change; not recorded as an agent action.
    pub fn set_host_attribute(&self, node: NodeId, name: &str, value: Option<&str>) {
        self.mutate(|state| {
            if let Some(data) = state.element_mut(node) {
                match value {
                    Some(v) => {
                        data.attrs.insert(name.to_string(), v.to_string());
                    }
                    None => {
                        data.attrs.remove(name);
                    }
                }
            }
        })
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        self.mutate(|state| {
            if state.contains(node) {
                state.set_text(node, text);
            }
        })
    }

    /// Remove a subtree from the document; handles into it go stale.
    pub fn detach(&self, node: NodeId) {
        self.mutate(|state| state.detach(node))
    }

    /// Change page identity, as an in-app route change would.
    pub fn navigate(&self, url: &str) {
        self.mutate(|state| state.url = url.to_string())
    }

    pub fn element(&self, node: NodeId) -> Element {
        Element::new(Box::new(MemoryElement::new(self.clone(), node)))
    }

    /// Recover the node behind an element created by this backend.
    pub fn node_id(element: &Element) -> Option<NodeId> {
        element
            .as_any()
            .downcast_ref::<MemoryElement>()
            .map(|e| e.node())
    }

    pub fn value_of(&self, node: NodeId) -> String {
        self.lock().value(node).unwrap_or_default()
    }

    pub fn attribute_of(&self, node: NodeId, name: &str) -> Option<String> {
        self.lock().attribute(node, name)
    }

    pub fn text_of(&self, node: NodeId) -> String {
        self.lock().text_content(node)
    }

    pub fn is_node_visible(&self, node: NodeId) -> bool {
        self.lock().is_visible(node)
    }

    pub fn is_node_attached(&self, node: NodeId) -> bool {
        self.lock().is_attached(node)
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.lock().focused
    }

    pub fn actions(&self) -> Vec<DomAction> {
        self.lock().actions.clone()
    }

    pub fn actions_for(&self, node: NodeId) -> Vec<DomAction> {
        self.lock()
            .actions
            .iter()
            .filter(|a| a.node() == node)
            .cloned()
            .collect()
    }

    pub fn clear_actions(&self) {
        self.lock().actions.clear();
    }

    /// Number of value writes (either path) issued anywhere in the document.
    pub fn write_count(&self) -> usize {
        self.lock().actions.iter().filter(|a| a.is_write()).count()
    }

    pub fn click_count(&self, node: NodeId) -> usize {
        self.lock()
            .actions
            .iter()
            .filter(|a| matches!(a, DomAction::Click { node: n } if *n == node))
            .count()
    }

    pub(crate) fn click_node(&self, node: NodeId) -> Result<(), AutomationError> {
        let reaction = self.mutate(|state| state.click(node))?;
        let Some((behavior, delay)) = reaction else {
            return Ok(());
        };
        trace!(node = node.0, ?behavior, "Applying click reaction");
        match (delay, tokio::runtime::Handle::try_current()) {
            (Some(delay), Ok(handle)) => {
                let engine = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    engine.mutate(|state| state.apply(node, behavior));
                });
            }
            _ => self.mutate(|state| state.apply(node, behavior)),
        }
        Ok(())
    }
}

impl DomEngine for MemoryEngine {
    fn document(&self) -> Element {
        self.element(self.root())
    }

    fn page_url(&self) -> String {
        self.lock().url.clone()
    }

    fn mutation_signal(&self) -> Option<Arc<Notify>> {
        Some(self.notify.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
