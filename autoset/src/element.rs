use crate::errors::AutomationError;
use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::instrument;

/// A synthetic DOM event dispatched at a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomEvent {
    pub kind: String,
    pub bubbles: bool,
    pub cancelable: bool,
}

impl DomEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            bubbles: true,
            cancelable: false,
        }
    }

    pub fn input() -> Self {
        Self::new("input")
    }

    pub fn change() -> Self {
        Self::new("change")
    }

    pub fn blur() -> Self {
        Self::new("blur")
    }
}

/// Serializable view of an element, used for diagnostics and trace output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSummary {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    pub attached: bool,
}

impl From<&Element> for ElementSummary {
    fn from(element: &Element) -> Self {
        let mut text = element.text_content();
        if text.len() > 60 {
            let cut = (0..=60)
                .rev()
                .find(|i| text.is_char_boundary(*i))
                .unwrap_or(0);
            text.truncate(cut);
        }
        Self {
            tag: element.tag(),
            id: element.attribute("id"),
            class: element.attribute("class"),
            aria_label: element.attribute("aria-label"),
            text,
            attached: element.is_attached(),
        }
    }
}

/// Interface for backend-specific element implementations
pub trait ElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    fn tag(&self) -> String;
    fn attribute(&self, name: &str) -> Option<String>;
    fn set_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError>;
    fn remove_attribute(&self, name: &str) -> Result<(), AutomationError>;
    fn text_content(&self) -> String;
    fn children(&self) -> Result<Vec<Element>, AutomationError>;
    fn parent(&self) -> Result<Option<Element>, AutomationError>;
    /// Whether the node is still connected to the live document.
    fn is_attached(&self) -> bool;
    /// Effective visibility: the node and all of its ancestors are rendered.
    fn is_visible(&self) -> Result<bool, AutomationError>;

    fn is_enabled(&self) -> Result<bool, AutomationError> {
        if self.attribute("disabled").is_some() {
            return Ok(false);
        }
        Ok(!matches!(
            self.attribute("aria-disabled").as_deref(),
            Some("true")
        ))
    }

    /// Current value of the live `value` property.
    fn value(&self) -> Result<String, AutomationError>;
    /// Instance-level assignment. Frameworks that intercept the setter may
    /// swallow or overwrite it.
    fn set_value(&self, value: &str) -> Result<(), AutomationError>;
    /// Assignment through the prototype-level accessor, the path the owning
    /// framework's reactivity observes.
    fn set_value_via_prototype(&self, value: &str) -> Result<(), AutomationError>;
    fn dispatch_event(&self, event: &DomEvent) -> Result<(), AutomationError>;
    /// mousedown, focus, mouseup, click
    fn click(&self) -> Result<(), AutomationError>;
    fn focus(&self) -> Result<(), AutomationError>;
    fn blur(&self) -> Result<(), AutomationError>;
    fn clone_box(&self) -> Box<dyn ElementImpl>;
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Represents a live node of the host page
#[derive(Debug)]
pub struct Element {
    inner: Box<dyn ElementImpl>,
}

impl Element {
    /// Create a new element from a backend-specific implementation
    pub fn new(impl_: Box<dyn ElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn tag(&self) -> String {
        self.inner.tag()
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attribute(name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), AutomationError> {
        self.inner.set_attribute(name, value)
    }

    pub fn remove_attribute(&self, name: &str) -> Result<(), AutomationError> {
        self.inner.remove_attribute(name)
    }

    /// Whitespace-separated entries of the `class` attribute
    pub fn class_list(&self) -> Vec<String> {
        self.attribute("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_list().iter().any(|c| c == class)
    }

    pub fn text_content(&self) -> String {
        self.inner.text_content()
    }

    pub fn children(&self) -> Result<Vec<Element>, AutomationError> {
        self.inner.children()
    }

    pub fn parent(&self) -> Result<Option<Element>, AutomationError> {
        self.inner.parent()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_attached()
    }

    pub fn is_visible(&self) -> Result<bool, AutomationError> {
        self.inner.is_visible()
    }

    #[instrument(level = "trace", skip(self))]
    pub fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.inner.is_enabled()
    }

    pub fn value(&self) -> Result<String, AutomationError> {
        self.inner.value()
    }

    pub fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        self.inner.set_value(value)
    }

    pub fn set_value_via_prototype(&self, value: &str) -> Result<(), AutomationError> {
        self.inner.set_value_via_prototype(value)
    }

    pub fn dispatch_event(&self, event: &DomEvent) -> Result<(), AutomationError> {
        self.inner.dispatch_event(event)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn click(&self) -> Result<(), AutomationError> {
        self.inner.click()
    }

    pub fn focus(&self) -> Result<(), AutomationError> {
        self.inner.focus()
    }

    pub fn blur(&self) -> Result<(), AutomationError> {
        self.inner.blur()
    }

    pub(crate) fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }

    /// Read an ARIA boolean state attribute such as `aria-checked`.
    pub fn aria_state(&self, attribute: &str) -> Option<bool> {
        match self.attribute(attribute)?.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    /// All descendants matching `selector`, in document order. The element
    /// itself is never part of the result.
    pub fn query_all(&self, selector: &Selector) -> Result<Vec<Element>, AutomationError> {
        if let Selector::Invalid(reason) = selector {
            return Err(AutomationError::InvalidSelector(reason.clone()));
        }
        let mut found = Vec::new();
        let mut stack: Vec<Element> = self.children()?.into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            if selector.matches(&node)? {
                found.push(node.clone());
            }
            stack.extend(node.children()?.into_iter().rev());
        }
        Ok(found)
    }

    /// First descendant matching `selector`.
    pub fn query(&self, selector: &Selector) -> Result<Option<Element>, AutomationError> {
        Ok(self.query_all(selector)?.into_iter().next())
    }

    /// Walk up the tree, yielding at most `max_levels` ancestors, nearest first.
    pub fn ancestors(&self, max_levels: usize) -> Result<Vec<Element>, AutomationError> {
        let mut out = Vec::new();
        let mut cursor = self.parent()?;
        while let Some(node) = cursor {
            if out.len() >= max_levels {
                break;
            }
            cursor = node.parent()?;
            out.push(node);
        }
        Ok(out)
    }

    pub fn summary(&self) -> ElementSummary {
        ElementSummary::from(self)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl Eq for Element {}

impl std::hash::Hash for Element {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.object_id().hash(state);
    }
}

impl Clone for Element {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}
