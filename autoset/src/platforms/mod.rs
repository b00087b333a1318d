use crate::{AutomationError, Element, Selector};
use std::sync::Arc;
use tokio::sync::Notify;

/// The common trait that every host-page backend must implement
pub trait DomEngine: Send + Sync {
    /// The document node. Queries from it cover the whole page.
    fn document(&self) -> Element;

    /// Identity of the page currently loaded (its URL, including the
    /// in-app route of a single-page app).
    fn page_url(&self) -> String;

    /// A signal notified on every mutation of the document, when the backend
    /// can observe mutations. Waiters must still bound themselves with a
    /// timeout: the signal may never fire.
    fn mutation_signal(&self) -> Option<Arc<Notify>> {
        None
    }

    /// Whether writes forwarded to the host have not landed yet. Backends
    /// that apply writes asynchronously report `true` until the document
    /// reflects them.
    fn has_pending_writes(&self) -> bool {
        false
    }

    /// Find all elements matching a selector, under `root` or the document
    fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&Element>,
    ) -> Result<Vec<Element>, AutomationError> {
        match root {
            Some(root) => root.query_all(selector),
            None => self.document().query_all(selector),
        }
    }

    /// Find the first element matching a selector
    fn find_element(
        &self,
        selector: &Selector,
        root: Option<&Element>,
    ) -> Result<Option<Element>, AutomationError> {
        Ok(self.find_elements(selector, root)?.into_iter().next())
    }

    /// Enable downcasting to concrete engine types
    fn as_any(&self) -> &dyn std::any::Any;
}

pub mod bridge;
pub mod memory;
