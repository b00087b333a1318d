//! Backend for a real browser tab.
//!
//! A page script (a browser extension or userscript) connects to
//! [`BridgeEngine`] over a local WebSocket. It assigns every element a
//! numeric id, sends serialized document snapshots whenever the document
//! changes, and applies the [`protocol::Command`]s it receives to the live
//! nodes, acknowledging each one once its effect has been reported.

mod element;
mod engine;
pub mod protocol;

pub use element::BridgeElement;
pub use engine::{BridgeEngine, DEFAULT_BRIDGE_ADDR};
