use super::element::BridgeElement;
use super::protocol::{Command, CommandEnvelope, HostMessage, NodeRef, NodeSnapshot};
use crate::platforms::DomEngine;
use crate::{AutomationError, Element};
use futures_util::{SinkExt, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_BRIDGE_ADDR: &str = "127.0.0.1:17373";

pub(super) const DOCUMENT: NodeRef = 0;

#[derive(Debug, Clone)]
pub(super) struct MirrorNode {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub value: Option<String>,
    pub rendered: bool,
    pub parent: Option<NodeRef>,
    pub children: Vec<NodeRef>,
}

/// The last document state the page reported.
#[derive(Debug, Default)]
pub(super) struct Mirror {
    pub url: String,
    pub nodes: HashMap<NodeRef, MirrorNode>,
    pub version: u64,
}

impl Mirror {
    fn replace(&mut self, url: String, root: NodeSnapshot) {
        self.nodes.clear();
        self.nodes.insert(
            DOCUMENT,
            MirrorNode {
                tag: "#document".to_string(),
                attrs: BTreeMap::new(),
                text: String::new(),
                value: None,
                rendered: true,
                parent: None,
                children: vec![root.nid],
            },
        );
        let mut stack = vec![(root, DOCUMENT)];
        while let Some((node, parent)) = stack.pop() {
            if node.nid == DOCUMENT {
                warn!("Snapshot node uses the reserved id 0, skipping its subtree");
                continue;
            }
            let children = node.children.iter().map(|c| c.nid).collect();
            for child in node.children.into_iter().rev() {
                stack.push((child, node.nid));
            }
            self.nodes.insert(
                node.nid,
                MirrorNode {
                    tag: node.tag.to_ascii_lowercase(),
                    attrs: node.attrs,
                    text: node.text,
                    value: node.value,
                    rendered: node.rendered,
                    parent: Some(parent),
                    children,
                },
            );
        }
        self.url = url;
        self.version += 1;
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn text_content(&self, node: NodeRef) -> String {
        let Some(data) = self.nodes.get(&node) else {
            return String::new();
        };
        let mut text = data.text.clone();
        for child in &data.children {
            text.push_str(&self.text_content(*child));
        }
        text
    }

    pub fn is_visible(&self, node: NodeRef) -> bool {
        let mut cursor = Some(node);
        let mut seen = false;
        while let Some(current) = cursor {
            let Some(data) = self.nodes.get(&current) else {
                return false;
            };
            if !data.rendered || hides_subtree(&data.attrs) {
                return false;
            }
            seen = true;
            cursor = data.parent;
        }
        seen
    }
}

fn hides_subtree(attrs: &BTreeMap<String, String>) -> bool {
    attrs.contains_key("hidden")
        || attrs
            .get("style")
            .is_some_and(|s| s.replace(' ', "").contains("display:none"))
}

#[derive(Default)]
struct Link {
    next_client: u64,
    /// Connected page scripts, most recent last. Commands go to the last one.
    clients: Vec<(u64, mpsc::UnboundedSender<Message>)>,
    /// Commands sent and not yet acknowledged.
    pending: HashSet<String>,
}

#[derive(Default)]
struct Shared {
    mirror: Mutex<Mirror>,
    link: Mutex<Link>,
    signal: Arc<Notify>,
}

impl Shared {
    fn mirror(&self) -> MutexGuard<'_, Mirror> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, message: HostMessage) {
        match message {
            HostMessage::Hello { from } => {
                info!(from = from.as_deref().unwrap_or("unknown"), "Page script connected");
            }
            HostMessage::Snapshot { url, root } => {
                let mut mirror = self.mirror();
                mirror.replace(url, root);
                debug!(
                    version = mirror.version,
                    nodes = mirror.nodes.len(),
                    "Snapshot applied"
                );
            }
            HostMessage::Ack { id, ok, error } => {
                if !ok {
                    warn!(
                        %id,
                        error = error.as_deref().unwrap_or("unknown error"),
                        "Command failed in the page"
                    );
                }
                self.link().pending.remove(&id);
            }
            HostMessage::Pong => return,
        }
        self.signal.notify_waiters();
    }

    fn register(&self, sender: mpsc::UnboundedSender<Message>) -> u64 {
        let mut link = self.link();
        link.next_client += 1;
        let id = link.next_client;
        link.clients.push((id, sender));
        drop(link);
        self.signal.notify_waiters();
        id
    }

    fn unregister(&self, client: u64) {
        let mut link = self.link();
        link.clients.retain(|(id, _)| *id != client);
        if link.clients.is_empty() && !link.pending.is_empty() {
            warn!(
                pending = link.pending.len(),
                "Last page script disconnected with unacknowledged commands"
            );
            link.pending.clear();
        }
        drop(link);
        self.signal.notify_waiters();
    }
}

/// A live browser tab, mirrored through a page script connected over a
/// local WebSocket.
///
/// Reads are served from the latest snapshot the page sent. Writes are
/// forwarded as commands and stay pending until the page acknowledges them,
/// which it does only after sending the snapshot that reflects their effect.
#[derive(Clone)]
pub struct BridgeEngine {
    shared: Arc<Shared>,
    addr: SocketAddr,
    server: Arc<JoinHandle<()>>,
}

impl BridgeEngine {
    /// Bind the bridge socket and start accepting page scripts.
    #[instrument(level = "info")]
    pub async fn start(addr: &str) -> Result<Self, AutomationError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(%local, "Extension bridge listening");

        let shared = Arc::new(Shared::default());
        let server = tokio::spawn(accept_loop(listener, shared.clone()));
        Ok(Self {
            shared,
            addr: local,
            server: Arc::new(server),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.link().clients.is_empty()
    }

    /// Wait until the page has sent at least one snapshot, asking for one
    /// once a page script is connected.
    pub async fn ready(&self, timeout: Duration) -> Result<(), AutomationError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut requested = false;
        loop {
            let changed = self.shared.signal.notified();
            if self.shared.mirror().version > 0 {
                return Ok(());
            }
            if !requested && self.is_connected() {
                self.send(Command::Snapshot)?;
                requested = true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return Err(AutomationError::Internal(format!(
                    "no snapshot from the page within {timeout:?}"
                )));
            }
        }
    }

    /// Stop accepting page scripts and drop the open connections.
    pub fn shutdown(&self) {
        self.server.abort();
        let mut link = self.shared.link();
        link.clients.clear();
        link.pending.clear();
    }

    pub fn element(&self, node: NodeRef) -> Element {
        Element::new(Box::new(BridgeElement::new(self.clone(), node)))
    }

    pub(super) fn mirror(&self) -> MutexGuard<'_, Mirror> {
        self.shared.mirror()
    }

    /// Forward `command` to the most recently connected page script.
    pub(super) fn send(&self, command: Command) -> Result<(), AutomationError> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&CommandEnvelope::new(&id, &command))?;
        let mut link = self.shared.link();
        let Some((_, client)) = link.clients.last() else {
            return Err(AutomationError::Internal(
                "no page script connected to the bridge".to_string(),
            ));
        };
        if client.send(Message::Text(payload)).is_err() {
            return Err(AutomationError::Internal(
                "page script connection closed".to_string(),
            ));
        }
        debug!(%id, ?command, "Command sent");
        link.pending.insert(id);
        Ok(())
    }
}

impl DomEngine for BridgeEngine {
    fn document(&self) -> Element {
        self.element(DOCUMENT)
    }

    fn page_url(&self) -> String {
        self.mirror().url.clone()
    }

    fn mutation_signal(&self) -> Option<Arc<Notify>> {
        Some(self.shared.signal.clone())
    }

    fn has_pending_writes(&self) -> bool {
        !self.shared.link().pending.is_empty()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Bridge accept failed");
                continue;
            }
        };
        let shared = shared.clone();
        tokio::spawn(async move {
            let socket = match accept_async(stream).await {
                Ok(socket) => socket,
                Err(e) => {
                    warn!(%peer, error = %e, "Bridge handshake failed");
                    return;
                }
            };
            serve(socket, &shared).await;
            info!(%peer, "Page script disconnected");
        });
    }
}

async fn serve(socket: WebSocketStream<TcpStream>, shared: &Shared) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                warn!(error = %e, "Bridge send failed");
                break;
            }
        }
    });
    let client = shared.register(tx);

    while let Some(Ok(message)) = stream.next().await {
        if !message.is_text() {
            continue;
        }
        let Ok(text) = message.into_text() else {
            continue;
        };
        match serde_json::from_str::<HostMessage>(&text) {
            Ok(message) => shared.apply(message),
            Err(e) => warn!(error = %e, "Invalid message from the page script"),
        }
    }

    shared.unregister(client);
    writer.abort();
}
