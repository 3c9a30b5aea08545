//! An in-process stand-in for the browser's extension messaging host.
//!
//! A [`MemoryHost`] plays the part of the browser: it knows every context of
//! one extension (plus any external peers), routes one-shot sends between
//! them the way the WebExtension runtime does, and reports the same failure
//! texts a real browser would. Each context gets its own [`MemoryTransport`],
//! which is what a [`crate::Courier`] is built on.
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), courier::CourierError> {
//! use courier::{Channel, Courier, memory::MemoryHost};
//! use std::sync::Arc;
//!
//! let host = MemoryHost::new();
//! let background = Courier::new(Arc::new(host.background()));
//! let popup = Courier::new(Arc::new(host.page(1)));
//!
//! let greet: Channel<String, String> = background.channel("greet");
//! let _registration = greet.on_message_sync(|name: String, _| {
//!     Ok::<_, String>(format!("hello {name}"))
//! });
//!
//! let greet: Channel<String, String> = popup.channel("greet");
//! assert_eq!(greet.send("popup".into()).await?, Some("hello popup".into()));
//! # Ok(())
//! # }
//! ```
//!
//! Routing follows the browser:
//!
//! - broadcast sends reach the background and extension pages, never the
//!   sending context itself and never content scripts,
//! - process sends reach the content scripts of that process,
//! - peer sends reach the external peer with that id, or this extension's
//!   background and pages when addressed to [`EXTENSION_ID`].

use courier_common::SharedCell;
use serde_json::Value;
use std::sync::Arc;

use crate::{
    Destination, Envelope, Listener, ListenerId, OnReply, OnScope, ProcessId, Respond, ScopeId,
    ScopeLookup, SenderMetadata, Transport,
};

/// The id of the extension the host simulates
pub const EXTENSION_ID: &str = "courier-memory-extension";

/// Reported when nothing listens at the destination
pub const NO_RECEIVER: &str = "Could not establish connection. Receiving end does not exist.";

/// Reported when every receiver let the reply channel go without replying
pub const PORT_CLOSED: &str = "The message port closed before a response was received.";

/// Reported for sends from an invalidated context
pub const CONTEXT_INVALIDATED: &str = "Extension context invalidated.";

/// The kind of an execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    /// The extension's background worker
    Background,
    /// An extension page such as a popup, side panel or devtools panel
    Page,
    /// A content script injected into a process
    ContentScript {
        /// The process the script runs in
        process_id: ProcessId,
    },
    /// A context belonging to another extension or an external page
    ExternalPeer {
        /// The peer's id
        peer_id: String,
    },
}

impl ContextKind {
    fn is_extension_page(&self) -> bool {
        matches!(self, ContextKind::Background | ContextKind::Page)
    }
}

struct ContextRecord {
    kind: ContextKind,
    scope: Option<ScopeId>,
    invalidated: bool,
    closed: bool,
    listeners: Vec<(ListenerId, Listener)>,
}

impl ContextRecord {
    fn is_live(&self) -> bool {
        !self.invalidated && !self.closed
    }

    fn metadata(&self) -> SenderMetadata {
        match &self.kind {
            ContextKind::Background => SenderMetadata {
                extension_id: Some(EXTENSION_ID.into()),
                url: Some(format!("extension://{EXTENSION_ID}/background")),
                origin: Some(format!("extension://{EXTENSION_ID}")),
                ..Default::default()
            },
            ContextKind::Page => SenderMetadata {
                extension_id: Some(EXTENSION_ID.into()),
                url: Some(format!("extension://{EXTENSION_ID}/page")),
                origin: Some(format!("extension://{EXTENSION_ID}")),
                ..Default::default()
            },
            ContextKind::ContentScript { process_id } => SenderMetadata {
                process_id: Some(*process_id),
                frame_id: Some(0),
                extension_id: Some(EXTENSION_ID.into()),
                url: Some(format!("https://process-{process_id}.example/")),
                origin: Some(format!("https://process-{process_id}.example")),
            },
            ContextKind::ExternalPeer { peer_id } => SenderMetadata {
                extension_id: Some(peer_id.clone()),
                ..Default::default()
            },
        }
    }
}

#[derive(Default)]
struct HostState {
    next_listener: u64,
    focused_scope: Option<ScopeId>,
    contexts: Vec<ContextRecord>,
    /// Reply function invocations, indexed by request
    responses: Vec<usize>,
}

impl HostState {
    fn listeners_where(&self, accepts: impl Fn(usize, &ContextRecord) -> bool) -> Vec<Listener> {
        self.contexts
            .iter()
            .enumerate()
            .filter(|(index, context)| context.is_live() && accepts(*index, context))
            .flat_map(|(_, context)| context.listeners.iter().map(|(_, listener)| listener.clone()))
            .collect()
    }

    fn route(&self, from: usize, destination: &Destination) -> Result<Vec<Listener>, String> {
        let listeners = match destination {
            Destination::Process(process_id) => {
                let exists = self.contexts.iter().any(|context| {
                    context.kind == ContextKind::ContentScript { process_id: *process_id }
                        && !context.closed
                });
                if !exists {
                    return Err(format!("No tab with id: {process_id}."));
                }
                self.listeners_where(|_, context| {
                    context.kind == ContextKind::ContentScript { process_id: *process_id }
                })
            }
            Destination::ExternalPeer(peer_id) if peer_id == EXTENSION_ID => {
                self.listeners_where(|_, context| context.kind.is_extension_page())
            }
            Destination::ExternalPeer(peer_id) => self.listeners_where(|_, context| {
                matches!(&context.kind, ContextKind::ExternalPeer { peer_id: id } if id == peer_id)
            }),
            Destination::Broadcast => {
                let sender_is_peer =
                    matches!(self.contexts[from].kind, ContextKind::ExternalPeer { .. });
                self.listeners_where(|index, context| {
                    !sender_is_peer && index != from && context.kind.is_extension_page()
                })
            }
        };

        if listeners.is_empty() {
            Err(NO_RECEIVER.into())
        } else {
            Ok(listeners)
        }
    }
}

/// The simulated browser. Clones share the same host.
#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Arc<SharedCell<HostState>>,
}

impl MemoryHost {
    /// Creates a host with no contexts
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the background worker. Its scope lookup reports the focused
    /// scope (see [`MemoryHost::focus`]).
    pub fn background(&self) -> MemoryTransport {
        self.attach(ContextKind::Background, None)
    }

    /// Attaches an extension page (popup, side panel...) open in `scope`
    pub fn page(&self, scope: ScopeId) -> MemoryTransport {
        self.attach(ContextKind::Page, Some(scope))
    }

    /// Attaches a content script running in `process_id` within `scope`.
    /// Content scripts can not look up their scope.
    pub fn content_script(&self, process_id: ProcessId, scope: ScopeId) -> MemoryTransport {
        self.attach(ContextKind::ContentScript { process_id }, Some(scope))
    }

    /// Attaches a context of the external peer `peer_id`
    pub fn external_peer(&self, peer_id: impl Into<String>) -> MemoryTransport {
        self.attach(
            ContextKind::ExternalPeer {
                peer_id: peer_id.into(),
            },
            None,
        )
    }

    /// Sets the scope the background worker reports as current
    pub fn focus(&self, scope: ScopeId) {
        self.state.with_mut(|state| state.focused_scope = Some(scope));
    }

    /// Simulates the extension being reloaded underneath `transport`'s
    /// context: it stops receiving and its sends fail
    pub fn invalidate(&self, transport: &MemoryTransport) {
        self.state.with_mut(|state| state.contexts[transport.context].invalidated = true);
    }

    /// Simulates the process (tab) `process_id` closing
    pub fn close_process(&self, process_id: ProcessId) {
        self.state.with_mut(|state| {
            for context in &mut state.contexts {
                if context.kind == (ContextKind::ContentScript { process_id }) {
                    context.closed = true;
                    context.listeners.clear();
                }
            }
        });
    }

    /// The number of listeners installed across all contexts
    pub fn listener_count(&self) -> usize {
        self.state.with(|state| {
            state
                .contexts
                .iter()
                .map(|context| context.listeners.len())
                .sum()
        })
    }

    /// The number of sends that reached at least one listener
    pub fn request_count(&self) -> usize {
        self.state.with(|state| state.responses.len())
    }

    /// How many times receivers invoked the reply function of `request`
    /// (numbered from zero in send order)
    pub fn responses(&self, request: usize) -> usize {
        self.state
            .with(|state| state.responses.get(request).copied().unwrap_or_default())
    }

    /// The most reply function invocations any single request received
    pub fn max_responses(&self) -> usize {
        self.state
            .with(|state| state.responses.iter().copied().max().unwrap_or_default())
    }

    fn attach(&self, kind: ContextKind, scope: Option<ScopeId>) -> MemoryTransport {
        let context = self.state.with_mut(|state| {
            state.contexts.push(ContextRecord {
                kind,
                scope,
                invalidated: false,
                closed: false,
                listeners: Vec::new(),
            });
            state.contexts.len() - 1
        });

        MemoryTransport {
            host: self.clone(),
            context,
            scope_lookup: true,
        }
    }
}

/// One context's view of a [`MemoryHost`]
#[derive(Clone)]
pub struct MemoryTransport {
    host: MemoryHost,
    context: usize,
    scope_lookup: bool,
}

impl MemoryTransport {
    /// This transport with the scope lookup capability removed
    pub fn without_scope_lookup(mut self) -> Self {
        self.scope_lookup = false;
        self
    }

    /// The kind of context this transport belongs to
    pub fn kind(&self) -> ContextKind {
        self.host
            .state
            .with(|state| state.contexts[self.context].kind.clone())
    }
}

impl Transport for MemoryTransport {
    fn send(&self, destination: &Destination, envelope: Envelope, on_reply: OnReply) {
        let message = envelope.into_message();
        let routed = self.host.state.with_mut(|state| {
            let sender = &state.contexts[self.context];
            if sender.invalidated {
                return Err(CONTEXT_INVALIDATED.to_owned());
            }
            let metadata = sender.metadata();
            let listeners = state.route(self.context, destination)?;

            state.responses.push(0);
            Ok((state.responses.len() - 1, listeners, metadata))
        });

        let (request, listeners, sender) = match routed {
            Ok(routed) => routed,
            Err(raw) => return on_reply(Err(raw)),
        };

        let pending = Arc::new(PendingReply {
            host: self.host.clone(),
            request,
            on_reply: SharedCell::new(Some(on_reply)),
        });

        for listener in listeners {
            let pending = pending.clone();
            let respond: Respond = Box::new(move |reply: Option<Value>| pending.respond(reply));
            listener(message.clone(), sender.clone(), respond);
        }
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        self.host.state.with_mut(|state| {
            let id = ListenerId::new(state.next_listener);
            state.next_listener += 1;
            state.contexts[self.context].listeners.push((id, listener));
            id
        })
    }

    fn remove_listener(&self, id: ListenerId) {
        self.host.state.with_mut(|state| {
            state.contexts[self.context]
                .listeners
                .retain(|(installed, _)| *installed != id)
        });
    }

    fn scope_lookup(&self) -> Option<Arc<dyn ScopeLookup>> {
        let supported = self.scope_lookup
            && self
                .host
                .state
                .with(|state| state.contexts[self.context].kind.is_extension_page());

        if supported {
            Some(Arc::new(MemoryScopeLookup {
                host: self.host.clone(),
                context: self.context,
            }))
        } else {
            None
        }
    }
}

/// The host side of one send. The first reply wins; if every reply function
/// is dropped without a reply, the sender is told the port closed.
struct PendingReply {
    host: MemoryHost,
    request: usize,
    on_reply: SharedCell<Option<OnReply>>,
}

impl PendingReply {
    fn respond(&self, reply: Option<Value>) {
        self.host
            .state
            .with_mut(|state| state.responses[self.request] += 1);

        if let Some(on_reply) = self.on_reply.take() {
            on_reply(Ok(reply));
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if let Some(on_reply) = self.on_reply.take() {
            on_reply(Err(PORT_CLOSED.to_owned()));
        }
    }
}

struct MemoryScopeLookup {
    host: MemoryHost,
    context: usize,
}

impl ScopeLookup for MemoryScopeLookup {
    fn current_scope(&self, on_resolved: OnScope) {
        let scope = self.host.state.with(|state| {
            let context = &state.contexts[self.context];
            match context.kind {
                ContextKind::Background => state.focused_scope,
                _ => context.scope,
            }
        });
        on_resolved(scope);
    }
}
