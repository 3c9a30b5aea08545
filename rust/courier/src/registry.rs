//! The per-context listener registry.
//!
//! A context installs a single listener on its [`Transport`], shared by every
//! topic. The registry counts registrations: the host listener goes in with
//! the first registration and comes out with the last disposal. Incoming
//! envelopes are matched against registrations by topic, run through the
//! [`ScopeFilter`], and handed to each matching handler in registration
//! order. Handlers share the envelope's reply slot; the first reply reaches
//! the host and later ones are dropped.

use courier_common::{BoxedFuture, ConditionalSend, ConditionalSync, SharedCell, spawn_detached};
use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Weak},
};
use tracing::{debug, error, trace, warn};

use crate::{
    Admission, CourierConfig, Envelope, Listener, ListenerId, Reply, Respond, ScopeFilter,
    SenderMetadata, Transport,
};

/// What a handler produced: the reply value, or the message of its failure
pub(crate) type HandlerOutcome = Result<Value, String>;

pub(crate) trait SyncHandlerFn:
    Fn(Value, SenderMetadata) -> HandlerOutcome + ConditionalSend + ConditionalSync
{
}
impl<F> SyncHandlerFn for F where
    F: Fn(Value, SenderMetadata) -> HandlerOutcome + ConditionalSend + ConditionalSync
{
}

pub(crate) trait AsyncHandlerFn:
    Fn(Value, SenderMetadata) -> BoxedFuture<'static, HandlerOutcome>
    + ConditionalSend
    + ConditionalSync
{
}
impl<F> AsyncHandlerFn for F where
    F: Fn(Value, SenderMetadata) -> BoxedFuture<'static, HandlerOutcome>
        + ConditionalSend
        + ConditionalSync
{
}

/// A type-erased handler
#[derive(Clone)]
pub(crate) enum Handler {
    /// Produces its reply before returning
    Sync(Arc<dyn SyncHandlerFn>),
    /// Produces its reply later
    Async(Arc<dyn AsyncHandlerFn>),
}

struct Registration {
    topic: Arc<str>,
    handler: Handler,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    registrations: IndexMap<u64, Registration>,
    host_listener: Option<ListenerId>,
}

struct RegistryInner {
    state: SharedCell<RegistryState>,
    transport: Option<Arc<dyn Transport>>,
    scope: ScopeFilter,
    config: Arc<CourierConfig>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let listener = self.state.with_mut(|state| state.host_listener.take());
        if let (Some(id), Some(transport)) = (listener, &self.transport) {
            transport.remove_listener(id);
        }
    }
}

/// Owns the context's shared host listener and the handler registrations
/// behind it.
#[derive(Clone)]
pub(crate) struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new(transport: Option<Arc<dyn Transport>>, config: Arc<CourierConfig>) -> Self {
        let scope = ScopeFilter::new(
            transport
                .as_ref()
                .and_then(|transport| transport.scope_lookup()),
        );

        Self {
            inner: Arc::new(RegistryInner {
                state: SharedCell::new(RegistryState::default()),
                transport,
                scope,
                config,
            }),
        }
    }

    /// Adds a handler for `topic`, installing the host listener if this is
    /// the first registration in the context
    pub fn register(&self, topic: Arc<str>, handler: Handler) -> Disposer {
        let (id, install) = self.inner.state.with_mut(|state| {
            let id = state.next_id;
            state.next_id += 1;
            state.registrations.insert(
                id,
                Registration {
                    topic: topic.clone(),
                    handler,
                },
            );
            (id, state.host_listener.is_none())
        });

        debug!(
            context = %self.inner.config.label,
            topic = %topic,
            registration = id,
            "Registered handler"
        );

        if install {
            self.install();
        }

        Disposer {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn handler_count(&self) -> usize {
        self.inner.state.with(|state| state.registrations.len())
    }

    pub fn is_listening(&self) -> bool {
        self.inner.state.with(|state| state.host_listener.is_some())
    }

    fn install(&self) {
        let Some(transport) = &self.inner.transport else {
            warn!(
                context = %self.inner.config.label,
                "No transport is available; registered handlers will never receive messages"
            );
            return;
        };

        let registry = Arc::downgrade(&self.inner);
        let listener: Listener = Arc::new(
            move |message: Value, sender: SenderMetadata, respond: Respond| -> bool {
                match registry.upgrade() {
                    Some(registry) => dispatch(&registry, message, sender, respond),
                    None => false,
                }
            },
        );
        let id = transport.add_listener(listener);

        let surplus = self.inner.state.with_mut(|state| {
            if state.host_listener.is_some() || state.registrations.is_empty() {
                Some(id)
            } else {
                state.host_listener = Some(id);
                None
            }
        });

        match surplus {
            Some(id) => transport.remove_listener(id),
            None => trace!(context = %self.inner.config.label, "Installed host listener"),
        }
    }
}

/// Removes one handler registration. Dropping a [`Disposer`] without calling
/// [`Disposer::dispose`] leaves the handler registered.
#[must_use = "dropping a Disposer keeps the handler registered; call `dispose` to remove it"]
pub struct Disposer {
    registry: Weak<RegistryInner>,
    id: u64,
}

impl Disposer {
    /// Removes the registration. If it was the last one in the context, the
    /// host listener is uninstalled as well.
    pub fn dispose(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        let uninstall = registry.state.with_mut(|state| {
            state.registrations.shift_remove(&self.id);
            if state.registrations.is_empty() {
                state.host_listener.take()
            } else {
                None
            }
        });

        debug!(
            context = %registry.config.label,
            registration = self.id,
            "Disposed handler"
        );

        if let (Some(id), Some(transport)) = (uninstall, &registry.transport) {
            transport.remove_listener(id);
            trace!(context = %registry.config.label, "Uninstalled host listener");
        }
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer").field("id", &self.id).finish()
    }
}

/// The host's reply function for one envelope, shared by every handler that
/// sees it. Only the first reply is forwarded.
#[derive(Clone)]
struct ReplySlot {
    respond: Arc<SharedCell<Option<Respond>>>,
    topic: Arc<str>,
}

impl ReplySlot {
    fn new(respond: Respond, topic: Arc<str>) -> Self {
        Self {
            respond: Arc::new(SharedCell::new(Some(respond))),
            topic,
        }
    }

    fn reply(&self, reply: Option<Value>) {
        match self.respond.take() {
            Some(respond) => respond(reply),
            None => debug!(topic = %self.topic, "Dropped a reply; another handler already replied"),
        }
    }
}

fn dispatch(
    registry: &Arc<RegistryInner>,
    message: Value,
    sender: SenderMetadata,
    respond: Respond,
) -> bool {
    let Some(envelope) = Envelope::from_message(message) else {
        return false;
    };

    let handlers: Vec<Handler> = registry.state.with(|state| {
        state
            .registrations
            .values()
            .filter(|registration| *registration.topic == *envelope.topic)
            .map(|registration| registration.handler.clone())
            .collect()
    });
    if handlers.is_empty() {
        return false;
    }

    let topic: Arc<str> = Arc::from(envelope.topic.as_str());
    let slot = ReplySlot::new(respond, topic.clone());
    let delivery = Delivery {
        topic,
        handlers,
        payload: envelope.payload.clone(),
        sender,
        slot,
        config: registry.config.clone(),
    };

    match registry.scope.admit_now(envelope.scope_id()) {
        Some(admission) => delivery.complete(admission),
        None => {
            let scope = registry.scope.clone();
            let requested = envelope.scope_id();
            spawn_detached(async move {
                let admission = scope.admit(requested).await;
                delivery.complete(admission);
            });
        }
    }

    true
}

/// An admitted or pending envelope with the handlers it was matched to
struct Delivery {
    topic: Arc<str>,
    handlers: Vec<Handler>,
    payload: Value,
    sender: SenderMetadata,
    slot: ReplySlot,
    config: Arc<CourierConfig>,
}

impl Delivery {
    fn complete(self, admission: Admission) {
        if !admission.admits() {
            trace!(topic = %self.topic, ?admission, "Envelope is for another scope");
            self.slot.reply(None);
            return;
        }

        for handler in self.handlers {
            let payload = self.payload.clone();
            let sender = self.sender.clone();
            let reply = Replier {
                topic: self.topic.clone(),
                slot: self.slot.clone(),
                config: self.config.clone(),
            };

            match handler {
                Handler::Sync(handler) => {
                    let outcome = catch_unwind(AssertUnwindSafe(|| handler(payload, sender)))
                        .unwrap_or_else(|panic| Err(panic_message(panic)));
                    reply.send(outcome);
                }
                Handler::Async(handler) => {
                    let started = catch_unwind(AssertUnwindSafe(|| handler(payload, sender)));
                    match started {
                        Ok(future) => spawn_detached(async move {
                            let outcome = AssertUnwindSafe(future)
                                .catch_unwind()
                                .await
                                .unwrap_or_else(|panic| Err(panic_message(panic)));
                            reply.send(outcome);
                        }),
                        Err(panic) => reply.send(Err(panic_message(panic))),
                    }
                }
            }
        }
    }
}

/// Sends one handler's outcome through the shared slot
struct Replier {
    topic: Arc<str>,
    slot: ReplySlot,
    config: Arc<CourierConfig>,
}

impl Replier {
    fn send(self, outcome: HandlerOutcome) {
        match outcome {
            Ok(value) => self.slot.reply(Some(value)),
            Err(message) => {
                if self.config.log_handler_errors {
                    error!(
                        context = %self.config.label,
                        topic = %self.topic,
                        error = %message,
                        "Message handler failed"
                    );
                }
                self.slot.reply(Some(Reply::failure(message)));
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => (*message).to_owned(),
            Err(_) => "Message handler panicked".to_owned(),
        },
    }
}
