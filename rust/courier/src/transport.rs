//! The capability a host must provide for channels to work.
//!
//! A [`Transport`] mirrors the shape of the WebExtension messaging API: a
//! one-shot send that completes through a callback, a listener slot that
//! receives every message along with a one-shot reply function, and an
//! optional lookup of the scope (window) the current context belongs to.
//!
//! The callback types are boxed closures that are `Send` on native targets
//! and unconstrained on `wasm32`, where the host objects they capture can not
//! cross threads anyway.

use courier_common::{ConditionalSend, ConditionalSync};
use serde_json::Value;
use std::sync::Arc;

use crate::{Destination, Envelope, ScopeId, SenderMetadata};

/// Completion of a one-shot send: the raw reply (absent for `undefined`), or
/// the failure text the host reported.
pub type SendOutcome = Result<Option<Value>, String>;

#[allow(missing_docs)]
pub trait ReplyFn: FnOnce(SendOutcome) + ConditionalSend {}
impl<F> ReplyFn for F where F: FnOnce(SendOutcome) + ConditionalSend {}

/// Invoked exactly once when a send completes
pub type OnReply = Box<dyn ReplyFn>;

#[allow(missing_docs)]
pub trait RespondFn: FnOnce(Option<Value>) + ConditionalSend {}
impl<F> RespondFn for F where F: FnOnce(Option<Value>) + ConditionalSend {}

/// The host's reply function for one received message. Consuming it sends
/// the reply; dropping it without calling it closes the reply channel.
pub type Respond = Box<dyn RespondFn>;

#[allow(missing_docs)]
pub trait ListenerFn:
    Fn(Value, SenderMetadata, Respond) -> bool + ConditionalSend + ConditionalSync
{
}
impl<F> ListenerFn for F where
    F: Fn(Value, SenderMetadata, Respond) -> bool + ConditionalSend + ConditionalSync
{
}

/// Receives every message delivered to a context. Returns `true` when the
/// message was taken and a reply may follow later.
pub type Listener = Arc<dyn ListenerFn>;

#[allow(missing_docs)]
pub trait ScopeFn: FnOnce(Option<ScopeId>) + ConditionalSend {}
impl<F> ScopeFn for F where F: FnOnce(Option<ScopeId>) + ConditionalSend {}

/// Receives the scope of the current context, or `None` when the host could
/// not tell
pub type OnScope = Box<dyn ScopeFn>;

/// Handle for an installed [`Listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wraps a transport-assigned identifier
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Resolves which scope the current context belongs to
pub trait ScopeLookup: ConditionalSend + ConditionalSync {
    /// Looks up the current scope and reports it through `on_resolved`
    fn current_scope(&self, on_resolved: OnScope);
}

/// A host messaging surface
pub trait Transport: ConditionalSend + ConditionalSync {
    /// Sends `envelope` to `destination` and reports the outcome through
    /// `on_reply`, exactly once
    fn send(&self, destination: &Destination, envelope: Envelope, on_reply: OnReply);

    /// Installs `listener` in the context's listener slot
    fn add_listener(&self, listener: Listener) -> ListenerId;

    /// Removes a listener installed by [`Transport::add_listener`]
    fn remove_listener(&self, id: ListenerId);

    /// The scope lookup capability, if the host offers one in this context
    fn scope_lookup(&self) -> Option<Arc<dyn ScopeLookup>>;
}
