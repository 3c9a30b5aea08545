use std::{collections::HashMap, rc::Rc, sync::Arc};

use courier::{
    Destination, Envelope, Listener, ListenerId, NamespacePreference, OnReply, OnScope, Respond,
    ScopeLookup, SendOutcome, Transport,
};
use courier_common::{SharedCell, spawn_detached};
use js_sys::{Array, Function, Promise, Reflect};
use serde_json::Value;
use tracing::{debug, warn};
use wasm_bindgen::{JsCast, JsValue, prelude::Closure};
use wasm_bindgen_futures::JsFuture;

use crate::{
    CallStyle, Namespace, WebTransportError,
    host::{error_message, from_js, function, last_error, lookup, sender_metadata, to_js},
    select,
};

const MESSAGE_EVENTS: [&str; 2] = ["onMessage", "onMessageExternal"];
const TABS: &[&str] = &["tabs"];
const RUNTIME: &[&str] = &["runtime"];

type HostListener = Closure<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>;

/// A [`Transport`] over the browser's `runtime` and `tabs` messaging API.
///
/// Listeners are attached to both `runtime.onMessage` and (where the context
/// has it) `runtime.onMessageExternal`, so envelopes from external peers
/// reach the same handlers.
pub struct WebExtensionTransport {
    namespace: Namespace,
    api: JsValue,
    next_listener: SharedCell<u64>,
    listeners: SharedCell<HashMap<ListenerId, HostListener>>,
}

impl WebExtensionTransport {
    /// Binds to the first namespace allowed by `preference` that exposes
    /// `runtime.sendMessage`
    pub fn detect(preference: NamespacePreference) -> Option<Self> {
        let global: JsValue = js_sys::global().into();
        let namespace = select(preference, |namespace| {
            function(&global, &[namespace.global(), "runtime", "sendMessage"]).is_ok()
        })?;
        let api = lookup(&global, &[namespace.global()])?;

        Some(Self {
            namespace,
            api,
            next_listener: SharedCell::new(0),
            listeners: SharedCell::new(HashMap::new()),
        })
    }

    /// The namespace this transport is bound to
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    fn target(destination: &Destination, message: JsValue) -> (&'static [&'static str], Vec<JsValue>) {
        match destination {
            Destination::Process(process_id) => {
                (TABS, vec![JsValue::from_f64(*process_id as f64), message])
            }
            Destination::ExternalPeer(peer_id) => {
                (RUNTIME, vec![JsValue::from_str(peer_id), message])
            }
            Destination::Broadcast => (RUNTIME, vec![message]),
        }
    }

    fn send_message(
        &self,
        destination: &Destination,
        message: JsValue,
        on_reply: OnReply,
    ) -> Result<(), (WebTransportError, OnReply)> {
        let (path, mut arguments) = Self::target(destination, message);
        let Some(target) = lookup(&self.api, path) else {
            return Err((WebTransportError::MissingApi(path.join(".")), on_reply));
        };
        let send = match function(&target, &["sendMessage"]) {
            Ok(send) => send,
            Err(_) => {
                let api = format!("{}.sendMessage", path.join("."));
                return Err((WebTransportError::MissingApi(api), on_reply));
            }
        };

        match self.namespace.style() {
            CallStyle::Callback => {
                let pending = Rc::new(SharedCell::new(Some(on_reply)));
                let api = self.api.clone();
                let resolve = pending.clone();
                let callback = Closure::once_into_js(move |response: JsValue| {
                    let outcome = match last_error(&api) {
                        Some(raw) => Err(raw),
                        None => from_js(&response).map_err(|error| error.to_string()),
                    };
                    if let Some(on_reply) = resolve.take() {
                        on_reply(outcome);
                    }
                });
                arguments.push(callback);

                if let Err(thrown) = Reflect::apply(&send, &target, &Array::from_iter(arguments)) {
                    if let Some(on_reply) = pending.take() {
                        return Err((WebTransportError::Host(error_message(&thrown)), on_reply));
                    }
                }
                Ok(())
            }
            CallStyle::Promise => {
                let promise = match Reflect::apply(&send, &target, &Array::from_iter(arguments)) {
                    Ok(returned) => returned.dyn_into::<Promise>().ok(),
                    Err(thrown) => {
                        return Err((WebTransportError::Host(error_message(&thrown)), on_reply));
                    }
                };
                let Some(promise) = promise else {
                    return Err((
                        WebTransportError::Host("sendMessage did not return a promise".into()),
                        on_reply,
                    ));
                };

                spawn_detached(async move {
                    let outcome: SendOutcome = match JsFuture::from(promise).await {
                        Ok(response) => from_js(&response).map_err(|error| error.to_string()),
                        Err(rejection) => Err(error_message(&rejection)),
                    };
                    on_reply(outcome);
                });
                Ok(())
            }
        }
    }

    fn events(&self) -> impl Iterator<Item = JsValue> + '_ {
        MESSAGE_EVENTS
            .iter()
            .filter_map(|event| lookup(&self.api, &["runtime", *event]))
    }
}

impl Transport for WebExtensionTransport {
    fn send(&self, destination: &Destination, envelope: Envelope, on_reply: OnReply) {
        let message = match to_js(&envelope.into_message()) {
            Ok(message) => message,
            Err(error) => return on_reply(Err(error.to_string())),
        };

        if let Err((error, on_reply)) = self.send_message(destination, message, on_reply) {
            debug!(%destination, %error, "Host refused the send");
            on_reply(Err(error.to_string()));
        }
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = self.next_listener.with_mut(|next| {
            *next += 1;
            ListenerId::new(*next)
        });

        let closure: HostListener = Closure::new(
            move |message: JsValue, sender: JsValue, send_response: JsValue| -> JsValue {
                let message = match from_js(&message) {
                    Ok(Some(message)) => message,
                    _ => return JsValue::FALSE,
                };
                let Ok(send_response) = send_response.dyn_into::<Function>() else {
                    return JsValue::FALSE;
                };

                let respond: Respond = Box::new(move |reply: Option<Value>| {
                    let reply = match reply.as_ref().map(to_js).transpose() {
                        Ok(reply) => reply.unwrap_or(JsValue::UNDEFINED),
                        Err(error) => {
                            warn!(%error, "Could not convert a reply for the host");
                            JsValue::UNDEFINED
                        }
                    };
                    if let Err(thrown) = send_response.call1(&JsValue::UNDEFINED, &reply) {
                        debug!(error = %error_message(&thrown), "Host refused the reply");
                    }
                });

                JsValue::from_bool(listener(message, sender_metadata(&sender), respond))
            },
        );

        for event in self.events() {
            if let Ok(add) = function(&event, &["addListener"]) {
                if let Err(thrown) = add.call1(&event, closure.as_ref()) {
                    warn!(error = %error_message(&thrown), "Could not add a host listener");
                }
            }
        }

        self.listeners.with_mut(|listeners| listeners.insert(id, closure));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        let Some(closure) = self.listeners.with_mut(|listeners| listeners.remove(&id)) else {
            return;
        };

        for event in self.events() {
            if let Ok(remove) = function(&event, &["removeListener"]) {
                let _ = remove.call1(&event, closure.as_ref());
            }
        }
    }

    fn scope_lookup(&self) -> Option<Arc<dyn ScopeLookup>> {
        let windows = lookup(&self.api, &["windows"])?;
        function(&windows, &["getCurrent"]).ok()?;

        Some(Arc::new(CurrentWindow {
            namespace: self.namespace,
            api: self.api.clone(),
            windows,
        }))
    }
}

impl Drop for WebExtensionTransport {
    fn drop(&mut self) {
        let installed: Vec<ListenerId> =
            self.listeners.with(|listeners| listeners.keys().copied().collect());
        for id in installed {
            self.remove_listener(id);
        }
    }
}

/// Resolves the current scope to the id of the window the context runs in
struct CurrentWindow {
    namespace: Namespace,
    api: JsValue,
    windows: JsValue,
}

fn window_id(window: &JsValue) -> Option<i64> {
    lookup(window, &["id"])
        .and_then(|id| id.as_f64())
        .map(|id| id as i64)
}

impl ScopeLookup for CurrentWindow {
    fn current_scope(&self, on_resolved: OnScope) {
        let Ok(get_current) = function(&self.windows, &["getCurrent"]) else {
            return on_resolved(None);
        };

        match self.namespace.style() {
            CallStyle::Callback => {
                let pending = Rc::new(SharedCell::new(Some(on_resolved)));
                let resolve = pending.clone();
                let api = self.api.clone();
                let callback = Closure::once_into_js(move |window: JsValue| {
                    let scope = match last_error(&api) {
                        Some(_) => None,
                        None => window_id(&window),
                    };
                    if let Some(on_resolved) = resolve.take() {
                        on_resolved(scope);
                    }
                });

                if get_current.call1(&self.windows, &callback).is_err() {
                    if let Some(on_resolved) = pending.take() {
                        on_resolved(None);
                    }
                }
            }
            CallStyle::Promise => match get_current.call0(&self.windows) {
                Ok(returned) => match returned.dyn_into::<Promise>() {
                    Ok(promise) => spawn_detached(async move {
                        let scope = JsFuture::from(promise)
                            .await
                            .ok()
                            .and_then(|window| window_id(&window));
                        on_resolved(scope);
                    }),
                    Err(_) => on_resolved(None),
                },
                Err(_) => on_resolved(None),
            },
        }
    }
}
