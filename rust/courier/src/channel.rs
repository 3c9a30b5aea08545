use courier_common::{BoxedFuture, ConditionalSend, ConditionalSync, deferred};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt::Display, future::Future, marker::PhantomData, sync::Arc};
use tracing::{debug, trace};

use crate::{
    Courier, CourierError, Destination, DestinationOptions, Disposer, Envelope, Reply,
    SendOutcome, SenderMetadata, classify,
    registry::{Handler, HandlerOutcome},
};

/// Reported in place of a reply when the transport drops a send's callback
/// without ever invoking it.
const ABANDONED_REPLY: &str = "The reply channel was disconnected before a response was received.";

/// A typed request/response conversation identified by a topic.
///
/// Requests are serialized to JSON on the way out and responses are decoded
/// on the way back. Untyped channels use [`serde_json::Value`] on both ends:
///
/// ```rust
/// # async fn example(courier: courier::Courier) -> Result<(), courier::CourierError> {
/// use courier::{Channel, DestinationOptions};
/// use serde_json::json;
///
/// let lookup: Channel<String, u32> = courier.channel("inventory/count");
/// let count = lookup
///     .send_with("apples".to_owned(), DestinationOptions::new().to_process(12))
///     .await?;
///
/// let raw: Channel = courier.channel("debug/echo");
/// let echoed = raw.send(json!({ "ping": true })).await?;
/// # Ok(())
/// # }
/// ```
pub struct Channel<Request = Value, Response = Value> {
    courier: Courier,
    topic: Arc<str>,
    types: PhantomData<fn(Request) -> Response>,
}

impl<Request, Response> Clone for Channel<Request, Response> {
    fn clone(&self) -> Self {
        Self {
            courier: self.courier.clone(),
            topic: self.topic.clone(),
            types: PhantomData,
        }
    }
}

impl<Request, Response> std::fmt::Debug for Channel<Request, Response> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("topic", &self.topic).finish()
    }
}

impl<Request, Response> Channel<Request, Response> {
    pub(crate) fn new(courier: Courier, topic: Arc<str>) -> Self {
        Self {
            courier,
            topic,
            types: PhantomData,
        }
    }

    /// The topic this channel sends and receives on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn serialization_error(&self, error: impl Display) -> CourierError {
        CourierError::Serialization {
            topic: self.topic.to_string(),
            message: error.to_string(),
        }
    }
}

impl<Request, Response> Channel<Request, Response>
where
    Request: Serialize,
    Response: DeserializeOwned,
{
    /// Sends `payload` to the extension runtime and waits for the reply.
    ///
    /// Resolves to `None` when the receiver replied with nothing (including
    /// when the envelope was filtered out by scope).
    pub async fn send(&self, payload: Request) -> Result<Option<Response>, CourierError> {
        self.send_with(payload, DestinationOptions::default()).await
    }

    /// Sends `payload` routed by `options` and waits for the reply. There is
    /// exactly one attempt and no timeout.
    pub async fn send_with(
        &self,
        payload: Request,
        options: DestinationOptions,
    ) -> Result<Option<Response>, CourierError> {
        let Some(transport) = self.courier.transport().cloned() else {
            return Err(CourierError::TransportUnavailable);
        };

        let payload = serde_json::to_value(payload).map_err(|error| self.serialization_error(error))?;
        let envelope = Envelope::new(self.topic.as_ref(), payload, Some(options));
        let destination = envelope.destination();

        trace!(
            context = %self.courier.config().label,
            topic = %self.topic,
            %destination,
            "Sending envelope"
        );

        let (resolver, reply) = deferred::<SendOutcome>();
        transport.send(
            &destination,
            envelope,
            Box::new(move |outcome: SendOutcome| {
                resolver.resolve(outcome);
            }),
        );
        drop(transport);

        let outcome = reply
            .await
            .unwrap_or_else(|_| Err(ABANDONED_REPLY.to_owned()));

        self.settle(destination, outcome)
    }

    fn settle(
        &self,
        destination: Destination,
        outcome: SendOutcome,
    ) -> Result<Option<Response>, CourierError> {
        let reply = match outcome {
            Ok(reply) => reply,
            Err(raw) => {
                let classified = classify(&raw);
                debug!(
                    topic = %self.topic,
                    %destination,
                    code = %classified.code,
                    raw = %raw,
                    "Envelope was not delivered"
                );
                return Err(CourierError::Delivery {
                    topic: self.topic.to_string(),
                    destination,
                    classified,
                    raw,
                });
            }
        };

        match Reply::interpret(reply) {
            Reply::Value(None) => Ok(None),
            Reply::Value(Some(value)) => serde_json::from_value(value)
                .map(Some)
                .map_err(|error| self.serialization_error(error)),
            Reply::Failure(message) => Err(CourierError::Application {
                topic: self.topic.to_string(),
                message,
            }),
        }
    }
}

impl<Request, Response> Channel<Request, Response>
where
    Request: DeserializeOwned + 'static,
    Response: Serialize + 'static,
{
    /// Registers an async handler for this topic. The handler's result (or
    /// the message of its error) becomes the reply.
    ///
    /// Every handler registered for a topic sees every envelope for it; the
    /// first one to finish provides the reply.
    pub fn on_message<H, Fut, E>(&self, handler: H) -> Disposer
    where
        H: Fn(Request, SenderMetadata) -> Fut + ConditionalSend + ConditionalSync + 'static,
        Fut: Future<Output = Result<Response, E>> + ConditionalSend + 'static,
        E: Display + 'static,
    {
        let topic = self.topic.clone();
        let erased = move |payload: Value,
                           sender: SenderMetadata|
              -> BoxedFuture<'static, HandlerOutcome> {
            match decode::<Request>(&topic, payload) {
                Ok(request) => {
                    let pending = handler(request, sender);
                    let topic = topic.clone();
                    Box::pin(async move {
                        let response = pending.await.map_err(|error| error.to_string())?;
                        encode(&topic, response)
                    })
                }
                Err(message) => Box::pin(std::future::ready(Err(message))),
            }
        };

        self.courier
            .registry()
            .register(self.topic.clone(), Handler::Async(Arc::new(erased)))
    }

    /// Registers a handler that produces its reply synchronously
    pub fn on_message_sync<H, E>(&self, handler: H) -> Disposer
    where
        H: Fn(Request, SenderMetadata) -> Result<Response, E>
            + ConditionalSend
            + ConditionalSync
            + 'static,
        E: Display + 'static,
    {
        let topic = self.topic.clone();
        let erased = move |payload: Value, sender: SenderMetadata| -> HandlerOutcome {
            let request = decode::<Request>(&topic, payload)?;
            let response = handler(request, sender).map_err(|error| error.to_string())?;
            encode(&topic, response)
        };

        self.courier
            .registry()
            .register(self.topic.clone(), Handler::Sync(Arc::new(erased)))
    }
}

fn decode<T: DeserializeOwned>(topic: &str, payload: Value) -> Result<T, String> {
    serde_json::from_value(payload)
        .map_err(|error| format!("Could not decode the payload for \"{topic}\": {error}"))
}

fn encode<T: Serialize>(topic: &str, response: T) -> HandlerOutcome {
    serde_json::to_value(response)
        .map_err(|error| format!("Could not encode the reply for \"{topic}\": {error}"))
}

/// A [`Channel`] whose sends are always addressed to an external peer (another
/// extension or an externally connectable page), given as a required
/// argument.
pub struct ExternalChannel<Request = Value, Response = Value> {
    channel: Channel<Request, Response>,
}

impl<Request, Response> Clone for ExternalChannel<Request, Response> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<Request, Response> ExternalChannel<Request, Response> {
    pub(crate) fn new(channel: Channel<Request, Response>) -> Self {
        Self { channel }
    }

    /// The topic this channel sends and receives on
    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    /// The underlying channel, for receiving or for non-peer sends
    pub fn channel(&self) -> &Channel<Request, Response> {
        &self.channel
    }
}

impl<Request, Response> ExternalChannel<Request, Response>
where
    Request: Serialize,
    Response: DeserializeOwned,
{
    /// Sends `payload` to `peer_id` and waits for the reply
    pub async fn send(
        &self,
        peer_id: impl Into<String>,
        payload: Request,
    ) -> Result<Option<Response>, CourierError> {
        self.send_with(peer_id, payload, DestinationOptions::default())
            .await
    }

    /// Sends `payload` to `peer_id` with a scope or other options. The peer
    /// replaces any process or peer set in `options`.
    pub async fn send_with(
        &self,
        peer_id: impl Into<String>,
        payload: Request,
        options: DestinationOptions,
    ) -> Result<Option<Response>, CourierError> {
        let options = DestinationOptions {
            target_process_id: None,
            external_peer_id: Some(peer_id.into()),
            ..options
        };
        self.channel.send_with(payload, options).await
    }
}

impl<Request, Response> std::fmt::Debug for ExternalChannel<Request, Response> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalChannel")
            .field("topic", &self.channel.topic)
            .finish()
    }
}
