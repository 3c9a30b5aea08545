use std::sync::Arc;

use crate::{Channel, CourierConfig, ExternalChannel, Transport, registry::ListenerRegistry};

/// The messaging root of one execution context (a background worker, a
/// content script, a popup...).
///
/// A [`Courier`] owns the context's transport and its shared listener, and
/// hands out [`Channel`]s. Create one per context and derive every channel
/// from it; channels created from the same [`Courier`] share a single host
/// listener. Clones are cheap handles to the same context.
#[derive(Clone)]
pub struct Courier {
    transport: Option<Arc<dyn Transport>>,
    registry: ListenerRegistry,
    config: Arc<CourierConfig>,
}

impl Courier {
    /// A context bound to `transport` with default settings
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(Some(transport), CourierConfig::default())
    }

    /// A context bound to `transport`, if one was found, with `config`
    pub fn with_config(transport: Option<Arc<dyn Transport>>, config: CourierConfig) -> Self {
        let config = Arc::new(config);
        let registry = ListenerRegistry::new(transport.clone(), config.clone());

        Self {
            transport,
            registry,
            config,
        }
    }

    /// A context with no host transport. Sends fail immediately with
    /// [`crate::CourierError::TransportUnavailable`] and handlers never fire.
    pub fn detached(config: CourierConfig) -> Self {
        Self::with_config(None, config)
    }

    /// Creates the channel for `topic`. Topics are not namespaced: two
    /// channels with the same topic exchange the same envelopes.
    pub fn channel<Request, Response>(&self, topic: impl Into<String>) -> Channel<Request, Response> {
        Channel::new(self.clone(), Arc::from(topic.into()))
    }

    /// Creates the channel for `topic`, addressed to external peers
    pub fn external_channel<Request, Response>(
        &self,
        topic: impl Into<String>,
    ) -> ExternalChannel<Request, Response> {
        ExternalChannel::new(self.channel(topic))
    }

    /// The settings this context was created with
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Whether a host transport is present
    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// The number of live handler registrations across all topics
    pub fn handler_count(&self) -> usize {
        self.registry.handler_count()
    }

    /// Whether the shared host listener is currently installed
    pub fn is_listening(&self) -> bool {
        self.registry.is_listening()
    }

    pub(crate) fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub(crate) fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }
}

impl std::fmt::Debug for Courier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Courier")
            .field("label", &self.config.label)
            .field("has_transport", &self.has_transport())
            .field("handlers", &self.handler_count())
            .finish()
    }
}
