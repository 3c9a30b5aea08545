#![warn(missing_docs)]

//! Binds [`courier`] to the browser's WebExtension messaging API.
//!
//! The host API lives under `globalThis.chrome` (callback style, with
//! failures reported through `runtime.lastError`) or `globalThis.browser`
//! (promise style). [`connect`] probes for either according to
//! [`CourierConfig::namespace`] and builds the context's [`Courier`] over
//! whichever it finds:
//!
//! ```rust
//! use courier::{Channel, CourierConfig};
//!
//! let courier = courier_web::connect(CourierConfig::default().with_label("popup"));
//! let ping: Channel<(), String> = courier.channel("ping");
//! ```
//!
//! Outside of an extension (or on targets other than
//! `wasm32-unknown-unknown`) the returned context is detached: its sends fail
//! with [`courier::CourierError::TransportUnavailable`].

use courier::{Courier, CourierConfig};

mod namespace;
pub use namespace::*;

mod error;
pub use error::*;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
mod host;

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
mod transport;
#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
pub use transport::*;

/// Creates the [`Courier`] for the current execution context
pub fn connect(config: CourierConfig) -> Courier {
    #[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
    if let Some(transport) = WebExtensionTransport::detect(config.namespace) {
        tracing::debug!(
            context = %config.label,
            namespace = %transport.namespace(),
            "Connected to the extension host"
        );
        return Courier::with_config(Some(std::sync::Arc::new(transport)), config);
    }

    tracing::warn!(
        context = %config.label,
        preference = ?config.namespace,
        "No extension messaging API was found; channels in this context are detached"
    );
    Courier::detached(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(all(target_arch = "wasm32", target_os = "unknown")))]
    #[test]
    fn it_detaches_outside_of_a_browser() {
        let courier = connect(CourierConfig::default().with_label("native"));

        assert!(!courier.has_transport());
        assert_eq!(courier.config().label, "native");
    }
}
