#![warn(missing_docs)]

//! Typed request/response messaging between the isolated contexts of a
//! browser extension.
//!
//! The host's messaging primitive is a one-shot, callback-based send with a
//! single listener slot per context, untyped payloads and failures reported
//! as free-form text. This crate layers [`Channel`]s on top of it: each
//! channel owns a topic, multiplexes its requests over the shared
//! [`Transport`], turns the reply callback into an awaitable result, lets
//! receivers filter by scope, and classifies transport failures separately
//! from handler failures.
//!
//! Every context creates one [`Courier`] over its transport and derives its
//! channels from it:
//!
//! ```rust
//! # async fn example(transport: std::sync::Arc<dyn courier::Transport>) -> Result<(), courier::CourierError> {
//! use courier::{Channel, Courier};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Highlight {
//!     color: String,
//! }
//!
//! let courier = Courier::new(transport);
//! let highlight: Channel<Highlight, usize> = courier.channel("page/highlight");
//!
//! // In the receiving context
//! let registration = highlight.on_message(|request: Highlight, _sender| async move {
//!     Ok::<_, String>(request.color.len())
//! });
//!
//! // In the sending context
//! let count = highlight
//!     .send(Highlight { color: "red".into() })
//!     .await?;
//!
//! registration.dispose();
//! # Ok(())
//! # }
//! ```

mod config;
pub use config::*;

mod envelope;
pub use envelope::*;

mod classify;
pub use classify::*;

mod error;
pub use error::*;

mod transport;
pub use transport::*;

mod scope;
pub use scope::*;

mod registry;
pub use registry::Disposer;

mod channel;
pub use channel::*;

mod context;
pub use context::*;

#[cfg(any(test, feature = "helpers"))]
pub mod memory;
