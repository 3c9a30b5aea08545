#![warn(missing_docs)]

//! Light weight helpers shared by the courier crates. Everything here exists
//! so that the same messaging code can run inside a single-threaded
//! `wasm32-unknown-unknown` extension context and in native test harnesses
//! where the executor may move work across threads.

mod sync;
pub use sync::*;

mod r#async;
pub use r#async::*;
