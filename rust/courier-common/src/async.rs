use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use thiserror::Error;
use tokio::sync::oneshot;

/// Async module errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourierAsyncError {
    /// The [`Resolver`] paired with a [`Deferred`] was dropped without ever
    /// being resolved
    #[error("Deferred value was abandoned before it was resolved")]
    Abandoned,
}

/// A boxed future that is `Send` on native targets and unconstrained on
/// `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub type BoxedFuture<'a, T> = futures_util::future::BoxFuture<'a, T>;

/// A boxed future that is `Send` on native targets and unconstrained on
/// `wasm32`.
#[cfg(target_arch = "wasm32")]
pub type BoxedFuture<'a, T> = futures_util::future::LocalBoxFuture<'a, T>;

/// Schedule a future on the local executor without waiting for it. The
/// future runs to completion on its own; its output is discarded.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(future);
}

/// Schedule a future on the local executor without waiting for it. The
/// future runs to completion on its own; its output is discarded.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Creates a single-resolution value: the [`Resolver`] half is handed to
/// callback-style code, and the [`Deferred`] half is awaited by the caller.
///
/// ```rust
/// # async fn example() {
/// use courier_common::deferred;
///
/// let (resolver, deferred) = deferred::<u32>();
/// let on_done = move |value| {
///     resolver.resolve(value);
/// };
///
/// on_done(42);
/// assert_eq!(deferred.await, Ok(42));
/// # }
/// ```
pub fn deferred<T>() -> (Resolver<T>, Deferred<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, Deferred { rx })
}

/// The writing half of [`deferred`]. Resolving consumes it, so a value can
/// be delivered at most once.
#[derive(Debug)]
pub struct Resolver<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Resolver<T> {
    /// Delivers `value`. Returns `false` if the [`Deferred`] half is gone,
    /// in which case the value is dropped.
    pub fn resolve(self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Whether the awaiting half was dropped
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The awaiting half of [`deferred`]
#[derive(Debug)]
pub struct Deferred<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Deferred<T> {
    type Output = Result<T, CourierAsyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| CourierAsyncError::Abandoned))
    }
}
