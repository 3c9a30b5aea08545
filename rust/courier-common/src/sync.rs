//! Cross-target bound compatability traits
//!
//! On `wasm32` targets, the traits effectively represent no new bound. On
//! other targets they represent `Send` or `Send + Sync` bounds (depending on
//! which one is used).

#[allow(missing_docs)]
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSend: Send {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSend for S where S: Send {}

#[allow(missing_docs)]
#[cfg(not(target_arch = "wasm32"))]
pub trait ConditionalSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<S> ConditionalSync for S where S: Send + Sync {}

#[allow(missing_docs)]
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSend {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSend for S {}

#[allow(missing_docs)]
#[cfg(target_arch = "wasm32")]
pub trait ConditionalSync {}

#[cfg(target_arch = "wasm32")]
impl<S> ConditionalSync for S {}

/// Platform-appropriate shared interior mutability cell.
///
/// - Native: `std::sync::Mutex`
/// - WASM: `std::cell::RefCell`
///
/// Access is scoped to a closure so a guard can never be held across an
/// `.await` or while foreign code (a handler, a host callback) runs. Callers
/// copy what they need out of the closure and act on it afterwards.
///
/// ```
/// use courier_common::SharedCell;
///
/// let cell = SharedCell::new(vec![1, 2]);
/// cell.with_mut(|values| values.push(3));
///
/// assert_eq!(cell.with(|values| values.len()), 3);
/// ```
#[derive(Debug, Default)]
pub struct SharedCell<T> {
    #[cfg(not(target_arch = "wasm32"))]
    inner: std::sync::Mutex<T>,
    #[cfg(target_arch = "wasm32")]
    inner: std::cell::RefCell<T>,
}

impl<T> SharedCell<T> {
    /// Creates a new [`SharedCell`] holding `value`
    pub fn new(value: T) -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            inner: std::sync::Mutex::new(value),
            #[cfg(target_arch = "wasm32")]
            inner: std::cell::RefCell::new(value),
        }
    }

    /// Runs `read` against a shared view of the value
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        #[cfg(not(target_arch = "wasm32"))]
        let guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        #[cfg(target_arch = "wasm32")]
        let guard = self.inner.borrow();

        read(&guard)
    }

    /// Runs `write` against an exclusive view of the value
    pub fn with_mut<R>(&self, write: impl FnOnce(&mut T) -> R) -> R {
        #[cfg(not(target_arch = "wasm32"))]
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        #[cfg(target_arch = "wasm32")]
        let mut guard = self.inner.borrow_mut();

        write(&mut guard)
    }

    /// Swaps the current value for `value`, returning the old one
    pub fn replace(&self, value: T) -> T {
        self.with_mut(|current| std::mem::replace(current, value))
    }
}

impl<T: Default> SharedCell<T> {
    /// Takes the value, leaving `T::default()` in its place
    pub fn take(&self) -> T {
        self.with_mut(std::mem::take)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_scopes_reads_and_writes() {
        let cell = SharedCell::new(String::from("courier"));
        cell.with_mut(|value| value.push_str("-common"));

        assert_eq!(cell.with(|value| value.clone()), "courier-common");
    }

    #[test]
    fn it_takes_the_value_once() {
        let cell = SharedCell::new(Some(7));

        assert_eq!(cell.take(), Some(7));
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn it_replaces_the_value() {
        let cell = SharedCell::new(1);

        assert_eq!(cell.replace(2), 1);
        assert_eq!(cell.with(|value| *value), 2);
    }
}
