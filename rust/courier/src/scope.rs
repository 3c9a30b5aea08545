use courier_common::deferred;
use std::sync::Arc;
use tracing::trace;

use crate::{ScopeId, ScopeLookup};

/// The outcome of checking an envelope's requested scope against the
/// receiving context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The envelope did not ask for a scope
    Unscoped,
    /// The receiving context is in the requested scope
    Matched,
    /// The receiving context is in a different scope
    Mismatched,
    /// The receiving context can not tell its scope, so filtering is skipped
    Unavailable,
}

impl Admission {
    /// Whether handlers should see the envelope. Only a positive mismatch
    /// keeps it from them.
    pub fn admits(self) -> bool {
        !matches!(self, Admission::Mismatched)
    }
}

/// Decides whether envelopes addressed to a scope may be handled in the
/// current context.
#[derive(Clone, Default)]
pub struct ScopeFilter {
    lookup: Option<Arc<dyn ScopeLookup>>,
}

impl ScopeFilter {
    /// Creates a filter backed by the host's scope lookup, if any
    pub fn new(lookup: Option<Arc<dyn ScopeLookup>>) -> Self {
        Self { lookup }
    }

    /// Whether the host can report the current scope
    pub fn can_filter(&self) -> bool {
        self.lookup.is_some()
    }

    /// Decides without suspending, when that is possible. Returns `None` when
    /// a lookup is needed, in which case use [`ScopeFilter::admit`].
    pub fn admit_now(&self, requested: Option<ScopeId>) -> Option<Admission> {
        match (requested, &self.lookup) {
            (None, _) => Some(Admission::Unscoped),
            (Some(_), None) => Some(Admission::Unavailable),
            (Some(_), Some(_)) => None,
        }
    }

    /// Decides, looking up the current scope when needed
    pub async fn admit(&self, requested: Option<ScopeId>) -> Admission {
        if let Some(admission) = self.admit_now(requested) {
            return admission;
        }
        let (Some(requested), Some(lookup)) = (requested, &self.lookup) else {
            return Admission::Unavailable;
        };

        let (resolver, current) = deferred();
        lookup.current_scope(Box::new(move |scope: Option<ScopeId>| {
            resolver.resolve(scope);
        }));

        let admission = match current.await {
            Ok(Some(current)) if current == requested => Admission::Matched,
            Ok(Some(_)) => Admission::Mismatched,
            Ok(None) | Err(_) => Admission::Unavailable,
        };
        trace!(requested, ?admission, "Evaluated scope filter");
        admission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OnScope;

    #[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
    use wasm_bindgen_test::wasm_bindgen_test;

    struct FixedScope(Option<ScopeId>);

    impl ScopeLookup for FixedScope {
        fn current_scope(&self, on_resolved: OnScope) {
            on_resolved(self.0)
        }
    }

    struct ForgetfulScope;

    impl ScopeLookup for ForgetfulScope {
        fn current_scope(&self, on_resolved: OnScope) {
            drop(on_resolved);
        }
    }

    fn filter(lookup: impl ScopeLookup + 'static) -> ScopeFilter {
        ScopeFilter::new(Some(Arc::new(lookup)))
    }

    #[test]
    fn it_admits_unscoped_envelopes_immediately() {
        assert_eq!(filter(FixedScope(Some(1))).admit_now(None), Some(Admission::Unscoped));
        assert_eq!(ScopeFilter::default().admit_now(None), Some(Admission::Unscoped));
    }

    #[test]
    fn it_skips_filtering_without_a_lookup() {
        let filter = ScopeFilter::default();

        assert!(!filter.can_filter());
        assert_eq!(filter.admit_now(Some(3)), Some(Admission::Unavailable));
        assert!(Admission::Unavailable.admits());
    }

    #[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
    #[cfg_attr(not(all(target_arch = "wasm32", target_os = "unknown")), tokio::test)]
    async fn it_matches_the_current_scope() {
        let filter = filter(FixedScope(Some(7)));

        assert_eq!(filter.admit_now(Some(7)), None);
        assert_eq!(filter.admit(Some(7)).await, Admission::Matched);
        assert_eq!(filter.admit(Some(8)).await, Admission::Mismatched);
        assert!(!Admission::Mismatched.admits());
    }

    #[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
    #[cfg_attr(not(all(target_arch = "wasm32", target_os = "unknown")), tokio::test)]
    async fn it_degrades_when_the_scope_is_unknown() {
        assert_eq!(filter(FixedScope(None)).admit(Some(7)).await, Admission::Unavailable);
        assert_eq!(filter(ForgetfulScope).admit(Some(7)).await, Admission::Unavailable);
    }
}
