use courier::NamespacePreference;

/// A global object the browser exposes its extension API under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// `globalThis.chrome`
    Chrome,
    /// `globalThis.browser`
    Browser,
}

/// How asynchronous host calls report their result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStyle {
    /// A trailing callback argument, with failures in `runtime.lastError`
    Callback,
    /// A returned promise that rejects on failure
    Promise,
}

impl Namespace {
    /// The name of the global object
    pub const fn global(&self) -> &'static str {
        match self {
            Namespace::Chrome => "chrome",
            Namespace::Browser => "browser",
        }
    }

    /// The call convention the namespace's API follows
    pub const fn style(&self) -> CallStyle {
        match self {
            Namespace::Chrome => CallStyle::Callback,
            Namespace::Browser => CallStyle::Promise,
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.global())
    }
}

/// Picks the namespace to bind to. `available` reports whether a namespace
/// exposes a usable messaging API.
///
/// [`NamespacePreference::Auto`] tries `chrome` and then `browser`; an
/// explicit preference only accepts the namespace it names.
pub fn select(
    preference: NamespacePreference,
    available: impl Fn(Namespace) -> bool,
) -> Option<Namespace> {
    let candidates: &[Namespace] = match preference {
        NamespacePreference::Auto => &[Namespace::Chrome, Namespace::Browser],
        NamespacePreference::Chrome => &[Namespace::Chrome],
        NamespacePreference::Browser => &[Namespace::Browser],
    };

    candidates
        .iter()
        .copied()
        .find(|namespace| available(*namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_prefers_chrome_when_both_are_present() {
        assert_eq!(
            select(NamespacePreference::Auto, |_| true),
            Some(Namespace::Chrome)
        );
    }

    #[test]
    fn it_falls_back_to_browser() {
        assert_eq!(
            select(NamespacePreference::Auto, |namespace| namespace
                == Namespace::Browser),
            Some(Namespace::Browser)
        );
    }

    #[test]
    fn it_honors_an_explicit_preference() {
        assert_eq!(
            select(NamespacePreference::Browser, |_| true),
            Some(Namespace::Browser)
        );
        assert_eq!(
            select(NamespacePreference::Chrome, |namespace| namespace
                == Namespace::Browser),
            None
        );
    }

    #[test]
    fn it_finds_nothing_outside_an_extension() {
        assert_eq!(select(NamespacePreference::Auto, |_| false), None);
    }

    #[test]
    fn it_pairs_each_namespace_with_its_call_style() {
        assert_eq!(Namespace::Chrome.style(), CallStyle::Callback);
        assert_eq!(Namespace::Browser.style(), CallStyle::Promise);
        assert_eq!(Namespace::Browser.to_string(), "browser");
    }
}
