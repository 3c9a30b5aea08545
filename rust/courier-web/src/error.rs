use thiserror::Error;

/// Failures of the WebExtension binding itself, as opposed to failures the
/// host reports for a send
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebTransportError {
    /// The host API this operation needs does not exist in this context
    /// (for instance `tabs` inside a content script)
    #[error("The extension API `{0}` is not available in this context")]
    MissingApi(String),

    /// A message could not cross between JSON and JavaScript values
    #[error("Could not convert a message: {0}")]
    Conversion(String),

    /// The host threw or rejected; the text is the host's own
    #[error("{0}")]
    Host(String),
}
