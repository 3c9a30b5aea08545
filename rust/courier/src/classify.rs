//! Maps the free-form failure text a host transport reports into a small set
//! of actionable categories.
//!
//! Matching is case-insensitive substring containment against an ordered
//! table, and the first matching row wins. Order therefore matters: a message
//! such as "Cannot access contents of url ... must request permission" is a
//! [`ErrorCode::TargetUnavailable`] even though it also mentions permissions.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The category of a failed send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    /// Nothing is listening at the destination
    NoReceiver,
    /// The destination is gone or may not be messaged
    TargetUnavailable,
    /// The extension was reloaded, updated or disabled underneath the caller
    ContextInvalidated,
    /// The extension lacks a permission the operation needs
    PermissionDenied,
    /// The reply channel closed before a reply arrived
    ChannelDisconnected,
    /// Any other transport failure
    RuntimeError,
    /// The receiving handler reported a failure. Never produced by [`classify`].
    ApplicationError,
}

impl ErrorCode {
    /// The codes [`classify`] can produce, in matching order
    pub const CLASSIFIABLE: [ErrorCode; 6] = [
        ErrorCode::NoReceiver,
        ErrorCode::TargetUnavailable,
        ErrorCode::ContextInvalidated,
        ErrorCode::PermissionDenied,
        ErrorCode::ChannelDisconnected,
        ErrorCode::RuntimeError,
    ];

    /// Stable string form of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoReceiver => "no-receiver",
            ErrorCode::TargetUnavailable => "target-unavailable",
            ErrorCode::ContextInvalidated => "context-invalidated",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::ChannelDisconnected => "channel-disconnected",
            ErrorCode::RuntimeError => "runtime-error",
            ErrorCode::ApplicationError => "application-error",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure category together with an explanation and a suggested fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    /// The category
    pub code: ErrorCode,
    /// What most likely happened
    pub reason: &'static str,
    /// What to do about it
    pub remedy: &'static str,
}

impl ClassifiedError {
    /// The fixed category for failures reported by a receiving handler
    pub fn application() -> Self {
        APPLICATION.classified()
    }
}

impl Display for ClassifiedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} {}", self.code, self.reason, self.remedy)
    }
}

struct Rule {
    code: ErrorCode,
    reason: &'static str,
    remedy: &'static str,
    triggers: &'static [&'static str],
}

impl Rule {
    fn classified(&self) -> ClassifiedError {
        ClassifiedError {
            code: self.code,
            reason: self.reason,
            remedy: self.remedy,
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        self.triggers.iter().any(|trigger| haystack.contains(trigger))
    }
}

const RULES: &[Rule] = &[
    Rule {
        code: ErrorCode::NoReceiver,
        reason: "No listener is registered at the destination.",
        remedy: "Make sure the receiving context is loaded and has registered a handler before sending.",
        triggers: &[
            "receiving end does not exist",
            "could not establish connection",
            "no receiving end",
        ],
    },
    Rule {
        code: ErrorCode::TargetUnavailable,
        reason: "The destination process is closed or cannot be messaged.",
        remedy: "Check that the target still exists and is not a restricted page before sending.",
        triggers: &[
            "no tab with id",
            "no frame with id",
            "tab was closed",
            "cannot access",
            "cannot be scripted",
            "restricted",
        ],
    },
    Rule {
        code: ErrorCode::ContextInvalidated,
        reason: "The extension was reloaded, updated or disabled.",
        remedy: "Reload the page so a fresh context can reconnect to the extension.",
        triggers: &[
            "extension context invalidated",
            "context invalidated",
            "extension was reloaded",
            "extension has been updated",
            "extension is disabled",
        ],
    },
    Rule {
        code: ErrorCode::PermissionDenied,
        reason: "The extension lacks a permission this operation requires.",
        remedy: "Declare the missing permission in the extension manifest.",
        triggers: &["permission", "not allowed", "forbidden"],
    },
    Rule {
        code: ErrorCode::ChannelDisconnected,
        reason: "The reply channel closed before a response arrived.",
        remedy: "Ensure the receiving handler always replies, and that the receiver stays alive until it does.",
        triggers: &[
            "message port closed",
            "port closed",
            "disconnected",
            "message channel closed",
        ],
    },
];

const FALLBACK: Rule = Rule {
    code: ErrorCode::RuntimeError,
    reason: "The extension runtime reported an unexpected error.",
    remedy: "Inspect the raw error text for details.",
    triggers: &[],
};

const APPLICATION: Rule = Rule {
    code: ErrorCode::ApplicationError,
    reason: "The receiving handler reported an error.",
    remedy: "Inspect the receiving context's logs for the handler failure.",
    triggers: &[],
};

/// Classifies the raw failure text reported by a transport
pub fn classify(raw: &str) -> ClassifiedError {
    let haystack = raw.to_lowercase();

    RULES
        .iter()
        .find(|rule| rule.matches(&haystack))
        .unwrap_or(&FALLBACK)
        .classified()
}
