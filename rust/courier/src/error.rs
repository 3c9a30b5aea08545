use thiserror::Error;

use crate::{ClassifiedError, Destination, ErrorCode};

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum CourierError {
    /// No host messaging API exists in this context
    #[error(
        "No extension messaging transport is available in this context; \
         messages can only be exchanged where the runtime messaging API exists"
    )]
    TransportUnavailable,

    /// The transport could not deliver an envelope or its reply
    #[error(
        "Failed to deliver \"{topic}\" to {destination}: {reason} {remedy} (raw error: {raw})",
        reason = .classified.reason,
        remedy = .classified.remedy
    )]
    Delivery {
        /// The topic of the failed send
        topic: String,
        /// Where the send was routed
        destination: Destination,
        /// The category of the failure
        classified: ClassifiedError,
        /// The text the transport reported
        raw: String,
    },

    /// The receiving handler failed. Only its message crosses the context
    /// boundary.
    #[error("{message}")]
    Application {
        /// The topic of the failed send
        topic: String,
        /// The handler's error message
        message: String,
    },

    /// A payload or reply did not match the channel's types
    #[error("Could not convert a payload for \"{topic}\": {message}")]
    Serialization {
        /// The topic the payload belongs to
        topic: String,
        /// What went wrong
        message: String,
    },
}

impl CourierError {
    /// The classification of this error, when it has one
    pub fn classification(&self) -> Option<ClassifiedError> {
        match self {
            CourierError::Delivery { classified, .. } => Some(*classified),
            CourierError::Application { .. } => Some(ClassifiedError::application()),
            _ => None,
        }
    }

    /// Shorthand for the code of [`CourierError::classification`]
    pub fn code(&self) -> Option<ErrorCode> {
        self.classification().map(|classified| classified.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify;

    #[test]
    fn it_composes_a_diagnosable_delivery_message() {
        let raw = "Could not establish connection. Receiving end does not exist.";
        let error = CourierError::Delivery {
            topic: "settings/get".into(),
            destination: Destination::Process(4),
            classified: classify(raw),
            raw: raw.into(),
        };
        let message = error.to_string();

        assert!(message.contains("\"settings/get\""));
        assert!(message.contains("process 4"));
        assert!(message.contains(classify(raw).reason));
        assert!(message.contains(classify(raw).remedy));
        assert!(message.contains(raw));
        assert_eq!(error.code(), Some(ErrorCode::NoReceiver));
    }

    #[test]
    fn it_keeps_only_the_application_message() {
        let error = CourierError::Application {
            topic: "settings/get".into(),
            message: "X".into(),
        };

        assert_eq!(error.to_string(), "X");
        assert_eq!(error.code(), Some(ErrorCode::ApplicationError));
    }

    #[test]
    fn it_leaves_capability_errors_unclassified() {
        assert_eq!(CourierError::TransportUnavailable.code(), None);
    }
}
