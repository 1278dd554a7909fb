//! Error types for listener operations
//!
//! Three classes matter to the receive loop: configuration problems and
//! connection failures end the affected listener, decode failures only skip
//! the offending message.

use crate::broker::{BrokerError, MessageField};
use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for listener operations
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Listener '{listener}' does not implement a receive loop")]
    Unimplemented { listener: String },

    #[error("Connection error: {0}")]
    Connection(#[from] BrokerError),

    #[error("Failed to decode message {field} as UTF-8: {source}")]
    Decode {
        field: MessageField,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ListenerError {
    /// Create configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Configuration error for a listener used without a subscribe topic
    pub fn missing_topic(listener: &str) -> Self {
        Self::configuration(format!("listener '{listener}' has no subscribe topic"))
    }

    /// Create unimplemented error
    pub fn unimplemented<S: Into<String>>(listener: S) -> Self {
        Self::Unimplemented {
            listener: listener.into(),
        }
    }

    /// Per-message faults: the receive loop skips the message and continues
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ListenerError::Decode { .. })
    }

    /// Failures a reconnect could cure
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ListenerError::Connection(_))
    }
}

/// Result type for listener operations
pub type ListenerResult<T> = Result<T, ListenerError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8_error() -> std::str::Utf8Error {
        let bytes = vec![0xffu8];
        std::str::from_utf8(&bytes).unwrap_err()
    }

    #[test]
    fn test_missing_topic_is_configuration_error() {
        let error = ListenerError::missing_topic("base");
        assert!(matches!(error, ListenerError::Configuration { .. }));
        assert_eq!(
            error.to_string(),
            "Configuration error: listener 'base' has no subscribe topic"
        );
    }

    #[test]
    fn test_unimplemented_constructor() {
        let error = ListenerError::unimplemented("base");
        assert!(matches!(error, ListenerError::Unimplemented { .. }));
        assert!(error.to_string().contains("base"));
    }

    #[test]
    fn test_only_decode_errors_are_recoverable() {
        let decode = ListenerError::Decode {
            field: MessageField::Payload,
            source: utf8_error(),
        };
        assert!(decode.is_recoverable());
        assert!(!decode.is_connection_error());

        let connection = ListenerError::from(BrokerError::ConnectionLost("reset".to_string()));
        assert!(!connection.is_recoverable());
        assert!(connection.is_connection_error());

        assert!(!ListenerError::missing_topic("x").is_recoverable());
        assert!(!ListenerError::unimplemented("x").is_recoverable());
    }

    #[test]
    fn test_decode_error_names_field() {
        let error = ListenerError::Decode {
            field: MessageField::Channel,
            source: utf8_error(),
        };
        assert!(error
            .to_string()
            .starts_with("Failed to decode message channel as UTF-8"));
    }

    #[test]
    fn test_broker_error_converts_to_connection_error() {
        let error: ListenerError = BrokerError::StreamClosed {
            channel: "ws-hub:client-new".to_string(),
        }
        .into();
        assert!(error.to_string().contains("ws-hub:client-new"));
    }
}
