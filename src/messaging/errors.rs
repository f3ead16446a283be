//! # Messaging Error Types
//!
//! Structured error handling for the transport layer using thiserror
//! instead of `Box<dyn Error>` patterns.

use crate::config::ConfigurationError;
use crate::resilience::CircuitBreakerError;
use thiserror::Error;

/// Messaging error taxonomy
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("Invalid argument '{parameter}': {message}")]
    InvalidArgument { parameter: String, message: String },

    #[error("Message send failure on queue '{queue_name}': {message}")]
    MessageSendFailure {
        queue_name: String,
        message: String,
        #[source]
        source: Box<MessagingError>,
    },

    #[error("Message serialization error: {message}")]
    MessageSerialization { message: String },

    #[error("Message deserialization error: {message}")]
    MessageDeserialization { message: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Channel operation failed: {queue_name}: {operation}: {message}")]
    ChannelOperation {
        queue_name: String,
        operation: String,
        message: String,
    },

    #[error("Circuit breaker is open for component: {component}")]
    CircuitBreakerOpen { component: String },

    #[error("Handler '{handler}' failed for message type '{message_type}': {message}")]
    HandlerFailed {
        handler: String,
        message_type: String,
        message: String,
    },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Internal messaging error: {message}")]
    Internal { message: String },
}

impl MessagingError {
    /// Create an invalid argument error naming the offending parameter
    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a send failure wrapping the error that caused it
    pub fn message_send_failure(
        queue_name: impl Into<String>,
        message: impl Into<String>,
        source: MessagingError,
    ) -> Self {
        Self::MessageSendFailure {
            queue_name: queue_name.into(),
            message: message.into(),
            source: Box::new(source),
        }
    }

    /// Create a message serialization error
    pub fn message_serialization(message: impl Into<String>) -> Self {
        Self::MessageSerialization {
            message: message.into(),
        }
    }

    /// Create a message deserialization error
    pub fn message_deserialization(message: impl Into<String>) -> Self {
        Self::MessageDeserialization {
            message: message.into(),
        }
    }

    /// Create a malformed payload error
    pub fn malformed_payload(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    /// Create a channel operation error
    pub fn channel_operation(
        queue_name: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ChannelOperation {
            queue_name: queue_name.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a circuit breaker open error
    pub fn circuit_breaker_open(component: impl Into<String>) -> Self {
        Self::CircuitBreakerOpen {
            component: component.into(),
        }
    }

    /// Create a handler failure error
    pub fn handler_failed(
        handler: impl Into<String>,
        message_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::HandlerFailed {
            handler: handler.into(),
            message_type: message_type.into(),
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this is a send failure surfaced by the transport manager
    pub fn is_send_failure(&self) -> bool {
        matches!(self, Self::MessageSendFailure { .. })
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() {
            MessagingError::message_deserialization(err.to_string())
        } else {
            MessagingError::message_serialization(err.to_string())
        }
    }
}

/// Conversion from circuit breaker errors
impl From<CircuitBreakerError<MessagingError>> for MessagingError {
    fn from(err: CircuitBreakerError<MessagingError>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen { component } => {
                MessagingError::circuit_breaker_open(component)
            }
            CircuitBreakerError::OperationFailed(inner) => inner,
        }
    }
}

impl From<ConfigurationError> for MessagingError {
    fn from(err: ConfigurationError) -> Self {
        MessagingError::configuration("transport", err.to_string())
    }
}

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;
