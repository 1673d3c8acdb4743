//! Error taxonomy shared by the configuration layer and both workers.

use thiserror::Error;

/// Errors raised while loading configuration or driving a worker.
#[derive(Error, Debug)]
pub enum LoadError {
    /// A required property is absent from every loaded file
    #[error("Property [{key}] not found")]
    MissingProperty { key: String },

    /// A property is present but unusable, or a file could not be read
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Token endpoint unreachable, rejected the request, or answered garbage
    #[error("Credential error: {message}")]
    Credential { message: String },

    /// Broker connection, channel or subscription failure
    #[error("Transport error ({context}): {message}")]
    Transport {
        context: &'static str,
        message: String,
    },

    /// A single message could not be handed to the broker
    #[error("Publish of message {sequence} failed: {message}")]
    Publish { sequence: u64, message: String },
}

pub type Result<T> = std::result::Result<T, LoadError>;

impl LoadError {
    pub fn configuration(message: impl Into<String>) -> Self {
        LoadError::Configuration {
            message: message.into(),
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        LoadError::Credential {
            message: message.into(),
        }
    }

    pub fn transport(context: &'static str, err: impl std::fmt::Display) -> Self {
        LoadError::Transport {
            context,
            message: err.to_string(),
        }
    }

    /// True for errors that must stop the process before any network activity.
    #[cfg(test)]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LoadError::MissingProperty { .. } | LoadError::Configuration { .. }
        )
    }
}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        LoadError::credential(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_property_names_the_key() {
        let err = LoadError::MissingProperty {
            key: "rabbitmq.url".to_string(),
        };
        assert_eq!(err.to_string(), "Property [rabbitmq.url] not found");
        assert!(err.is_configuration());
    }

    #[test]
    fn worker_errors_are_not_configuration_errors() {
        assert!(!LoadError::credential("no token").is_configuration());
        assert!(!LoadError::transport("connect", "refused").is_configuration());
        let publish = LoadError::Publish {
            sequence: 4,
            message: "channel closed".to_string(),
        };
        assert_eq!(
            publish.to_string(),
            "Publish of message 4 failed: channel closed"
        );
    }
}
