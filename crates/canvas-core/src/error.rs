//! Client error taxonomy.

/// Errors surfaced by the tree client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    #[error("socket not connected")]
    NotConnected,

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("config store unavailable")]
    HostUnavailable,

    #[error("config store error: {0}")]
    Config(String),

    #[error("invalid server payload: {0}")]
    Decode(String),

    #[error("cancelled by user")]
    Cancelled,

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("{0}")]
    Refused(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Message shown in the page-level error banner.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(_) => {
                "Authentication failed. Please check your auth token configuration.".to_string()
            }
            Self::HostUnavailable => {
                "Configuration store is not available. Please restart the application.".to_string()
            }
            Self::NotConnected => "Not connected to the server.".to_string(),
            Self::Cancelled => "Operation cancelled.".to_string(),
            Self::Rejected { message, .. } | Self::Refused(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            return Self::Auth(err.to_string());
        }
        if err.is_timeout() {
            return Self::Timeout("http response".to_string());
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<rust_socketio::Error> for ClientError {
    fn from(err: rust_socketio::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_get_a_dedicated_banner() {
        let err = ClientError::Auth("Authentication error: invalid token".into());
        assert!(err.is_auth());
        assert!(err.user_message().starts_with("Authentication failed"));

        let err = ClientError::Network("connection refused".into());
        assert!(!err.is_auth());
        assert_eq!(err.user_message(), "network error: connection refused");
    }

    #[test]
    fn rejected_surfaces_server_message() {
        let err = ClientError::rejected("remove canvas", "Canvas not found");
        assert_eq!(err.user_message(), "Canvas not found");
        assert_eq!(err.to_string(), "server rejected remove canvas: Canvas not found");
    }
}
