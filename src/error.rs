use thiserror::Error;

/// Handshake failures. Fatal to startup; the whole handshake must be restarted.
#[derive(Debug, Error)]
pub(crate) enum ConnectError {
    #[error("could not get a response at {0}")]
    NoResponse(String),
    #[error("was not assigned a PHP session ID")]
    NoSession,
    #[error("could not obtain a client ID")]
    NoClientId,
    #[error("could not get a room ID")]
    NoRoomId,
}

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),
    #[error("Chat server error: {0}")]
    Chat(String),
    #[error("Handler error: {0}")]
    Handler(String),
    #[error("Mail error: {0}")]
    Mail(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Other(String),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Other(s.to_string())
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(e: lettre::error::Error) -> Self {
        AppError::Mail(e.to_string())
    }
}

impl From<lettre::address::AddressError> for AppError {
    fn from(e: lettre::address::AddressError) -> Self {
        AppError::Mail(e.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for AppError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        AppError::Mail(e.to_string())
    }
}
