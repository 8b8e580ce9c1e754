use discuss_protocol::ErrorCode;
use thiserror::Error;

/// Process-level failures (startup, bind, configuration).
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP server error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of a single client request. Local to the requesting connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("room not found")]
    RoomNotFound,

    #[error("room is full")]
    RoomFull,

    #[error("wrong password")]
    WrongPassword,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Non-owner kick. Never reported to the client.
    #[error("not permitted")]
    Unauthorized,

    /// The connection went away while the request was in flight.
    #[error("connection closed")]
    NotConnected,
}

impl CoordinatorError {
    /// Wire reason code, or `None` for errors that are dropped silently.
    pub fn reason(&self) -> Option<ErrorCode> {
        match self {
            CoordinatorError::RoomNotFound => Some(ErrorCode::RoomNotFound),
            CoordinatorError::RoomFull => Some(ErrorCode::RoomFull),
            CoordinatorError::WrongPassword => Some(ErrorCode::WrongPassword),
            CoordinatorError::InvalidInput(_) => Some(ErrorCode::InvalidInput),
            CoordinatorError::Unauthorized | CoordinatorError::NotConnected => None,
        }
    }
}
