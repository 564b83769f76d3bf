use thiserror::Error;

/// ACK code sent by the daemon when a song, playlist or id does not exist.
pub const ACK_ERROR_NO_EXIST: u32 = 50;

#[derive(Error, Debug)]
pub enum MpdError {
    #[error("MPD unavailable at {0}")]
    Unavailable(String),
    #[error("MPD I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MPD command timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("MPD protocol error: {0}")]
    Protocol(String),
    // ACK [code@index] {command} message
    #[error("{message}")]
    Command {
        code: u32,
        command: String,
        message: String,
    },
}

impl MpdError {
    pub fn protocol(message: impl Into<String>) -> Self {
        MpdError::Protocol(message.into())
    }

    /// `true` when the daemon itself rejected the command.
    pub fn is_command(&self) -> bool {
        matches!(self, MpdError::Command { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MpdError::Command { code, .. } if *code == ACK_ERROR_NO_EXIST)
    }

    /// Errors after which the connection can no longer be trusted.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            MpdError::Io(_) | MpdError::Timeout(_) | MpdError::Protocol(_)
        )
    }
}

pub type MpdResult<T> = Result<T, MpdError>;
