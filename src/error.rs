//! Error types for the relay and supervisor

use std::io;
use thiserror::Error;

/// Which relay a stream error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Output,
    Input,
}

impl std::fmt::Display for RelayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayKind::Output => write!(f, "output relay"),
            RelayKind::Input => write!(f, "input relay"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// The child process could not be started
    #[error("failed to launch `{executable}`: {source}")]
    Launch {
        executable: String,
        #[source]
        source: anyhow::Error,
    },

    /// Reading or writing one of the child's streams failed mid-run
    #[error("{relay} stream failure: {source}")]
    Stream {
        relay: RelayKind,
        #[source]
        source: io::Error,
    },

    /// A forwarded command could not be written to the child
    #[error("failed to forward `{command}` to the child: {source}")]
    Write {
        command: String,
        #[source]
        source: io::Error,
    },

    /// A write was attempted after the input relay was stopped
    #[error("input relay is stopped")]
    Stopped,

    /// The child handle no longer owns the requested stream
    #[error("child {0} stream already taken")]
    StreamTaken(&'static str),
}

pub type Result<T> = std::result::Result<T, RelayError>;
