use std::time::Duration;

use thiserror::Error;

use crate::proto::reply::ReplyError;

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Port could not be opened.
    #[error("open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    /// Read or write failed at the OS level.
    #[error("serial transport: {0}")]
    Transport(#[from] std::io::Error),
    #[error("controller not ready: channel closed or session not begun")]
    NotReady,
    #[error("session already begun")]
    AlreadyBegun,
    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),
    #[error("malformed reply: {0}")]
    Malformed(#[from] ReplyError),
}

impl ControllerError {
    /// Open and I/O failures are both fatal to the session.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Transport(_))
    }
}
