use std::time::Duration;
use thiserror::Error;

use crate::protocol::ProtocolError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("hardware initialisation failed: {0}")]
    InitFailure(#[from] InitFailure),
    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{component} did not stop within {waited:?}")]
    ShutdownTimeout {
        component: String,
        waited: Duration,
    },
    #[error(transparent)]
    Gateway(#[from] GatewayFault),
    #[error("{component} panicked")]
    WorkerPanicked { component: String },
    #[error("panel dimensions must be non-zero, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A write or read addressed a cell outside of the panel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("pixel ({x}, {y}) is outside of the {width}x{height} panel")]
pub struct OutOfRange {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InitFailure(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("panel fault: {0}")]
pub struct GatewayFault(pub String);
