//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

use crate::packet::DecodeError;
use crate::types::PortHandle;

// lacpd errors.
#[derive(Debug)]
pub enum Error {
    // I/O errors
    IoError(PortHandle, IoError),
    // Inter-task communication
    PortNotFound(PortHandle),
    // Packet input
    PduDecodeError(PortHandle, DecodeError),
    // Data-plane programming
    DataplaneError(PortHandle, String),
}

// lacpd I/O errors.
#[derive(Debug)]
pub enum IoError {
    SocketError(std::io::Error),
    RecvError(std::io::Error),
    SendError(std::io::Error),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::IoError(port, error) => {
                error.log(*port);
            }
            Error::PortNotFound(port) => {
                warn!(%port, "{}", self);
            }
            Error::PduDecodeError(port, error) => {
                warn!(%port, error = %with_source(error), "{}", self);
            }
            Error::DataplaneError(port, reason) => {
                warn!(%port, %reason, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(_, error) => error.fmt(f),
            Error::PortNotFound(..) => {
                write!(f, "port not found")
            }
            Error::PduDecodeError(..) => {
                write!(f, "failed to decode received PDU")
            }
            Error::DataplaneError(..) => {
                write!(f, "data-plane programming call failed")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(_, error) => Some(error),
            Error::PduDecodeError(_, error) => Some(error),
            _ => None,
        }
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self, port: PortHandle) {
        match self {
            IoError::SocketError(error) => {
                warn!(%port, error = %with_source(error), "{}", self);
            }
            IoError::RecvError(error) => {
                warn!(%port, error = %with_source(error), "{}", self);
            }
            IoError::SendError(error) => {
                warn!(%port, error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::SocketError(..) => {
                write!(f, "failed to create raw socket")
            }
            IoError::RecvError(..) => {
                write!(f, "failed to receive frame")
            }
            IoError::SendError(..) => {
                write!(f, "failed to send frame")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::SocketError(error)
            | IoError::RecvError(error)
            | IoError::SendError(error) => Some(error),
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
