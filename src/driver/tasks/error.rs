use crate::error::Error as ReceiveError;
use std::{
    error::Error as StdError,
    fmt,
    io::{Error as IoError, ErrorKind as IoErrorKind},
};
use xsalsa20poly1305::aead::Error as CryptoError;

/// Convenience type for socket task error handling.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors encountered while reading voice traffic from a socket.
///
/// None of these are fatal to the pipeline: a bad datagram is dropped, and
/// only the loss of the socket itself stops its task.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Decryption failed, or a supplied key had the wrong length.
    Crypto(CryptoError),
    /// Received an illegal voice packet on the voice UDP socket.
    IllegalVoicePacket,
    /// Socket-level failure.
    Io(IoError),
    /// The packet was valid, but could not be handed to the pipeline.
    Receive(ReceiveError),
}

impl Error {
    // This prevents a `WouldBlock` from stopping the task,
    // instead simply dropping the packet.
    pub(crate) fn disarm_would_block(self) -> Result<()> {
        match self {
            Self::Io(i) if i.kind() == IoErrorKind::WouldBlock => Ok(()),
            e => Err(e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Crypto(_) => write!(f, "packet decryption failed"),
            Error::IllegalVoicePacket => write!(f, "illegal voice packet"),
            Error::Io(e) => write!(f, "i/o failure: {}", e),
            Error::Receive(e) => write!(f, "failed to ingest packet: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Receive(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CryptoError> for Error {
    fn from(e: CryptoError) -> Self {
        Error::Crypto(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<ReceiveError> for Error {
    fn from(e: ReceiveError) -> Error {
        Error::Receive(e)
    }
}
