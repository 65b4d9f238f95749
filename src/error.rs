//! Receive pipeline error handling.

use audiopus::Error as OpusError;
use std::{error::Error as StdError, fmt};

/// Convenience type for receive pipeline error handling.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
#[non_exhaustive]
/// Errors raised by misuse of a [`RawVoicePacket`] or its decoder state.
///
/// None of these are fatal to a voice connection: each fails only the call
/// which raised it.
///
/// [`RawVoicePacket`]: crate::receive::RawVoicePacket
pub enum Error {
    /// Decoding was attempted on a packet which does not directly follow
    /// the last packet decoded for its source.
    ///
    /// Opus decoder state is predictive, so decoding out of order would desync it.
    /// Callers must check [`RawVoicePacket::is_in_order`] first.
    ///
    /// [`RawVoicePacket::is_in_order`]: crate::receive::RawVoicePacket::is_in_order
    OutOfOrder {
        /// The next sequence number the decoder slot will accept.
        expected: u16,
        /// The sequence number of the rejected packet.
        received: u16,
    },
    /// PCM conversion was requested for a packet whose audio failed to decode.
    MissingAudio,
    /// A new decoder could not be created or reset.
    Codec(CodecError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfOrder { expected, received } => write!(
                f,
                "packet {} decoded out of order (expected {})",
                received, expected
            ),
            Error::MissingAudio => write!(f, "no decoded audio available for conversion"),
            Error::Codec(e) => write!(f, "codec failure: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<OpusError> for Error {
    fn from(e: OpusError) -> Self {
        Error::Codec(CodecError::Opus(e))
    }
}

#[derive(Debug)]
#[non_exhaustive]
/// Failure reported by a [`VoiceDecoder`].
///
/// [`VoiceDecoder`]: crate::receive::VoiceDecoder
pub enum CodecError {
    /// Error returned by libopus.
    Opus(OpusError),
    /// The encoded frame was malformed, or larger than the Opus maximum.
    IllegalVoicePacket,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Opus(e) => write!(f, "opus error: {}", e),
            CodecError::IllegalVoicePacket => write!(f, "illegal voice packet"),
        }
    }
}

impl StdError for CodecError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            CodecError::Opus(e) => Some(e),
            CodecError::IllegalVoicePacket => None,
        }
    }
}

impl From<OpusError> for CodecError {
    fn from(e: OpusError) -> Self {
        CodecError::Opus(e)
    }
}

#[cfg(feature = "driver")]
pub use crate::driver::tasks::error::{Error as DriverError, Result as DriverResult};
