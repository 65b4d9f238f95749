#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Warbler is a receive-side voice audio pipeline, written in Rust.
//!
//! Given a stream of Opus-encoded voice packets from many speakers at once, warbler:
//!  * keeps one decoder per speaking source (SSRC), fed strictly in sequence order,
//!  with optional resynchronisation after packet loss;
//!  * decodes each packet at most once, however many consumers read it;
//!  * mixes all included speakers into one combined frame every 20ms, emitting
//!  silence when nobody is speaking so recordings stay gap-free;
//!  * and delivers raw packets, per-user audio, and combined audio to an
//!  [`AudioReceiveHandler`] as 48kHz, 16-bit, big-endian stereo.
//!
//! With the default `"driver"` feature, a [`VoiceReceiver`] can also read
//! and decrypt packets directly from a voice UDP socket.
//!
//! ## Codec support
//! Opus support is provided by [audiopus] (an FFI wrapper for libopus). Other
//! decoders may be supplied through [`Config::decoder_factory`].
//!
//! [audiopus]: https://github.com/lakelezz/audiopus
//! [`AudioReceiveHandler`]: receive::AudioReceiveHandler

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
)]

mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod id;
pub mod model;
pub mod receive;
#[cfg(test)]
pub(crate) mod test_utils;

#[cfg(feature = "driver")]
pub use discortp as packet;

pub use crate::{
    config::Config,
    driver::VoiceReceiver,
    receive::{AudioReceiveHandler, CombinedFrame, InboundPacket, RawVoicePacket, UserAudioFrame},
};
