use super::{audio, DecoderSlot};
use crate::{
    error::{Error, Result},
    id::UserId,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

/// Voice frame fields supplied by the socket layer for one datagram.
///
/// RTP framing is already parsed, and the payload decrypted, by this point.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InboundPacket {
    /// RTP sequence number.
    pub sequence: u16,
    /// RTP timestamp, in 48kHz sample units.
    pub timestamp: u32,
    /// RTP synchronisation source of the sender.
    pub ssrc: u32,
    /// Opus-encoded audio.
    pub payload: Bytes,
}

impl InboundPacket {
    /// Bundles the header fields and encoded payload of one voice datagram.
    pub fn new(sequence: u16, timestamp: u32, ssrc: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            timestamp,
            ssrc,
            payload: payload.into(),
        }
    }
}

/// One decoded frame of interleaved 16-bit stereo PCM.
///
/// Clones share the same sample buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedFrame {
    samples: Arc<[i16]>,
}

impl DecodedFrame {
    pub(crate) fn new(samples: Vec<i16>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    /// Interleaved (`L, R, L, R, ...`) samples of this frame.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Converts this frame to big-endian bytes, scaling each sample by `volume`.
    pub fn audio_data(&self, volume: f64) -> Vec<u8> {
        audio::pcm_to_bytes(&self.samples, volume)
    }

    /// Returns whether both frames are views of the same decode result.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// A single received Opus frame, its RTP metadata, and the user who sent it.
///
/// Packets are immutable once built. Decoding is lazy and cached: the first call to
/// [`Self::decode`] runs the source's codec, and every later call (from any thread)
/// sees that same outcome without touching the codec again.
#[derive(Debug)]
pub struct RawVoicePacket {
    sequence: u16,
    timestamp: u32,
    ssrc: u32,
    user_id: UserId,
    audio: Bytes,
    slot: Arc<DecoderSlot>,
    decoded: Mutex<Option<Option<DecodedFrame>>>,
}

impl RawVoicePacket {
    /// Wraps an inbound frame, attaching the decoder slot for its source.
    pub fn new(packet: InboundPacket, user_id: UserId, slot: Arc<DecoderSlot>) -> Self {
        Self {
            sequence: packet.sequence,
            timestamp: packet.timestamp,
            ssrc: packet.ssrc,
            user_id,
            audio: packet.payload,
            slot,
            decoded: Mutex::new(None),
        }
    }

    /// RTP sequence number of this packet.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// RTP timestamp of this packet.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Synchronisation source which sent this packet.
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Sender of this packet, or [`UserId::UNKNOWN`] if its SSRC was unmapped on arrival.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// A fresh copy of the encoded Opus audio.
    pub fn opus_audio(&self) -> Vec<u8> {
        self.audio.to_vec()
    }

    /// Length of the encoded Opus audio, in bytes.
    pub fn opus_len(&self) -> usize {
        self.audio.len()
    }

    /// The decoder slot of this packet's source.
    pub fn slot(&self) -> &Arc<DecoderSlot> {
        &self.slot
    }

    /// Returns whether this packet may be decoded now without desyncing its source.
    ///
    /// Always true once the packet has been decoded (or failed to decode).
    pub fn is_in_order(&self) -> bool {
        self.decoded.lock().is_some() || self.slot.is_in_order(self.sequence)
    }

    /// Returns whether a decode has been attempted on this packet.
    pub fn is_decoded(&self) -> bool {
        self.decoded.lock().is_some()
    }

    /// Decodes this packet's audio, or returns the cached result of an earlier decode.
    ///
    /// `Ok(None)` means the codec rejected the payload: treat this as silence.
    /// Fails with [`Error::OutOfOrder`] if no decode has happened yet and the packet
    /// does not directly follow the last packet decoded from its source.
    pub fn decode(&self) -> Result<Option<DecodedFrame>> {
        let mut cache = self.decoded.lock();

        if let Some(result) = cache.as_ref() {
            return Ok(result.clone());
        }

        let result = self
            .slot
            .decode(self.sequence, &self.audio)?
            .map(DecodedFrame::new);

        *cache = Some(result.clone());

        Ok(result)
    }

    /// Decodes this packet (see [`Self::decode`]) and converts its audio to
    /// big-endian bytes, scaled by `volume`.
    ///
    /// Fails with [`Error::MissingAudio`] if the payload could not be decoded.
    pub fn audio_data(&self, volume: f64) -> Result<Vec<u8>> {
        self.decode()?
            .map(|frame| frame.audio_data(volume))
            .ok_or(Error::MissingAudio)
    }
}
