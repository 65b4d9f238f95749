//! The receive pipeline: ordered per-source decoding, 20ms mixing, and delivery.
//!
//! Packets enter through [`Arrivals::ingest`], which wraps them as
//! [`RawVoicePacket`]s bound to their source's [`DecoderSlot`]. The
//! [`FrameAggregator`] drains them once per tick, decoding each source in
//! sequence order and summing included users into a [`CombinedFrame`]. All
//! output reaches the application through an [`AudioReceiveHandler`].

mod aggregator;
mod arrivals;
mod audio;
mod decoder;
mod dispatch;
mod mix;
mod packet;
mod sequence;
mod ssrc;

pub use self::{
    aggregator::FrameAggregator,
    arrivals::Arrivals,
    audio::{pcm_to_bytes, AudioFormat, UserAudioFrame, OUTPUT_FORMAT},
    decoder::{
        opus_decoder_factory,
        DecoderFactory,
        DecoderSlot,
        OpusVoiceDecoder,
        SlotStats,
        VoiceDecoder,
    },
    dispatch::{AudioReceiveHandler, Capabilities, Dispatcher, NullHandler},
    mix::{mix_into, CombinedFrame, Mixdown},
    packet::{DecodedFrame, InboundPacket, RawVoicePacket},
    sequence::{SequenceOrder, SequenceTracker},
    ssrc::SsrcTracker,
};
