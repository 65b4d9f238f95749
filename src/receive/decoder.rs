use super::sequence::{SequenceOrder, SequenceTracker};
use crate::{
    constants::{CHANNEL_COUNT, MONO_FRAME_SIZE, SAMPLE_RATE},
    error::{CodecError, Error, Result},
};
use audiopus::{
    coder::Decoder as OpusDecoder,
    packet::{self as opus_packet, Packet as OpusPacket},
    Channels,
    MutSignals,
};
use derivative::Derivative;
use parking_lot::Mutex;
use std::{convert::TryInto, num::NonZeroU16, sync::Arc, time::Instant};
use tracing::{debug, error, trace, warn};

/// Samples per channel in the longest legal Opus packet (120ms).
const MAX_PACKET_SAMPLES: usize = 6 * MONO_FRAME_SIZE;

/// Codec state for a single audio source.
///
/// Implementations carry predictive state between calls, and so must be fed
/// each source's frames exactly once and in sequence order.
pub trait VoiceDecoder: Send {
    /// Decodes one encoded frame into interleaved 16-bit stereo PCM.
    fn decode(&mut self, payload: &[u8]) -> std::result::Result<Vec<i16>, CodecError>;

    /// Discards all predictive state, as though newly created.
    fn reset(&mut self) -> std::result::Result<(), CodecError>;
}

/// Constructor for per-source decoders, called once for each new decoder slot.
pub type DecoderFactory =
    Arc<dyn Fn() -> std::result::Result<Box<dyn VoiceDecoder>, CodecError> + Send + Sync>;

/// Returns a factory producing 48kHz stereo libopus decoders.
pub fn opus_decoder_factory() -> DecoderFactory {
    Arc::new(|| {
        OpusVoiceDecoder::new().map(|d| Box::new(d) as Box<dyn VoiceDecoder>)
    })
}

/// [`VoiceDecoder`] backed by libopus.
///
/// Packets holding more than 20ms of audio (up to the Opus limit of 120ms)
/// decode to proportionally longer output.
#[derive(Debug)]
pub struct OpusVoiceDecoder {
    decoder: OpusDecoder,
}

impl OpusVoiceDecoder {
    /// Creates a 48kHz stereo decoder.
    pub fn new() -> std::result::Result<Self, CodecError> {
        Ok(Self {
            decoder: OpusDecoder::new(SAMPLE_RATE, Channels::Stereo)?,
        })
    }
}

impl VoiceDecoder for OpusVoiceDecoder {
    fn decode(&mut self, payload: &[u8]) -> std::result::Result<Vec<i16>, CodecError> {
        // The TOC byte states the packet's duration: size the buffer from that
        // rather than guessing.
        let samples = opus_packet::nb_samples(payload.try_into()?, SAMPLE_RATE)?;
        if samples > MAX_PACKET_SAMPLES {
            error!("Received packet larger than Opus standard maximum.");
            return Err(CodecError::IllegalVoicePacket);
        }

        let mut out = vec![0i16; CHANNEL_COUNT * samples];

        let packet: OpusPacket<'_> = payload.try_into()?;
        let signals: MutSignals<'_, i16> = (&mut out[..]).try_into()?;
        let decoded = self.decoder.decode(Some(packet), signals, false)?;

        // Sample count is per channel.
        out.truncate(CHANNEL_COUNT * decoded);

        Ok(out)
    }

    fn reset(&mut self) -> std::result::Result<(), CodecError> {
        self.decoder = OpusDecoder::new(SAMPLE_RATE, Channels::Stereo)?;
        Ok(())
    }
}

/// Running counts of decode outcomes for one source.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SlotStats {
    /// Frames decoded successfully.
    pub decoded: u64,
    /// Frames the codec could not decode.
    pub failed: u64,
    /// Packets refused for arriving out of order.
    pub rejected: u64,
    /// Times the slot re-baselined after a run of skipped packets.
    pub resyncs: u64,
}

#[derive(Derivative)]
#[derivative(Debug)]
struct SlotState {
    tracker: SequenceTracker,
    #[derivative(Debug = "ignore")]
    decoder: Box<dyn VoiceDecoder>,
    resync_threshold: Option<NonZeroU16>,
    rejected_run: u16,
    last_active: Instant,
    stats: SlotStats,
}

/// Decode state for one audio source (SSRC): a codec instance plus the
/// [`SequenceTracker`] which gates it.
///
/// A slot outlives the packets which reference it, persisting for as long as
/// its source remains in the call. Slots are created and disposed through the
/// [`SsrcTracker`].
///
/// [`SsrcTracker`]: super::SsrcTracker
#[derive(Debug)]
pub struct DecoderSlot {
    ssrc: u32,
    state: Mutex<SlotState>,
}

impl DecoderSlot {
    /// Wraps a decoder for source `ssrc`.
    ///
    /// See [`Config::resync_threshold`] for the meaning of `resync_threshold`.
    ///
    /// [`Config::resync_threshold`]: crate::Config::resync_threshold
    pub fn new(
        ssrc: u32,
        decoder: Box<dyn VoiceDecoder>,
        resync_threshold: Option<NonZeroU16>,
    ) -> Self {
        Self {
            ssrc,
            state: Mutex::new(SlotState {
                tracker: SequenceTracker::new(),
                decoder,
                resync_threshold,
                rejected_run: 0,
                last_active: Instant::now(),
                stats: SlotStats::default(),
            }),
        }
    }

    /// The source this slot decodes for.
    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Returns whether a packet numbered `sequence` may be decoded next.
    pub fn is_in_order(&self, sequence: u16) -> bool {
        self.state.lock().tracker.is_in_order(sequence)
    }

    /// Places `sequence` relative to the next packet this slot expects.
    pub fn classify(&self, sequence: u16) -> SequenceOrder {
        self.state.lock().tracker.classify(sequence)
    }

    /// Sequence number of the last frame decoded by this slot.
    pub fn last_sequence(&self) -> Option<u16> {
        self.state.lock().tracker.last_sequence()
    }

    /// Records that the packet numbered `sequence` could not be decoded in order.
    ///
    /// Returns `true` if this triggered a resync, after which `sequence` is in order.
    pub fn note_out_of_order(&self, sequence: u16) -> bool {
        let mut state = self.state.lock();

        let order = state.tracker.classify(sequence);
        if order == SequenceOrder::InOrder {
            return true;
        }

        state.stats.rejected += 1;

        if order == SequenceOrder::Behind {
            trace!("SSRC {}: late or duplicate packet {}.", self.ssrc, sequence);
            return false;
        }

        state.rejected_run = state.rejected_run.saturating_add(1);

        let threshold = match state.resync_threshold {
            Some(t) => t.get(),
            None => return false,
        };

        if state.rejected_run < threshold {
            return false;
        }

        debug!(
            "SSRC {}: resyncing decoder at {} after {} skipped packets.",
            self.ssrc, sequence, state.rejected_run
        );

        if let Err(e) = state.decoder.reset() {
            warn!("SSRC {}: failed to reset decoder: {}.", self.ssrc, e);
        }
        state.tracker.resync(sequence);
        state.rejected_run = 0;
        state.stats.resyncs += 1;

        true
    }

    /// Runs the codec over one in-order frame.
    ///
    /// Codec failures are logged and reported as `Ok(None)`; only an ordering
    /// violation is an error. The tracker advances on success alone.
    pub(crate) fn decode(&self, sequence: u16, payload: &[u8]) -> Result<Option<Vec<i16>>> {
        let mut state = self.state.lock();

        if !state.tracker.is_in_order(sequence) {
            return Err(Error::OutOfOrder {
                expected: state.tracker.expected().unwrap_or(sequence),
                received: sequence,
            });
        }

        state.last_active = Instant::now();

        match state.decoder.decode(payload) {
            Ok(audio) => {
                state.tracker.advance(sequence);
                state.rejected_run = 0;
                state.stats.decoded += 1;
                Ok(Some(audio))
            },
            Err(e) => {
                warn!("Decode error for SSRC {} (seq {}): {}.", self.ssrc, sequence, e);
                state.stats.failed += 1;
                Ok(None)
            },
        }
    }

    /// Clears codec and sequence state, so the next packet starts a fresh stream.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();

        state.tracker.reset();
        state.rejected_run = 0;
        state.decoder.reset()?;

        Ok(())
    }

    pub(crate) fn touch(&self) {
        self.state.lock().last_active = Instant::now();
    }

    /// Time of the most recent packet arrival or decode.
    pub fn last_active(&self) -> Instant {
        self.state.lock().last_active
    }

    /// Decode outcome counters for this source.
    pub fn stats(&self) -> SlotStats {
        self.state.lock().stats
    }
}
