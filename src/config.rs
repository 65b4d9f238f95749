#[cfg(feature = "driver")]
use crate::driver::CryptoMode;
#[cfg(test)]
use crate::driver::test_config::TickStyle;
use crate::receive::{opus_decoder_factory, DecoderFactory};

use derivative::Derivative;
use std::{
    num::{NonZeroU16, NonZeroUsize},
    time::Duration,
};

/// Configuration for the receive pipeline.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub struct Config {
    #[cfg(feature = "driver")]
    /// Selected tagging mode for voice packet encryption.
    ///
    /// Defaults to [`CryptoMode::Normal`].
    ///
    /// This must match the mode negotiated with the voice server. Changes are
    /// forwarded to every socket given to [`VoiceReceiver::listen`].
    ///
    /// [`CryptoMode::Normal`]: CryptoMode::Normal
    /// [`VoiceReceiver::listen`]: crate::driver::VoiceReceiver::listen
    pub crypto_mode: CryptoMode,

    /// Configures the amount of time after a user/SSRC is inactive before their decoder state
    /// should be removed.
    ///
    /// Defaults to 1 minute.
    pub decode_state_timeout: Duration,

    /// Number of consecutive packets from one source, each arriving *ahead* of the
    /// expected sequence number, after which that source's decoder is reset and the
    /// latest such packet accepted as a new baseline.
    ///
    /// Late and duplicate packets never count towards this. If set to `None`, a
    /// source which drops a packet stays silent until its [`DecoderSlot`] is
    /// explicitly reset.
    ///
    /// Defaults to 3 packets (60ms).
    ///
    /// [`DecoderSlot`]: crate::receive::DecoderSlot
    pub resync_threshold: Option<NonZeroU16>,

    /// Configures the number of packets to buffer for each source before the oldest
    /// is discarded.
    ///
    /// One packet per source is consumed every 20ms; the buffer absorbs bursts and
    /// puts reordered packets back into sequence.
    ///
    /// Defaults to 5 packets (100ms).
    pub max_pending_frames: NonZeroUsize,

    #[derivative(Debug = "ignore")]
    /// Constructor for each source's decoder.
    ///
    /// Defaults to [`opus_decoder_factory`], creating 48kHz stereo libopus decoders.
    ///
    /// Changes apply to decoder state created after the change.
    ///
    /// [`opus_decoder_factory`]: crate::receive::opus_decoder_factory
    pub decoder_factory: DecoderFactory,

    // Test only attributes
    #[cfg(test)]
    /// Test config to offer precise control over aggregator tick rate/count.
    pub(crate) tick_style: TickStyle,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            #[cfg(feature = "driver")]
            crypto_mode: CryptoMode::Normal,
            decode_state_timeout: Duration::from_secs(60),
            resync_threshold: NonZeroU16::new(3),
            max_pending_frames: NonZeroUsize::new(5).unwrap(),
            decoder_factory: opus_decoder_factory(),
            #[cfg(test)]
            tick_style: TickStyle::Timed,
        }
    }
}

impl Config {
    #[cfg(feature = "driver")]
    /// Sets this `Config`'s chosen cryptographic tagging scheme.
    #[must_use]
    pub fn crypto_mode(mut self, crypto_mode: CryptoMode) -> Self {
        self.crypto_mode = crypto_mode;
        self
    }

    /// Sets this `Config`'s received packet decoder cleanup timer.
    #[must_use]
    pub fn decode_state_timeout(mut self, decode_state_timeout: Duration) -> Self {
        self.decode_state_timeout = decode_state_timeout;
        self
    }

    /// Sets this `Config`'s decoder resynchronisation threshold.
    #[must_use]
    pub fn resync_threshold(mut self, resync_threshold: Option<NonZeroU16>) -> Self {
        self.resync_threshold = resync_threshold;
        self
    }

    /// Sets this `Config`'s per-source packet buffer length.
    #[must_use]
    pub fn max_pending_frames(mut self, max_pending_frames: NonZeroUsize) -> Self {
        self.max_pending_frames = max_pending_frames;
        self
    }

    /// Sets this `Config`'s per-source decoder constructor.
    #[must_use]
    pub fn decoder_factory(mut self, decoder_factory: DecoderFactory) -> Self {
        self.decoder_factory = decoder_factory;
        self
    }
}

// Test only attributes
#[cfg(test)]
impl Config {
    #![allow(missing_docs)]
    #[must_use]
    pub fn tick_style(mut self, tick_style: TickStyle) -> Self {
        self.tick_style = tick_style;
        self
    }
}
