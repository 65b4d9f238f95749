//! Constants affecting receive pipeline function and output format.

use audiopus::SampleRate;
#[cfg(feature = "driver")]
use discortp::rtp::RtpType;
use std::time::Duration;

/// Sample rate of audio received from, and delivered by, the pipeline.
pub const SAMPLE_RATE: SampleRate = SampleRate::Hz48000;

/// Sample rate of audio received from, and delivered by, the pipeline.
pub const SAMPLE_RATE_RAW: usize = 48_000;

/// Number of audio frames/packets expected per second.
pub const AUDIO_FRAME_RATE: usize = 50;

/// Length of time between any two audio frames, and between aggregator ticks.
pub const TIMESTEP_LENGTH: Duration = Duration::from_millis(1000 / AUDIO_FRAME_RATE as u64);

/// Number of output channels.
pub const CHANNEL_COUNT: usize = 2;

/// Number of samples in one complete frame of audio per channel.
///
/// This is equally the number of stereo (joint) samples in an audio frame.
pub const MONO_FRAME_SIZE: usize = SAMPLE_RATE_RAW / AUDIO_FRAME_RATE;

/// Number of individual samples in one complete frame of stereo audio.
pub const STEREO_FRAME_SIZE: usize = CHANNEL_COUNT * MONO_FRAME_SIZE;

/// Number of bytes in one complete frame of 16-bit stereo audio.
pub const STEREO_FRAME_BYTE_SIZE: usize = STEREO_FRAME_SIZE * std::mem::size_of::<i16>();

/// Length (in milliseconds) of any audio frame.
pub const FRAME_LEN_MS: usize = 1000 / AUDIO_FRAME_RATE;

/// Maximum packet size for a voice packet.
///
/// Set a safe amount below the Ethernet MTU to avoid fragmentation/rejection.
pub const VOICE_PACKET_MAX: usize = 1460;

/// Delay between sweeps for disconnected or idle decoder state.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5);

/// Time a disconnected user's decoder state is kept, allowing buffered packets to drain.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// The one (and only) RTP version.
pub const RTP_VERSION: u8 = 2;

#[cfg(feature = "driver")]
/// Profile type used by Opus voice traffic.
pub const RTP_PROFILE_TYPE: RtpType = RtpType::Dynamic(120);
