use super::DecodedFrame;
use crate::{constants::*, id::UserId};
use byteorder::{BigEndian, ByteOrder};

/// Shape of PCM audio as delivered to applications.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AudioFormat {
    /// Samples per second, per channel.
    pub sample_rate: u32,
    /// Bits per individual sample.
    pub sample_size_bits: u16,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Whether converted bytes are big-endian.
    pub big_endian: bool,
}

impl AudioFormat {
    /// Number of bytes occupied by one frame's worth of audio in this format.
    pub const fn frame_bytes(&self) -> usize {
        (self.sample_rate as usize / AUDIO_FRAME_RATE)
            * self.channels as usize
            * (self.sample_size_bits as usize / 8)
    }
}

/// Format of all byte output: 48kHz, signed 16-bit, stereo, big-endian, 20ms per frame.
pub const OUTPUT_FORMAT: AudioFormat = AudioFormat {
    sample_rate: SAMPLE_RATE_RAW as u32,
    sample_size_bits: 16,
    channels: CHANNEL_COUNT as u16,
    big_endian: true,
};

/// Converts PCM samples to [`OUTPUT_FORMAT`] bytes, scaling each sample by `volume`.
///
/// A volume of `1.0` leaves samples untouched.
pub fn pcm_to_bytes(samples: &[i16], volume: f64) -> Vec<u8> {
    scaled_to_bytes(samples.iter().map(|s| i32::from(*s)), samples.len(), volume)
}

/// Converts a mix accumulator to [`OUTPUT_FORMAT`] bytes, scaling each sample by
/// `volume` and clamping to the 16-bit range.
pub(crate) fn mix_to_bytes(mix: &[i32], volume: f64) -> Vec<u8> {
    scaled_to_bytes(mix.iter().copied(), mix.len(), volume)
}

/// Clamps a mix accumulator into 16-bit PCM.
pub(crate) fn clamp_mix(mix: &[i32]) -> Vec<i16> {
    mix.iter().map(|s| clamp_sample(f64::from(*s))).collect()
}

fn scaled_to_bytes(samples: impl Iterator<Item = i32>, len: usize, volume: f64) -> Vec<u8> {
    let pcm: Vec<i16> = samples
        .map(|s| clamp_sample(f64::from(s) * volume))
        .collect();

    let mut out = vec![0u8; len * 2];
    BigEndian::write_i16_into(&pcm, &mut out);

    out
}

#[inline]
fn clamp_sample(val: f64) -> i16 {
    val.max(f64::from(i16::MIN)).min(f64::from(i16::MAX)) as i16
}

/// Decoded audio from a single user, delivered when that user produced a decodable frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserAudioFrame {
    /// User who sent the audio.
    pub user_id: UserId,
    /// Synchronisation source the audio arrived on.
    pub ssrc: u32,
    /// RTP sequence number of the decoded packet.
    pub sequence: u16,
    /// The decoded PCM.
    pub frame: DecodedFrame,
}

impl UserAudioFrame {
    /// Interleaved stereo samples for this user.
    pub fn samples(&self) -> &[i16] {
        self.frame.samples()
    }

    /// Converts this user's audio to big-endian bytes, scaled by `volume`.
    pub fn audio_data(&self, volume: f64) -> Vec<u8> {
        self.frame.audio_data(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_volume_is_exact_big_endian() {
        let pcm = [0i16, 1, -1, 0x1234, i16::MIN, i16::MAX];
        let bytes = pcm_to_bytes(&pcm, 1.0);

        assert_eq!(bytes, utils::to_be_bytes(&pcm));
        assert_eq!(&bytes[6..8], &[0x12, 0x34]);
    }

    #[test]
    fn zero_volume_is_silent() {
        let pcm = utils::make_sine(MONO_FRAME_SIZE, true);
        let bytes = pcm_to_bytes(&pcm, 0.0);

        assert_eq!(bytes.len(), STEREO_FRAME_BYTE_SIZE);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn volume_scales_and_clamps() {
        assert_eq!(pcm_to_bytes(&[1000, -1000], 0.5), utils::to_be_bytes(&[500, -500]));
        assert_eq!(
            pcm_to_bytes(&[30_000, -30_000], 2.0),
            utils::to_be_bytes(&[i16::MAX, i16::MIN])
        );
    }

    #[test]
    fn mix_accumulator_is_clamped_at_conversion() {
        let mix = [40_000i32, -40_000, 12];

        assert_eq!(mix_to_bytes(&mix, 1.0), utils::to_be_bytes(&[i16::MAX, i16::MIN, 12]));
        assert_eq!(clamp_mix(&mix), vec![i16::MAX, i16::MIN, 12]);
    }

    #[test]
    fn output_format_frame_size() {
        assert_eq!(OUTPUT_FORMAT.frame_bytes(), STEREO_FRAME_BYTE_SIZE);
        assert_eq!(STEREO_FRAME_BYTE_SIZE, 3840);
    }
}
