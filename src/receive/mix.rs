use super::audio;
use crate::{constants::STEREO_FRAME_SIZE, id::UserId};
use tracing::debug;

/// Adds `samples` into `mix`, sample by sample, without clamping.
///
/// Input longer than `mix` is truncated; shorter input leaves the tail untouched.
#[inline]
pub fn mix_into(mix: &mut [i32], samples: &[i16]) {
    for (acc, sample) in mix.iter_mut().zip(samples) {
        *acc += i32::from(*sample);
    }
}

/// One tick's worth of audio from every included, successfully-decoded source,
/// summed together.
///
/// A tick with no contributors still yields a full frame of silence.
///
/// The mix always spans exactly 20ms. Opus packets carrying 40, 60 or 120ms of
/// audio contribute only their first 20ms here; the whole decode is available
/// through per-user delivery ([`UserAudioFrame`]).
///
/// [`UserAudioFrame`]: super::UserAudioFrame
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CombinedFrame {
    contributors: Vec<UserId>,
    mix: Vec<i32>,
}

impl CombinedFrame {
    /// A frame with no contributors and all-zero audio.
    pub fn silent() -> Self {
        Mixdown::new().finish()
    }

    /// Users whose audio is present in this frame, without duplicates.
    pub fn contributors(&self) -> &[UserId] {
        &self.contributors
    }

    /// Returns whether no source contributed to this frame.
    pub fn is_silent(&self) -> bool {
        self.contributors.is_empty()
    }

    /// The unclamped per-sample sums.
    pub fn raw_mix(&self) -> &[i32] {
        &self.mix
    }

    /// Interleaved stereo samples, clamped into the 16-bit range.
    pub fn samples(&self) -> Vec<i16> {
        audio::clamp_mix(&self.mix)
    }

    /// Converts the mix to big-endian bytes, scaled by `volume` and clamped.
    pub fn audio_data(&self, volume: f64) -> Vec<u8> {
        audio::mix_to_bytes(&self.mix, volume)
    }
}

/// Accumulates one tick of audio for a [`CombinedFrame`].
#[derive(Clone, Debug)]
pub struct Mixdown {
    contributors: Vec<UserId>,
    mix: Vec<i32>,
}

impl Mixdown {
    /// Starts an empty, silent mix.
    pub fn new() -> Self {
        Self {
            contributors: Vec::new(),
            mix: vec![0; STEREO_FRAME_SIZE],
        }
    }

    /// Sums `samples` into the mix, recording `user` as a contributor.
    ///
    /// Samples past the end of one 20ms frame are discarded.
    pub fn add(&mut self, user: UserId, samples: &[i16]) {
        if samples.len() > self.mix.len() {
            debug!(
                "Mixing first 20ms of {} samples from {}.",
                samples.len(),
                user
            );
        }

        mix_into(&mut self.mix, samples);

        if !self.contributors.contains(&user) {
            self.contributors.push(user);
        }
    }

    /// Number of distinct contributors so far.
    pub fn len(&self) -> usize {
        self.contributors.len()
    }

    /// Returns whether nothing has been mixed yet.
    pub fn is_empty(&self) -> bool {
        self.contributors.is_empty()
    }

    /// Publishes the accumulated mix.
    pub fn finish(self) -> CombinedFrame {
        CombinedFrame {
            contributors: self.contributors,
            mix: self.mix,
        }
    }
}

impl Default for Mixdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    #[test]
    fn empty_mix_is_full_silence() {
        let frame = CombinedFrame::silent();

        assert!(frame.contributors().is_empty());
        assert_eq!(frame.samples().len(), STEREO_FRAME_SIZE);

        let bytes = frame.audio_data(1.0);
        assert_eq!(bytes.len(), STEREO_FRAME_BYTE_SIZE);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn mixing_is_commutative() {
        let a = utils::make_sine(MONO_FRAME_SIZE, true);
        let b: Vec<i16> = (0..STEREO_FRAME_SIZE).map(|i| (i as i16) - 900).collect();

        let mut ab = Mixdown::new();
        ab.add(UserId(1), &a);
        ab.add(UserId(2), &b);

        let mut ba = Mixdown::new();
        ba.add(UserId(2), &b);
        ba.add(UserId(1), &a);

        assert_eq!(ab.finish().raw_mix(), ba.finish().raw_mix());
    }

    #[test]
    fn sums_without_averaging_or_clamping() {
        let loud = vec![30_000i16; STEREO_FRAME_SIZE];

        let mut mix = Mixdown::new();
        mix.add(UserId(1), &loud);
        mix.add(UserId(2), &loud);
        let frame = mix.finish();

        assert_eq!(frame.raw_mix()[0], 60_000);
        assert_eq!(frame.samples()[0], i16::MAX);
    }

    #[test]
    fn contributors_are_deduplicated() {
        let mut mix = Mixdown::new();
        mix.add(UserId(5), &[1, 1]);
        mix.add(UserId(5), &[1, 1]);

        let frame = mix.finish();
        assert_eq!(frame.contributors(), &[UserId(5)]);
        assert_eq!(&frame.raw_mix()[..3], &[2, 2, 0]);
    }

    #[test]
    fn oversized_input_is_truncated() {
        let mut mix = Mixdown::new();
        mix.add(UserId(1), &vec![1; 2 * STEREO_FRAME_SIZE]);

        let frame = mix.finish();
        assert_eq!(frame.raw_mix().len(), STEREO_FRAME_SIZE);
        assert!(frame.raw_mix().iter().all(|s| *s == 1));
    }
}
