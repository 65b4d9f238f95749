use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Length of a bare RTP header, without CSRCs or extensions.
pub const RTP_HEADER_LEN: usize = 12;

/// Generates `mono_len` frames of a 440Hz sine wave at 48kHz, as 16-bit PCM.
///
/// Stereo output duplicates each sample into both channels.
pub fn make_sine(mono_len: usize, stereo: bool) -> Vec<i16> {
    let chans = if stereo { 2 } else { 1 };
    let mut out = Vec::with_capacity(mono_len * chans);

    for i in 0..mono_len {
        let x = (i as f64) * 440.0 * 2.0 * std::f64::consts::PI / 48_000.0;
        let sample = (x.sin() * f64::from(i16::MAX / 4)) as i16;

        for _ in 0..chans {
            out.push(sample);
        }
    }

    out
}

/// Serialises PCM samples to big-endian bytes.
pub fn to_be_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = vec![0u8; samples.len() * 2];
    BigEndian::write_i16_into(samples, &mut out);
    out
}

/// Builds an unencrypted RTP packet (version 2, payload type 120) around `payload`.
pub fn make_rtp(sequence: u16, timestamp: u32, ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(RTP_HEADER_LEN + payload.len());

    out.write_u8(0x80).unwrap();
    out.write_u8(120).unwrap();
    out.write_u16::<BigEndian>(sequence).unwrap();
    out.write_u32::<BigEndian>(timestamp).unwrap();
    out.write_u32::<BigEndian>(ssrc).unwrap();
    out.extend_from_slice(payload);

    out
}
