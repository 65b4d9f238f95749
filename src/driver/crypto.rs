//! Authentication and decryption of voice packets.
use discortp::{rtp::RtpPacket, MutablePacket};
use std::ops::Range;
use xsalsa20poly1305::{
    aead::{AeadInPlace, Error as CryptoError},
    Nonce,
    Tag,
    XSalsa20Poly1305 as Cipher,
    NONCE_SIZE,
    TAG_SIZE,
};

/// Source of the per-packet nonce, as negotiated with the voice server.
///
/// Every mode seals the payload with XSalsa20-Poly1305, placing the 16B tag
/// directly before the ciphertext.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum CryptoMode {
    /// `xsalsa20_poly1305`: the fixed 12B RTP header, zero-padded, is the nonce.
    Normal,
    /// `xsalsa20_poly1305_suffix`: a random 24B nonce follows the ciphertext.
    Suffix,
    /// `xsalsa20_poly1305_lite`: a 4B counter follows the ciphertext, zero-padded
    /// into the nonce.
    Lite,
}

impl CryptoMode {
    /// Number of nonce bytes carried after the ciphertext.
    pub fn nonce_suffix_len(self) -> usize {
        match self {
            CryptoMode::Normal => 0,
            CryptoMode::Suffix => NONCE_SIZE,
            CryptoMode::Lite => 4,
        }
    }

    /// Number of bytes encryption adds to each payload.
    pub fn payload_overhead(self) -> usize {
        TAG_SIZE + self.nonce_suffix_len()
    }

    fn nonce(self, header: &[u8], suffix: &[u8]) -> Nonce {
        let source = match self {
            CryptoMode::Normal => &header[..header.len().min(RtpPacket::minimum_packet_size())],
            CryptoMode::Suffix | CryptoMode::Lite => suffix,
        };

        let mut nonce = Nonce::default();
        let len = source.len().min(NONCE_SIZE);
        nonce[..len].copy_from_slice(&source[..len]);

        nonce
    }

    /// Verifies and decrypts a packet's payload in place.
    ///
    /// Returns the range of the payload now holding plaintext. Packets too short
    /// to hold a tag and nonce fail rather than panic.
    pub(crate) fn decrypt_in_place(
        self,
        packet: &mut impl MutablePacket,
        cipher: &Cipher,
    ) -> Result<Range<usize>, CryptoError> {
        let payload_len = packet.payload().len();
        if payload_len < self.payload_overhead() {
            return Err(CryptoError);
        }

        let header_len = packet.packet().len() - payload_len;
        let (header, body) = packet.packet_mut().split_at_mut(header_len);
        let (sealed, suffix) = body.split_at_mut(payload_len - self.nonce_suffix_len());
        let nonce = self.nonce(header, suffix);

        let sealed_len = sealed.len();
        let (tag, data) = sealed.split_at_mut(TAG_SIZE);

        cipher.decrypt_in_place_detached(&nonce, b"", data, Tag::from_slice(tag))?;

        Ok(TAG_SIZE..sealed_len)
    }

    /// Seals a payload laid out as `[tag space | plaintext | nonce suffix]`.
    #[cfg(test)]
    pub(crate) fn encrypt_in_place(
        self,
        packet: &mut impl MutablePacket,
        cipher: &Cipher,
    ) -> Result<(), CryptoError> {
        let payload_len = packet.payload().len();
        if payload_len < self.payload_overhead() {
            return Err(CryptoError);
        }

        let header_len = packet.packet().len() - payload_len;
        let (header, body) = packet.packet_mut().split_at_mut(header_len);
        let (sealed, suffix) = body.split_at_mut(payload_len - self.nonce_suffix_len());
        let nonce = self.nonce(header, suffix);

        let (tag_space, data) = sealed.split_at_mut(TAG_SIZE);
        let tag = cipher.encrypt_in_place_detached(&nonce, b"", data)?;
        tag_space.copy_from_slice(&tag[..]);

        Ok(())
    }
}

impl Default for CryptoMode {
    fn default() -> Self {
        CryptoMode::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discortp::{rtp::MutableRtpPacket, Packet};
    use xsalsa20poly1305::{KeyInit, KEY_SIZE};

    const MODES: [CryptoMode; 3] = [CryptoMode::Normal, CryptoMode::Suffix, CryptoMode::Lite];

    fn sealed(mode: CryptoMode, cipher: &Cipher, plaintext: &[u8], suffix_byte: u8) -> Vec<u8> {
        let mut body = vec![0u8; TAG_SIZE];
        body.extend_from_slice(plaintext);
        body.extend(std::iter::repeat(suffix_byte).take(mode.nonce_suffix_len()));

        let mut buf = utils::make_rtp(1, 960, 5, &body);
        let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();
        mode.encrypt_in_place(&mut pkt, cipher).unwrap();

        buf
    }

    #[test]
    fn short_payload_fails_without_panic() {
        let cipher = Cipher::new_from_slice(&[1u8; KEY_SIZE]).unwrap();

        for mode in MODES.iter() {
            let mut buf = utils::make_rtp(1, 0, 5, &[0u8; TAG_SIZE - 1]);
            let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();

            assert!(mode.decrypt_in_place(&mut pkt, &cipher).is_err());
        }
    }

    #[test]
    fn sealed_payload_opens_for_every_mode() {
        let cipher = Cipher::new_from_slice(&[7u8; KEY_SIZE]).unwrap();
        let plaintext = [1u8, 2, 3, 4, 5, 6, 7, 8];

        for mode in MODES.iter().copied() {
            let mut buf = sealed(mode, &cipher, &plaintext, 0x5A);
            let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();

            let range = mode.decrypt_in_place(&mut pkt, &cipher).unwrap();

            assert_eq!(&pkt.payload()[range], &plaintext[..]);
            assert_eq!(pkt.payload().len(), plaintext.len() + mode.payload_overhead());
        }
    }

    #[test]
    fn suffix_nonce_changes_ciphertext() {
        let cipher = Cipher::new_from_slice(&[2u8; KEY_SIZE]).unwrap();

        let a = sealed(CryptoMode::Lite, &cipher, &[9; 4], 1);
        let b = sealed(CryptoMode::Lite, &cipher, &[9; 4], 2);

        let body = RtpPacket::minimum_packet_size()..RtpPacket::minimum_packet_size() + TAG_SIZE + 4;
        assert_ne!(&a[body.clone()], &b[body]);
    }

    #[test]
    fn tampered_packet_is_rejected() {
        let cipher = Cipher::new_from_slice(&[3u8; KEY_SIZE]).unwrap();
        let mut buf = sealed(CryptoMode::Normal, &cipher, &[1, 2, 3, 4], 0);

        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();
        assert!(CryptoMode::Normal.decrypt_in_place(&mut pkt, &cipher).is_err());
    }
}
