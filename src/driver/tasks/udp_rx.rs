use super::{
    error::{Error, Result},
    message::*,
};
use crate::{
    constants::*,
    driver::CryptoMode,
    receive::{Arrivals, InboundPacket},
    Config,
};
use bytes::Bytes;
use discortp::{
    demux::{self, DemuxedMut},
    rtp::{RtpExtensionPacket, RtpPacket},
    Packet,
    PacketSize,
};
use flume::Receiver;
use tokio::{net::UdpSocket, select};
use tracing::{error, instrument, trace, warn};
use xsalsa20poly1305::XSalsa20Poly1305 as Cipher;

struct UdpRx {
    cipher: Cipher,
    config: Config,
    rx: Receiver<UdpRxMessage>,
    arrivals: Arrivals,
    udp_socket: UdpSocket,
}

impl UdpRx {
    #[instrument(skip(self))]
    async fn run(&mut self) {
        let mut buf = vec![0u8; VOICE_PACKET_MAX];

        loop {
            select! {
                res = self.udp_socket.recv_from(&mut buf[..]) => {
                    match res {
                        Ok((len, _addr)) => {
                            if let Err(e) = self.process_udp_message(&mut buf[..len]) {
                                warn!("Dropped voice datagram: {}.", e);
                            }
                        },
                        Err(e) => {
                            if let Err(e) = Error::from(e).disarm_would_block() {
                                error!("Voice socket failed: {}.", e);
                                break;
                            }
                        },
                    }
                },
                msg = self.rx.recv_async() => {
                    match msg {
                        Ok(UdpRxMessage::SetConfig(c)) => {
                            self.config = c;
                        },
                        Ok(UdpRxMessage::Poison) | Err(flume::RecvError::Disconnected) => break,
                    }
                },
            }
        }
    }

    fn process_udp_message(&self, packet: &mut [u8]) -> Result<()> {
        // NOTE: errors here (and in general for UDP) are not fatal to the task.
        // Panics must be avoided due to the adversarial nature of received packets.
        if let Some(inbound) = parse_voice_packet(packet, self.config.crypto_mode, &self.cipher)? {
            self.arrivals.ingest(inbound)?;
        }

        Ok(())
    }
}

/// Validates, decrypts, and strips one voice datagram down to its Opus payload.
///
/// Returns `Ok(None)` for well-formed traffic which carries no voice (RTCP).
pub(crate) fn parse_voice_packet(
    packet: &mut [u8],
    crypto_mode: CryptoMode,
    cipher: &Cipher,
) -> Result<Option<InboundPacket>> {
    match demux::demux_mut(packet) {
        DemuxedMut::Rtp(mut rtp) => {
            if !rtp_valid(&rtp.to_immutable()) {
                error!("Illegal RTP message received.");
                return Err(Error::IllegalVoicePacket);
            }

            let plaintext = crypto_mode.decrypt_in_place(&mut rtp, cipher)?;

            let rtp = rtp.to_immutable();
            let payload = &rtp.payload()[plaintext];

            let skip = if rtp.get_extension() != 0 {
                RtpExtensionPacket::new(payload)
                    .map(|pkt| pkt.packet_size())
                    .ok_or_else(|| {
                        error!("Extension packet indicated, but insufficient space.");
                        Error::IllegalVoicePacket
                    })?
            } else {
                0
            };

            let audio = payload.get(skip..).ok_or(Error::IllegalVoicePacket)?;

            Ok(Some(InboundPacket::new(
                rtp.get_sequence().0 .0,
                rtp.get_timestamp().0 .0,
                rtp.get_ssrc(),
                Bytes::copy_from_slice(audio),
            )))
        },
        DemuxedMut::Rtcp(_) => {
            trace!("RTCP packet ignored.");
            Ok(None)
        },
        DemuxedMut::FailedParse(t) => {
            warn!("Failed to parse message of type {:?}.", t);
            Err(Error::IllegalVoicePacket)
        },
        DemuxedMut::TooSmall => {
            warn!("Illegal UDP packet from voice server.");
            Err(Error::IllegalVoicePacket)
        },
    }
}

#[instrument(skip(rx, cipher, arrivals, udp_socket))]
pub(crate) async fn runner(
    rx: Receiver<UdpRxMessage>,
    cipher: Cipher,
    config: Config,
    udp_socket: UdpSocket,
    arrivals: Arrivals,
) {
    trace!("UDP receive handle started.");

    let mut state = UdpRx {
        cipher,
        config,
        rx,
        arrivals,
        udp_socket,
    };

    state.run().await;

    trace!("UDP receive handle stopped.");
}

#[inline]
fn rtp_valid(packet: &RtpPacket<'_>) -> bool {
    packet.get_version() == RTP_VERSION && packet.get_payload_type() == RTP_PROFILE_TYPE
}

#[cfg(test)]
mod tests {
    use super::*;
    use discortp::rtp::MutableRtpPacket;
    use xsalsa20poly1305::{KeyInit, KEY_SIZE, TAG_SIZE};

    fn cipher() -> Cipher {
        Cipher::new_from_slice(&[9u8; KEY_SIZE]).unwrap()
    }

    // Builds an encrypted datagram, leaving tag space ahead of the payload.
    fn encrypted_with(mode: CryptoMode, seq: u16, body: &[u8], extension: bool) -> Vec<u8> {
        let mut plain = vec![0u8; TAG_SIZE];
        plain.extend_from_slice(body);
        plain.extend((0..mode.nonce_suffix_len()).map(|i| i as u8));

        let mut buf = utils::make_rtp(seq, 960, 42, &plain);
        if extension {
            buf[0] |= 0x10;
        }

        let mut pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();
        mode.encrypt_in_place(&mut pkt, &cipher()).unwrap();

        buf
    }

    fn encrypted(mode: CryptoMode, seq: u16, body: &[u8]) -> Vec<u8> {
        encrypted_with(mode, seq, body, false)
    }

    #[test]
    fn voice_packet_is_decrypted_for_all_modes() {
        for mode in [CryptoMode::Normal, CryptoMode::Suffix, CryptoMode::Lite].iter() {
            let mut buf = encrypted(*mode, 7, &[1, 2, 3]);

            let pkt = parse_voice_packet(&mut buf, *mode, &cipher())
                .unwrap()
                .unwrap();

            assert_eq!(pkt.sequence, 7);
            assert_eq!(pkt.timestamp, 960);
            assert_eq!(pkt.ssrc, 42);
            assert_eq!(&pkt.payload[..], &[1, 2, 3]);
        }
    }

    #[test]
    fn header_extension_is_stripped() {
        // Profile 0xBEDE, one 32-bit word of extension data.
        let body = [0xBE, 0xDE, 0x00, 0x01, 0x10, 0xAA, 0x00, 0x00, 5, 6];
        let mut buf = encrypted_with(CryptoMode::Normal, 1, &body, true);

        let pkt = parse_voice_packet(&mut buf, CryptoMode::Normal, &cipher())
            .unwrap()
            .unwrap();

        assert_eq!(&pkt.payload[..], &[5, 6]);
    }

    #[test]
    fn wrong_payload_type_is_rejected() {
        let mut buf = encrypted(CryptoMode::Normal, 1, &[1]);
        buf[1] = 96;

        assert!(matches!(
            parse_voice_packet(&mut buf, CryptoMode::Normal, &cipher()),
            Err(Error::IllegalVoicePacket)
        ));
    }

    #[test]
    fn bad_key_fails_decryption() {
        let mut buf = encrypted(CryptoMode::Normal, 1, &[1, 2]);
        let other = Cipher::new_from_slice(&[1u8; KEY_SIZE]).unwrap();

        assert!(matches!(
            parse_voice_packet(&mut buf, CryptoMode::Normal, &other),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn runt_datagram_is_rejected() {
        let mut buf = [0x80u8, 120, 0];

        assert!(parse_voice_packet(&mut buf, CryptoMode::Normal, &cipher()).is_err());
    }

    #[test]
    fn payload_offsets_follow_mode() {
        let mut buf = encrypted(CryptoMode::Lite, 3, &[8; 4]);
        let pkt = MutableRtpPacket::new(&mut buf[..]).unwrap();

        assert_eq!(
            pkt.payload().len(),
            4 + CryptoMode::Lite.payload_overhead()
        );
    }
}
