//! Voice gateway payloads consumed by the SSRC registry.
//!
//! The gateway client itself lives outside this crate: it only needs to hand over
//! these messages (or their JSON bodies) as they arrive.

use crate::id::UserId;
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// How a user is transmitting audio, as announced in a [`Speaking`] payload.
    pub struct SpeakingState: u8 {
        /// Normal transmission of voice audio.
        const MICROPHONE = 1;
        /// Transmission of context audio for video, no speaking indicator.
        const SOUNDSHARE = 1 << 1;
        /// Priority speaker, lowering audio of other speakers.
        const PRIORITY = 1 << 2;
    }
}

impl SpeakingState {
    /// Encodes this set of flags into its wire representation.
    pub fn encode(self) -> u8 {
        self.bits()
    }

    /// Decodes a wire bitfield, discarding any unrecognised bits.
    pub fn decode(bits: u8) -> Self {
        Self::from_bits_truncate(bits)
    }

    /// Returns whether this user is transmitting any audio at all.
    pub fn is_speaking(self) -> bool {
        !self.is_empty()
    }
}

impl Default for SpeakingState {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for SpeakingState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.encode())
    }
}

impl<'de> Deserialize<'de> for SpeakingState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::decode)
    }
}

/// Used to indicate which users are speaking, binding an SSRC to its user.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Speaking {
    /// Function currently unknown.
    pub delay: Option<u32>,
    /// How/whether a user has started/stopped speaking.
    pub speaking: SpeakingState,
    /// RTP synchronisation source of the speaker.
    pub ssrc: u32,
    /// User ID of the speaker, included in messages received from the server.
    pub user_id: Option<UserId>,
}

/// Message indicating that another user has left the voice channel.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ClientDisconnect {
    /// ID of the disconnected user.
    pub user_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaking_flags_encode_decode() {
        let state = SpeakingState::MICROPHONE | SpeakingState::PRIORITY;

        assert_eq!(state.encode(), 5);
        assert_eq!(SpeakingState::decode(5), state);
        assert_eq!(SpeakingState::decode(0xF8), SpeakingState::empty());
        assert!(!SpeakingState::decode(0).is_speaking());
    }

    #[test]
    fn speaking_payload_from_json() {
        let json = r#"{"delay":0,"speaking":3,"ssrc":111,"user_id":"80351110224678912"}"#;
        let parsed: Speaking = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.ssrc, 111);
        assert_eq!(parsed.user_id, Some(UserId(80_351_110_224_678_912)));
        assert_eq!(
            parsed.speaking,
            SpeakingState::MICROPHONE | SpeakingState::SOUNDSHARE
        );
    }

    #[test]
    fn disconnect_accepts_numeric_id() {
        let parsed: ClientDisconnect = serde_json::from_str(r#"{"user_id":42}"#).unwrap();
        assert_eq!(parsed.user_id, UserId(42));
    }

    #[test]
    fn speaking_payload_serialises_flags_as_integer() {
        let msg = Speaking {
            delay: None,
            speaking: SpeakingState::SOUNDSHARE,
            ssrc: 9,
            user_id: Some(UserId(12)),
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["speaking"], 2);
        assert_eq!(value["user_id"], "12");
    }
}
