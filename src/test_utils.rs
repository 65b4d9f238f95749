#![allow(missing_docs)]

use crate::{
    constants::STEREO_FRAME_SIZE,
    error::CodecError,
    id::UserId,
    receive::{
        AudioReceiveHandler,
        Capabilities,
        CombinedFrame,
        DecoderFactory,
        RawVoicePacket,
        UserAudioFrame,
        VoiceDecoder,
    },
    Config,
};
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

/// Test double for a codec: each frame decodes to a constant signal, and every
/// call is counted across all clones.
///
/// A payload of two or more bytes decodes to the big-endian `i16` formed by its
/// first two bytes; a single byte decodes to its own value. A third byte, if
/// present, gives the frame's length in 20ms units. An empty payload is rejected.
#[derive(Clone, Debug, Default)]
pub struct CountingDecoder {
    calls: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
    instances: Arc<AtomicUsize>,
    fail_creation: Arc<AtomicBool>,
}

impl CountingDecoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }

    pub fn fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    pub fn factory(&self) -> DecoderFactory {
        let template = self.clone();

        Arc::new(move || {
            if template.fail_creation.load(Ordering::SeqCst) {
                return Err(CodecError::IllegalVoicePacket);
            }

            template.instances.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(template.clone()) as Box<dyn VoiceDecoder>)
        })
    }
}

impl VoiceDecoder for CountingDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let (value, frames) = match payload {
            [] => return Err(CodecError::IllegalVoicePacket),
            [b] => (i16::from(*b), 1),
            [hi, lo] => (i16::from_be_bytes([*hi, *lo]), 1),
            [hi, lo, n, ..] => (i16::from_be_bytes([*hi, *lo]), usize::from(*n).max(1)),
        };

        Ok(vec![value; frames * STEREO_FRAME_SIZE])
    }

    fn reset(&mut self) -> Result<(), CodecError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn counting_config() -> (Config, CountingDecoder) {
    let decoder = CountingDecoder::default();
    let config = Config::default().decoder_factory(decoder.factory());

    (config, decoder)
}

/// Receiving ends of a [`ChannelHandler`].
pub struct HandlerRx {
    pub encoded: Receiver<Arc<RawVoicePacket>>,
    pub user: Receiver<UserAudioFrame>,
    pub combined: Receiver<CombinedFrame>,
}

/// Handler forwarding every delivery into a channel.
#[derive(Clone)]
pub struct ChannelHandler {
    caps: Capabilities,
    queries: Arc<AtomicUsize>,
    excluded: Arc<Mutex<HashSet<UserId>>>,
    encoded: Sender<Arc<RawVoicePacket>>,
    user: Sender<UserAudioFrame>,
    combined: Sender<CombinedFrame>,
}

impl ChannelHandler {
    pub fn new(caps: Capabilities) -> (Self, HandlerRx) {
        let (encoded, encoded_rx) = flume::unbounded();
        let (user, user_rx) = flume::unbounded();
        let (combined, combined_rx) = flume::unbounded();

        let handler = Self {
            caps,
            queries: Arc::default(),
            excluded: Arc::default(),
            encoded,
            user,
            combined,
        };

        let rx = HandlerRx {
            encoded: encoded_rx,
            user: user_rx,
            combined: combined_rx,
        };

        (handler, rx)
    }

    pub fn capability_queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn exclude(&self, user: UserId) {
        self.excluded.lock().insert(user);
    }

    fn query(&self, enabled: bool) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        enabled
    }
}

impl AudioReceiveHandler for ChannelHandler {
    fn can_receive_combined(&self) -> bool {
        self.query(self.caps.combined)
    }

    fn can_receive_user(&self) -> bool {
        self.query(self.caps.user)
    }

    fn can_receive_encoded(&self) -> bool {
        self.query(self.caps.encoded)
    }

    fn handle_encoded_audio(&self, packet: &Arc<RawVoicePacket>) {
        drop(self.encoded.send(packet.clone()));
    }

    fn handle_combined_audio(&self, combined: &CombinedFrame) {
        drop(self.combined.send(combined.clone()));
    }

    fn handle_user_audio(&self, audio: &UserAudioFrame) {
        drop(self.user.send(audio.clone()));
    }

    fn include_user_in_combined_audio(&self, user: UserId) -> bool {
        !self.excluded.lock().contains(&user)
    }
}
