use super::{CombinedFrame, RawVoicePacket, UserAudioFrame};
use crate::id::UserId;
use std::{fmt, sync::Arc};
use tracing::trace;

/// Application-side consumer of received audio.
///
/// Each delivery path is enabled by its `can_receive_*` method, which is consulted
/// when the handler is installed. All methods have no-op defaults.
///
/// Encoded audio is delivered from whichever thread ingests packets; user and
/// combined audio are delivered from the tick task. Callbacks should return quickly,
/// as the tick has a 20ms deadline.
pub trait AudioReceiveHandler: Send + Sync {
    /// Whether to deliver one mixed [`CombinedFrame`] every 20ms.
    fn can_receive_combined(&self) -> bool {
        false
    }

    /// Whether to deliver each user's decoded audio as it becomes available.
    fn can_receive_user(&self) -> bool {
        false
    }

    /// Whether to deliver every packet on arrival, before any decoding.
    fn can_receive_encoded(&self) -> bool {
        false
    }

    /// Receives every packet as it arrives, whether or not it later decodes.
    fn handle_encoded_audio(&self, _packet: &Arc<RawVoicePacket>) {}

    /// Receives the mixed audio of all included users, once per tick.
    fn handle_combined_audio(&self, _combined: &CombinedFrame) {}

    /// Receives one user's audio for a tick in which that user decoded successfully.
    fn handle_user_audio(&self, _audio: &UserAudioFrame) {}

    /// Whether `user` counts toward this tick's combined audio.
    ///
    /// Excluded users may still be delivered individually.
    fn include_user_in_combined_audio(&self, _user: UserId) -> bool {
        true
    }
}

/// Delivery paths enabled for a handler.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Capabilities {
    /// Raw packets on arrival.
    pub encoded: bool,
    /// Per-user decoded frames.
    pub user: bool,
    /// Per-tick mixed frames.
    pub combined: bool,
}

impl Capabilities {
    /// Asks `handler` which delivery paths it wants.
    pub fn query(handler: &dyn AudioReceiveHandler) -> Self {
        Self {
            encoded: handler.can_receive_encoded(),
            user: handler.can_receive_user(),
            combined: handler.can_receive_combined(),
        }
    }

    /// Returns whether any path needs decoded audio.
    pub fn needs_decode(self) -> bool {
        self.user || self.combined
    }
}

/// Handler which accepts nothing, used until an application installs its own.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHandler;

impl AudioReceiveHandler for NullHandler {}

/// Routes packets and frames to an [`AudioReceiveHandler`] according to the
/// capabilities it reported when installed.
#[derive(Clone)]
pub struct Dispatcher {
    handler: Arc<dyn AudioReceiveHandler>,
    caps: Capabilities,
}

impl Dispatcher {
    /// Wraps `handler`, querying its capabilities once.
    pub fn new(handler: Arc<dyn AudioReceiveHandler>) -> Self {
        let caps = Capabilities::query(&*handler);
        trace!("Audio handler installed with {:?}.", caps);

        Self { handler, caps }
    }

    /// Delivery paths enabled for this handler.
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Asks the handler whether `user` belongs in the combined mix.
    ///
    /// Always false if combined audio is disabled.
    pub fn includes(&self, user: UserId) -> bool {
        self.caps.combined && self.handler.include_user_in_combined_audio(user)
    }

    /// Hands a freshly arrived packet to the handler, if it accepts encoded audio.
    pub fn deliver_encoded(&self, packet: &Arc<RawVoicePacket>) {
        if self.caps.encoded {
            self.handler.handle_encoded_audio(packet);
        }
    }

    /// Hands one user's decoded frame to the handler, if it accepts user audio.
    pub fn deliver_user(&self, audio: &UserAudioFrame) {
        if self.caps.user {
            self.handler.handle_user_audio(audio);
        }
    }

    /// Hands a tick's mix to the handler, if it accepts combined audio.
    pub fn deliver_combined(&self, combined: &CombinedFrame) {
        if self.caps.combined {
            self.handler.handle_combined_audio(combined);
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(NullHandler))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("caps", &self.caps)
            .finish()
    }
}
