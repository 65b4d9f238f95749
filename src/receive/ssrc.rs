use super::{DecoderFactory, DecoderSlot};
use crate::{
    constants::DISCONNECT_GRACE,
    error::Result,
    id::UserId,
    model::{ClientDisconnect, Speaking, SpeakingState},
    Config,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::{
    num::NonZeroU16,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, trace};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SsrcInfo {
    user_id: UserId,
    speaking: SpeakingState,
}

struct SlotSettings {
    factory: DecoderFactory,
    resync_threshold: Option<NonZeroU16>,
}

/// Registry mapping synchronisation sources to users, and owner of each source's
/// [`DecoderSlot`].
///
/// Mappings are learned from [`Speaking`] payloads. Slots are created on a source's
/// first packet (or by [`Self::create_slot`]) and disposed explicitly, on
/// [client disconnect](Self::client_disconnect), or after idling past
/// [`Config::decode_state_timeout`].
pub struct SsrcTracker {
    ssrc_users: DashMap<u32, SsrcInfo>,
    user_ssrcs: DashMap<UserId, u32>,
    slots: DashMap<u32, Arc<DecoderSlot>>,
    disconnected: DashMap<u32, Instant>,
    settings: RwLock<SlotSettings>,
}

impl SsrcTracker {
    /// Creates an empty registry whose slots follow `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            ssrc_users: DashMap::new(),
            user_ssrcs: DashMap::new(),
            slots: DashMap::new(),
            disconnected: DashMap::new(),
            settings: RwLock::new(SlotSettings {
                factory: config.decoder_factory.clone(),
                resync_threshold: config.resync_threshold,
            }),
        }
    }

    /// Applies decoder settings from `config` to all slots created from now on.
    pub fn set_config(&self, config: &Config) {
        let mut settings = self.settings.write();
        settings.factory = config.decoder_factory.clone();
        settings.resync_threshold = config.resync_threshold;
    }

    /// Records a speaking state update, binding its SSRC to a user if one is given.
    pub fn speaking_update(&self, msg: &Speaking) {
        self.disconnected.remove(&msg.ssrc);

        if let Some(user_id) = msg.user_id {
            if let Some(old_ssrc) = self.user_ssrcs.insert(user_id, msg.ssrc) {
                if old_ssrc != msg.ssrc {
                    debug!("User {} moved from SSRC {} to {}.", user_id, old_ssrc, msg.ssrc);
                    self.ssrc_users.remove(&old_ssrc);
                }
            }

            self.ssrc_users.insert(msg.ssrc, SsrcInfo {
                user_id,
                speaking: msg.speaking,
            });
        } else if let Some(mut info) = self.ssrc_users.get_mut(&msg.ssrc) {
            info.speaking = msg.speaking;
        } else {
            trace!("Speaking update for unmapped SSRC {}.", msg.ssrc);
        }
    }

    /// Marks a departed user's source for disposal after a short grace period,
    /// letting any buffered packets drain first.
    pub fn client_disconnect(&self, msg: &ClientDisconnect) {
        if let Some((_, ssrc)) = self.user_ssrcs.remove(&msg.user_id) {
            debug!("User {} (SSRC {}) disconnected.", msg.user_id, ssrc);
            self.disconnected.insert(ssrc, Instant::now() + DISCONNECT_GRACE);
        }
    }

    /// The user bound to `ssrc`, or [`UserId::UNKNOWN`] if none is known yet.
    pub fn resolve(&self, ssrc: u32) -> UserId {
        self.ssrc_users
            .get(&ssrc)
            .map_or(UserId::UNKNOWN, |info| info.user_id)
    }

    /// The most recent speaking flags announced for `ssrc`.
    pub fn speaking_state(&self, ssrc: u32) -> Option<SpeakingState> {
        self.ssrc_users.get(&ssrc).map(|info| info.speaking)
    }

    /// The source currently used by `user_id`.
    pub fn ssrc_of(&self, user_id: UserId) -> Option<u32> {
        self.user_ssrcs.get(&user_id).map(|v| *v)
    }

    /// Returns the decoder slot for `ssrc`, creating it if this is a new source.
    pub fn slot(&self, ssrc: u32) -> Result<Arc<DecoderSlot>> {
        if let Some(slot) = self.slots.get(&ssrc) {
            return Ok(slot.clone());
        }

        let fresh = self.build_slot(ssrc)?;

        Ok(self.slots.entry(ssrc).or_insert(fresh).clone())
    }

    /// Creates a fresh decoder slot for `ssrc`, replacing any existing one.
    pub fn create_slot(&self, ssrc: u32) -> Result<Arc<DecoderSlot>> {
        let fresh = self.build_slot(ssrc)?;
        self.slots.insert(ssrc, fresh.clone());

        Ok(fresh)
    }

    /// Disposes of the decoder slot for `ssrc`, returning it if one existed.
    ///
    /// Packets still holding the slot may finish decoding; the next packet from this
    /// source starts a new slot.
    pub fn dispose(&self, ssrc: u32) -> Option<Arc<DecoderSlot>> {
        self.disconnected.remove(&ssrc);
        self.slots.remove(&ssrc).map(|(_, slot)| slot)
    }

    /// Disposes of slots for sources which disconnected more than a grace period ago,
    /// or which have been idle for longer than `idle_timeout`.
    ///
    /// Returns the SSRCs which were disposed.
    pub fn prune(&self, now: Instant, idle_timeout: Duration) -> Vec<u32> {
        // Collect first: removing during iteration would deadlock the shard.
        let mut dead: Vec<u32> = self
            .disconnected
            .iter()
            .filter(|entry| *entry.value() <= now)
            .map(|entry| *entry.key())
            .collect();

        dead.extend(
            self.slots
                .iter()
                .filter(|entry| {
                    now.saturating_duration_since(entry.value().last_active()) > idle_timeout
                })
                .map(|entry| *entry.key()),
        );

        dead.sort_unstable();
        dead.dedup();

        for ssrc in &dead {
            if self.disconnected.remove(ssrc).is_some() {
                self.ssrc_users.remove(ssrc);
            }
            self.slots.remove(ssrc);
            trace!("Pruned decoder state for SSRC {}.", ssrc);
        }

        dead
    }

    /// Number of live decoder slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn build_slot(&self, ssrc: u32) -> Result<Arc<DecoderSlot>> {
        let settings = self.settings.read();
        let decoder = (settings.factory)()?;

        trace!("Created decoder state for SSRC {}.", ssrc);

        Ok(Arc::new(DecoderSlot::new(
            ssrc,
            decoder,
            settings.resync_threshold,
        )))
    }
}

impl std::fmt::Debug for SsrcTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsrcTracker")
            .field("known_ssrcs", &self.ssrc_users.len())
            .field("slots", &self.slots.len())
            .field("disconnected", &self.disconnected.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{counting_config, CountingDecoder};

    fn speaking(ssrc: u32, user: Option<u64>) -> Speaking {
        Speaking {
            delay: Some(0),
            speaking: SpeakingState::MICROPHONE,
            ssrc,
            user_id: user.map(UserId),
        }
    }

    #[test]
    fn unmapped_ssrc_resolves_to_placeholder() {
        let (config, _) = counting_config();
        let tracker = SsrcTracker::new(&config);

        assert!(tracker.resolve(55).is_unknown());

        tracker.speaking_update(&speaking(55, Some(9)));
        assert_eq!(tracker.resolve(55), UserId(9));
        assert_eq!(tracker.ssrc_of(UserId(9)), Some(55));
        assert_eq!(tracker.speaking_state(55), Some(SpeakingState::MICROPHONE));
    }

    #[test]
    fn flag_only_update_keeps_user() {
        let (config, _) = counting_config();
        let tracker = SsrcTracker::new(&config);
        tracker.speaking_update(&speaking(1, Some(2)));

        let mut silent = speaking(1, None);
        silent.speaking = SpeakingState::empty();
        tracker.speaking_update(&silent);

        assert_eq!(tracker.resolve(1), UserId(2));
        assert_eq!(tracker.speaking_state(1), Some(SpeakingState::empty()));
    }

    #[test]
    fn slots_are_created_once_per_source() {
        let (config, decoder) = counting_config();
        let tracker = SsrcTracker::new(&config);

        let a = tracker.slot(1).unwrap();
        let b = tracker.slot(1).unwrap();
        let c = tracker.slot(2).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(tracker.slot_count(), 2);
        assert_eq!(decoder.instances(), 2);
    }

    #[test]
    fn dispose_then_recreate() {
        let (config, _) = counting_config();
        let tracker = SsrcTracker::new(&config);

        let old = tracker.slot(3).unwrap();
        assert!(tracker.dispose(3).is_some());
        assert!(tracker.dispose(3).is_none());

        let new = tracker.slot(3).unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
    }

    #[test]
    fn disconnect_prunes_after_grace() {
        let (config, _) = counting_config();
        let tracker = SsrcTracker::new(&config);
        tracker.speaking_update(&speaking(8, Some(80)));
        tracker.slot(8).unwrap();

        tracker.client_disconnect(&ClientDisconnect {
            user_id: UserId(80),
        });

        let now = Instant::now();
        assert!(tracker.prune(now, Duration::from_secs(60)).is_empty());

        let pruned = tracker.prune(now + DISCONNECT_GRACE * 2, Duration::from_secs(60));
        assert_eq!(pruned, vec![8]);
        assert_eq!(tracker.slot_count(), 0);
        assert!(tracker.resolve(8).is_unknown());
    }

    #[test]
    fn idle_slots_are_pruned() {
        let (config, _) = counting_config();
        let tracker = SsrcTracker::new(&config);
        tracker.slot(4).unwrap();

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(tracker.prune(later, Duration::from_secs(60)), vec![4]);
    }

    #[test]
    fn failed_factory_is_reported() {
        let (config, decoder) = counting_config();
        decoder.fail_creation(true);
        let tracker = SsrcTracker::new(&config);

        assert!(tracker.slot(1).is_err());
        assert_eq!(tracker.slot_count(), 0);
    }

    #[test]
    fn new_config_applies_to_new_slots() {
        let (config, first) = counting_config();
        let tracker = SsrcTracker::new(&config);
        tracker.slot(1).unwrap();

        let second = CountingDecoder::default();
        tracker.set_config(&config.decoder_factory(second.factory()));
        tracker.slot(2).unwrap();

        assert_eq!(first.instances(), 1);
        assert_eq!(second.instances(), 1);
    }
}
