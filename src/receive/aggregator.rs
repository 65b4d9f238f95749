use super::{CombinedFrame, Dispatcher, Mixdown, RawVoicePacket, SequenceOrder, UserAudioFrame};
use crate::Config;
use flume::Receiver;
use parking_lot::RwLock;
use std::{collections::VecDeque, num::NonZeroUsize, sync::Arc};
use tracing::{debug, trace};

// `true` if `a` precedes `b` in wrapping sequence space.
#[inline]
fn seq_before(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) < 0
}

#[derive(Debug)]
struct SourceQueue {
    ssrc: u32,
    pending: VecDeque<Arc<RawVoicePacket>>,
}

impl SourceQueue {
    fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            pending: VecDeque::new(),
        }
    }

    /// Slots a packet into sequence order.
    ///
    /// Duplicates, and packets older than what the source has already decoded,
    /// are dropped here so they never occupy a tick. A packet bound to a new
    /// decoder slot flushes anything queued against the old one.
    fn insert(&mut self, packet: Arc<RawVoicePacket>) {
        let seq = packet.sequence();

        if let Some(head) = self.pending.front() {
            if !Arc::ptr_eq(head.slot(), packet.slot()) {
                debug!(
                    "SSRC {}: decoder state replaced, flushing {} queued packet(s).",
                    self.ssrc,
                    self.pending.len()
                );
                self.pending.clear();
            }
        }

        if is_stale(&packet) {
            trace!("SSRC {}: stale packet {} dropped.", self.ssrc, seq);
            return;
        }

        if self.pending.iter().any(|p| p.sequence() == seq) {
            trace!("SSRC {}: duplicate packet {} dropped.", self.ssrc, seq);
            return;
        }

        let index = self
            .pending
            .iter()
            .position(|p| seq_before(seq, p.sequence()))
            .unwrap_or_else(|| self.pending.len());

        self.pending.insert(index, packet);
    }

    fn truncate_front(&mut self, max_pending: usize) {
        while self.pending.len() > max_pending {
            if let Some(old) = self.pending.pop_front() {
                debug!(
                    "SSRC {}: backlog full, dropping packet {}.",
                    self.ssrc,
                    old.sequence()
                );
            }
        }
    }

    /// Takes this tick's packet, if it may be decoded.
    ///
    /// Packets which went stale while queued are discarded without costing the
    /// tick. A packet which cannot be decoded in order (and does not trigger a
    /// resync) is consumed all the same: its source sits this tick out.
    fn take_ready(&mut self) -> Option<Arc<RawVoicePacket>> {
        loop {
            let packet = self.pending.pop_front()?;

            if packet.is_in_order() {
                return Some(packet);
            }

            if is_stale(&packet) {
                trace!("SSRC {}: stale packet {} dropped.", self.ssrc, packet.sequence());
                continue;
            }

            if packet.slot().note_out_of_order(packet.sequence()) {
                return Some(packet);
            }

            trace!(
                "SSRC {}: packet {} skipped (expected {:?}).",
                self.ssrc,
                packet.sequence(),
                packet.slot().last_sequence().map(|s| s.wrapping_add(1)),
            );

            return None;
        }
    }
}

// An undecoded packet at or before its source's last decoded sequence number
// can never be decoded.
fn is_stale(packet: &RawVoicePacket) -> bool {
    !packet.is_decoded() && packet.slot().classify(packet.sequence()) == SequenceOrder::Behind
}

/// Gathers arrived packets into one [`CombinedFrame`] per tick.
///
/// Each tick takes a snapshot of the packets which arrived since the last one;
/// anything arriving during the tick waits for the next. At most one packet per
/// source is consumed per tick, with the remainder held in a small reorder buffer.
#[derive(Debug)]
pub struct FrameAggregator {
    rx: Receiver<Arc<RawVoicePacket>>,
    sources: Vec<SourceQueue>,
    dispatcher: Arc<RwLock<Dispatcher>>,
    max_pending: NonZeroUsize,
}

impl FrameAggregator {
    pub(crate) fn new(
        rx: Receiver<Arc<RawVoicePacket>>,
        dispatcher: Arc<RwLock<Dispatcher>>,
        config: &Config,
    ) -> Self {
        Self {
            rx,
            sources: Vec::new(),
            dispatcher,
            max_pending: config.max_pending_frames,
        }
    }

    pub(crate) fn set_config(&mut self, config: &Config) {
        self.max_pending = config.max_pending_frames;

        for source in &mut self.sources {
            source.truncate_front(self.max_pending.get());
        }
    }

    /// Number of packets waiting in per-source buffers.
    pub fn pending(&self) -> usize {
        self.sources.iter().map(|s| s.pending.len()).sum()
    }

    /// Drops all buffered packets from `ssrc`.
    pub fn forget(&mut self, ssrc: u32) {
        self.sources.retain(|s| s.ssrc != ssrc);
    }

    /// Runs one 20ms cycle: collect, decode, deliver per-user audio, then mix and
    /// publish the combined frame.
    ///
    /// A frame is produced (and delivered, if enabled) even when nothing arrived.
    pub fn tick(&mut self) -> CombinedFrame {
        self.collect();

        let dispatcher = self.dispatcher.read().clone();
        let caps = dispatcher.capabilities();
        let mut mix = Mixdown::new();

        if caps.needs_decode() {
            for source in &mut self.sources {
                let packet = match source.take_ready() {
                    Some(p) => p,
                    None => continue,
                };

                let user_id = packet.user_id();

                let frame = match packet.decode() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!("SSRC {}: {}.", source.ssrc, e);
                        continue;
                    },
                };

                if caps.user {
                    dispatcher.deliver_user(&UserAudioFrame {
                        user_id,
                        ssrc: source.ssrc,
                        sequence: packet.sequence(),
                        frame: frame.clone(),
                    });
                }

                if dispatcher.includes(user_id) {
                    mix.add(user_id, frame.samples());
                }
            }
        } else {
            // Nobody wants audio: keep buffers from growing.
            for source in &mut self.sources {
                source.pending.pop_front();
            }
        }

        self.sources.retain(|s| !s.pending.is_empty());

        let frame = mix.finish();
        dispatcher.deliver_combined(&frame);

        frame
    }

    fn collect(&mut self) {
        let snapshot = self.rx.len();

        for packet in self.rx.try_iter().take(snapshot) {
            let ssrc = packet.ssrc();

            let index = match self.sources.iter().position(|s| s.ssrc == ssrc) {
                Some(i) => i,
                None => {
                    self.sources.push(SourceQueue::new(ssrc));
                    self.sources.len() - 1
                },
            };

            let source = &mut self.sources[index];
            source.insert(packet);
            source.truncate_front(self.max_pending.get());
        }
    }
}
