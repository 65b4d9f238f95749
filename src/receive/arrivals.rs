use super::{Dispatcher, InboundPacket, RawVoicePacket, SsrcTracker};
use crate::error::Result;
use flume::Sender;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Cloneable entry point for voice packets, for use on network threads.
///
/// Ingesting a packet resolves its sender, attaches its source's decoder slot,
/// delivers it to any encoded-audio handler immediately, and queues it for the
/// next tick of the frame aggregator.
#[derive(Clone, Debug)]
pub struct Arrivals {
    tx: Sender<Arc<RawVoicePacket>>,
    tracker: Arc<SsrcTracker>,
    dispatcher: Arc<RwLock<Dispatcher>>,
}

impl Arrivals {
    pub(crate) fn new(
        tx: Sender<Arc<RawVoicePacket>>,
        tracker: Arc<SsrcTracker>,
        dispatcher: Arc<RwLock<Dispatcher>>,
    ) -> Self {
        Self {
            tx,
            tracker,
            dispatcher,
        }
    }

    /// Wraps one received voice frame and hands it to the pipeline.
    ///
    /// Fails only if a decoder could not be created for a new source.
    pub fn ingest(&self, packet: InboundPacket) -> Result<Arc<RawVoicePacket>> {
        let user_id = self.tracker.resolve(packet.ssrc);
        let slot = self.tracker.slot(packet.ssrc)?;
        slot.touch();

        let packet = Arc::new(RawVoicePacket::new(packet, user_id, slot));

        trace!(
            "Packet {} from SSRC {} ({}), {}B.",
            packet.sequence(),
            packet.ssrc(),
            packet.user_id(),
            packet.opus_len(),
        );

        // Clone out so that handlers may replace themselves from inside a callback.
        let dispatcher = self.dispatcher.read().clone();
        dispatcher.deliver_encoded(&packet);

        if self.tx.send(packet.clone()).is_err() {
            debug!("Frame aggregator has stopped: packet will not be mixed.");
        }

        Ok(packet)
    }

    /// The registry used to resolve packet senders.
    pub fn ssrc_tracker(&self) -> &Arc<SsrcTracker> {
        &self.tracker
    }
}
