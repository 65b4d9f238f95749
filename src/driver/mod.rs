//! Runner for the receive pipeline.
//!
//! A [`VoiceReceiver`] owns the aggregator's tick task, which mixes on a fixed
//! 20ms cadence independently of packet arrival. Packets may be fed in directly
//! from any thread via [`VoiceReceiver::ingest`] or an [`Arrivals`] handle, or,
//! with the `"driver"` feature, read straight from an encrypted voice socket.
//!
//! [`Arrivals`]: crate::receive::Arrivals

#[cfg(feature = "driver")]
mod crypto;
pub(crate) mod tasks;
#[cfg(test)]
pub(crate) mod test_config;

#[cfg(feature = "driver")]
pub use crypto::CryptoMode;

#[cfg(feature = "driver")]
use crate::error::{DriverError, DriverResult};
use crate::{
    error::Result,
    model::{ClientDisconnect, Speaking},
    receive::{
        Arrivals,
        AudioReceiveHandler,
        Dispatcher,
        FrameAggregator,
        InboundPacket,
        RawVoicePacket,
        SsrcTracker,
    },
    Config,
};
use flume::Sender;
use parking_lot::RwLock;
use std::sync::Arc;
#[cfg(feature = "driver")]
use tasks::message::UdpRxMessage;
use tasks::message::ReceiverMessage;
#[cfg(feature = "driver")]
use tokio::net::UdpSocket;
use tracing::instrument;
#[cfg(feature = "driver")]
use xsalsa20poly1305::{aead::Error as CryptoError, KeyInit, XSalsa20Poly1305 as Cipher};

/// The control object for receiving audio from a voice call, handling packet
/// decryption, per-user decoding, mixing, and delivery.
///
/// Dropping the receiver stops its background tasks.
#[derive(Debug)]
pub struct VoiceReceiver {
    config: Config,
    arrivals: Arrivals,
    tracker: Arc<SsrcTracker>,
    dispatcher: Arc<RwLock<Dispatcher>>,
    sender: Sender<ReceiverMessage>,
    #[cfg(feature = "driver")]
    sockets: Vec<Sender<UdpRxMessage>>,
}

impl VoiceReceiver {
    /// Creates a new receiver delivering audio to `handler`.
    ///
    /// This spawns the aggregator task, and so must be called from within a
    /// Tokio runtime.
    pub fn new(config: Config, handler: Arc<dyn AudioReceiveHandler>) -> Self {
        let dispatcher = Arc::new(RwLock::new(Dispatcher::new(handler)));
        let tracker = Arc::new(SsrcTracker::new(&config));

        let (pkt_tx, pkt_rx) = flume::unbounded();
        let arrivals = Arrivals::new(pkt_tx, tracker.clone(), dispatcher.clone());
        let aggregator = FrameAggregator::new(pkt_rx, dispatcher.clone(), &config);

        let (tx, rx) = flume::unbounded();
        tasks::start(config.clone(), rx, aggregator, tracker.clone());

        Self {
            config,
            arrivals,
            tracker,
            dispatcher,
            sender: tx,
            #[cfg(feature = "driver")]
            sockets: Vec::new(),
        }
    }

    /// Hands one decrypted voice frame to the pipeline.
    ///
    /// See [`Arrivals::ingest`].
    pub fn ingest(&self, packet: InboundPacket) -> Result<Arc<RawVoicePacket>> {
        self.arrivals.ingest(packet)
    }

    /// Returns a handle for feeding packets from other threads or tasks.
    pub fn arrivals(&self) -> Arrivals {
        self.arrivals.clone()
    }

    /// Passes a voice gateway speaking update to the SSRC registry.
    #[instrument(skip(self))]
    pub fn speaking_update(&self, msg: &Speaking) {
        self.tracker.speaking_update(msg);
    }

    /// Passes a voice gateway client disconnect to the SSRC registry.
    #[instrument(skip(self))]
    pub fn client_disconnect(&self, msg: &ClientDisconnect) {
        self.tracker.client_disconnect(msg);
    }

    /// Replaces the handler receiving audio.
    ///
    /// The new handler's capabilities are queried once, here.
    pub fn set_handler(&self, handler: Arc<dyn AudioReceiveHandler>) {
        *self.dispatcher.write() = Dispatcher::new(handler);
    }

    /// Sets the configuration for this receiver.
    #[instrument(skip(self))]
    pub fn set_config(&mut self, config: Config) {
        self.tracker.set_config(&config);
        self.config = config.clone();

        #[cfg(feature = "driver")]
        self.sockets
            .retain(|tx| tx.send(UdpRxMessage::SetConfig(config.clone())).is_ok());

        let _ = self.sender.send(ReceiverMessage::SetConfig(config));
    }

    /// Returns this receiver's current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the registry mapping SSRCs to users and decoder state.
    pub fn ssrc_tracker(&self) -> &Arc<SsrcTracker> {
        &self.tracker
    }

    /// Reads voice packets from `socket`, decrypting them with the negotiated
    /// secret `key` according to [`Config::crypto_mode`].
    ///
    /// The socket is read until it fails or this receiver is dropped.
    #[cfg(feature = "driver")]
    #[instrument(skip(self, socket, key))]
    pub fn listen(&mut self, socket: UdpSocket, key: &[u8]) -> DriverResult<()> {
        let cipher = Cipher::new_from_slice(key).map_err(|_| DriverError::Crypto(CryptoError))?;

        let (tx, rx) = flume::unbounded();
        tasks::start_udp(self.config.clone(), rx, cipher, socket, self.arrivals.clone());
        self.sockets.push(tx);

        Ok(())
    }
}

impl Drop for VoiceReceiver {
    fn drop(&mut self) {
        #[cfg(feature = "driver")]
        for tx in &self.sockets {
            let _ = tx.send(UdpRxMessage::Poison);
        }

        let _ = self.sender.send(ReceiverMessage::Poison);
    }
}
