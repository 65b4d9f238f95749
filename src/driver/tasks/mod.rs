#![allow(missing_docs)]

#[cfg(feature = "driver")]
pub mod error;
pub mod message;
pub(crate) mod tick;
#[cfg(feature = "driver")]
pub(crate) mod udp_rx;

use crate::{
    receive::{FrameAggregator, SsrcTracker},
    Config,
};
#[cfg(feature = "driver")]
use crate::receive::Arrivals;
use flume::Receiver;
use message::*;
use std::sync::Arc;
use tokio::spawn;
use tracing::trace;
use tracing_futures::Instrument;
#[cfg(feature = "driver")]
use xsalsa20poly1305::XSalsa20Poly1305 as Cipher;

pub(crate) fn start(
    config: Config,
    rx: Receiver<ReceiverMessage>,
    aggregator: FrameAggregator,
    tracker: Arc<SsrcTracker>,
) {
    spawn(
        async move {
            trace!("Receiver started.");
            tick::runner(config, rx, aggregator, tracker).await;
            trace!("Receiver finished.");
        }
        .instrument(tracing::info_span!("voice_receiver")),
    );
}

#[cfg(feature = "driver")]
pub(crate) fn start_udp(
    config: Config,
    rx: Receiver<UdpRxMessage>,
    cipher: Cipher,
    socket: tokio::net::UdpSocket,
    arrivals: Arrivals,
) {
    spawn(
        udp_rx::runner(rx, cipher, config, socket, arrivals)
            .instrument(tracing::info_span!("udp_rx")),
    );
}
