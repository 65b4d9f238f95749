#![allow(missing_docs)]

use flume::Receiver;

/// Drives the aggregator's clock in tests.
#[derive(Clone, Debug)]
pub enum TickStyle {
    /// Ticks every 20ms of wall-clock time.
    Timed,
    /// Runs as many ticks as each received count requests, as fast as possible,
    /// and stops when the sender is dropped.
    UntimedWithExecLimit(Receiver<u64>),
}
