#![allow(missing_docs)]

use crate::Config;

/// Control messages for the frame aggregator's tick task.
#[derive(Debug)]
pub enum ReceiverMessage {
    SetConfig(Config),

    Poison,
}

/// Control messages for a UDP receive task.
#[derive(Debug)]
pub enum UdpRxMessage {
    SetConfig(Config),

    Poison,
}
