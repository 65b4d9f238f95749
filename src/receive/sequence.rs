use std::num::Wrapping;

pub(crate) type RtpSequence = Wrapping<u16>;

/// Classification of a sequence number relative to a tracker's expectation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SequenceOrder {
    /// The immediate successor of the last decoded packet (or the first packet seen).
    InOrder,
    /// Later than expected: at least one packet was skipped.
    Ahead,
    /// A duplicate of, or older than, the last decoded packet.
    Behind,
}

/// Last in-order sequence number decoded for one source.
///
/// Checking order never mutates the tracker; only a confirmed decode does,
/// via [`Self::advance`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SequenceTracker {
    last: Option<RtpSequence>,
}

impl SequenceTracker {
    /// Creates a tracker with no prior state, which accepts any first packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last successfully decoded packet.
    pub fn last_sequence(&self) -> Option<u16> {
        self.last.map(|v| v.0)
    }

    /// The next sequence number which will be accepted, if one is expected.
    pub fn expected(&self) -> Option<u16> {
        self.last.map(|v| (v + Wrapping(1)).0)
    }

    /// Returns whether `candidate` directly follows the last decoded sequence number,
    /// accounting for 16-bit wraparound.
    pub fn is_in_order(&self, candidate: u16) -> bool {
        self.classify(candidate) == SequenceOrder::InOrder
    }

    /// Places `candidate` relative to the expected sequence number.
    ///
    /// Wrapping distances of up to half the sequence space count as ahead.
    pub fn classify(&self, candidate: u16) -> SequenceOrder {
        let last = match self.last {
            Some(last) => last,
            None => return SequenceOrder::InOrder,
        };

        match (Wrapping(candidate) - last).0 as i16 {
            1 => SequenceOrder::InOrder,
            d if d > 1 => SequenceOrder::Ahead,
            _ => SequenceOrder::Behind,
        }
    }

    /// Records `sequence` as the last successfully decoded packet.
    pub fn advance(&mut self, sequence: u16) {
        self.last = Some(Wrapping(sequence));
    }

    /// Makes `sequence` the next in-order packet, discarding prior history.
    pub fn resync(&mut self, sequence: u16) {
        self.last = Some(Wrapping(sequence) - Wrapping(1));
    }

    /// Forgets all state, so that the next packet is accepted as a fresh start.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
