use super::message::*;
#[cfg(test)]
use crate::driver::test_config::TickStyle;
use crate::{
    constants::*,
    receive::{FrameAggregator, SsrcTracker},
    Config,
};
use flume::Receiver;
use std::sync::Arc;
use tokio::{
    select,
    time::{self, Instant},
};
use tracing::{instrument, trace, warn};

struct Clock {
    deadline: Instant,
    #[cfg(test)]
    style: TickStyle,
    #[cfg(test)]
    remaining_loops: Option<u64>,
}

impl Clock {
    #[allow(unused_variables)]
    fn new(config: &Config) -> Self {
        Self {
            deadline: Instant::now() + TIMESTEP_LENGTH,
            #[cfg(test)]
            style: config.tick_style.clone(),
            #[cfg(test)]
            remaining_loops: None,
        }
    }

    /// Waits until the next tick is due.
    ///
    /// Returns `false` if no further ticks will ever be due.
    #[cfg(test)]
    async fn wait(&mut self) -> bool {
        match &self.style {
            TickStyle::Timed => {
                time::sleep_until(self.deadline).await;
            },
            TickStyle::UntimedWithExecLimit(rx) => {
                if self.remaining_loops.is_none() {
                    match rx.recv_async().await {
                        Ok(new_val) => self.remaining_loops = Some(new_val.wrapping_sub(1)),
                        Err(_) => return false,
                    }
                }

                if let Some(cnt) = self.remaining_loops.as_mut() {
                    if *cnt == 0 {
                        self.remaining_loops = None;
                    } else {
                        *cnt = cnt.wrapping_sub(1);
                    }
                }
            },
        }

        true
    }

    #[cfg(not(test))]
    async fn wait(&mut self) -> bool {
        time::sleep_until(self.deadline).await;
        true
    }

    /// Moves the deadline on by one tick, skipping ahead if the last tick
    /// overran rather than bursting to catch up.
    fn advance(&mut self) {
        #[cfg(test)]
        {
            if let TickStyle::UntimedWithExecLimit(_) = self.style {
                return;
            }
        }

        let (deadline, skipped) = next_deadline(self.deadline, Instant::now());

        if skipped > 0 {
            warn!(
                "Frame aggregator fell behind by {} tick(s): skipping ahead.",
                skipped
            );
        }

        self.deadline = deadline;
    }
}

/// Moves `deadline` on by one tick. If that tick is not after `now`, whole
/// ticks are skipped until it is, and the number skipped is returned.
fn next_deadline(deadline: Instant, now: Instant) -> (Instant, u32) {
    let next = deadline + TIMESTEP_LENGTH;

    if next > now {
        return (next, 0);
    }

    let behind = now - next;
    let skipped = (behind.as_nanos() / TIMESTEP_LENGTH.as_nanos()) as u32 + 1;

    (next + TIMESTEP_LENGTH * skipped, skipped)
}

#[instrument(skip(config, rx, aggregator, tracker))]
pub(crate) async fn runner(
    mut config: Config,
    rx: Receiver<ReceiverMessage>,
    mut aggregator: FrameAggregator,
    tracker: Arc<SsrcTracker>,
) {
    trace!("Frame aggregator started.");

    let mut clock = Clock::new(&config);
    let mut cleanup_time = Instant::now() + CLEANUP_INTERVAL;

    loop {
        select! {
            msg = rx.recv_async() => {
                match msg {
                    Ok(ReceiverMessage::SetConfig(c)) => {
                        aggregator.set_config(&c);
                        config = c;
                    },
                    Ok(ReceiverMessage::Poison) | Err(flume::RecvError::Disconnected) => break,
                }
            },
            due = clock.wait() => {
                if !due {
                    break;
                }

                let frame = aggregator.tick();
                trace!("Tick mixed {} source(s).", frame.contributors().len());

                clock.advance();
            },
            _ = time::sleep_until(cleanup_time) => {
                let now = std::time::Instant::now();

                for ssrc in tracker.prune(now, config.decode_state_timeout) {
                    aggregator.forget(ssrc);
                }

                cleanup_time = Instant::now() + CLEANUP_INTERVAL;
            },
        }
    }

    trace!("Frame aggregator finished.");
}
