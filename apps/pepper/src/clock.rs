use std::time::Duration;

use pepper_core::AlertExpiry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::runtime::DisplayEvent;

pub const TICK_PERIOD: Duration = Duration::from_millis(1000);

/// One-second ticker feeding the event loop, independent of the relay.
///
/// The first tick fires one period after start; late ticks are delayed
/// rather than burst. The ticker stops when dropped or when the event loop
/// goes away.
pub struct LocalClock {
    handle: JoinHandle<()>,
}

impl LocalClock {
    pub fn start(events: mpsc::UnboundedSender<DisplayEvent>) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if events.send(DisplayEvent::Tick).is_err() {
                    debug!("event loop gone, stopping clock");
                    break;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for LocalClock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Posts `AlertExpired` for this alert once its display window has passed.
pub fn schedule_alert_expiry(
    events: mpsc::UnboundedSender<DisplayEvent>,
    expiry: AlertExpiry,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(expiry.delay_ms)).await;
        let _ = events.send(DisplayEvent::AlertExpired(expiry.raised_at_ms));
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::tokio_timeout_test(30, paused)]
    async fn ticks_once_per_second_after_first_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        let _clock = LocalClock::start(tx);

        for expected in 1..=3u64 {
            assert!(matches!(rx.recv().await, Some(DisplayEvent::Tick)));
            assert_eq!(started.elapsed().as_secs(), expected);
        }
    }

    #[test_timeout::tokio_timeout_test(60, paused)]
    async fn expiry_carries_raised_timestamp() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();
        schedule_alert_expiry(
            tx,
            AlertExpiry {
                raised_at_ms: 4_200,
                delay_ms: 20_000,
            },
        );
        match rx.recv().await {
            Some(DisplayEvent::AlertExpired(raised)) => assert_eq!(raised, 4_200),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(started.elapsed().as_millis(), 20_000);
    }
}
