use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::info;

const HISTORY_LEN: usize = 128;
const FEED_CAPACITY: usize = 256;

/// Latest human-readable status line, plus a short history.
///
/// [`StatusBoard::subscribe`] only sees the newest line; [`StatusBoard::feed`]
/// sees every line in publish order.
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<String>>,
    feed: broadcast::Sender<String>,
    history: Arc<Mutex<VecDeque<String>>>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(String::new());
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            tx: Arc::new(tx),
            feed,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LEN))),
        }
    }

    pub fn publish(&self, status: impl Into<String>) {
        let status = status.into();
        info!(status = %status, "status");
        {
            let mut history = self.history.lock();
            if history.len() == HISTORY_LEN {
                history.pop_front();
            }
            history.push_back(status.clone());
        }
        let _ = self.feed.send(status.clone());
        self.tx.send_replace(status);
    }

    pub fn current(&self) -> String {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn feed(&self) -> broadcast::Receiver<String> {
        self.feed.subscribe()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn count(&self, status: &str) -> usize {
        self.history.lock().iter().filter(|s| *s == status).count()
    }

    /// Resolves once `status` has been published at least once.
    pub async fn wait_for(&self, status: &str) {
        let mut rx = self.subscribe();
        loop {
            if self.count(status) > 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_latest_and_bounded_history() {
        let board = StatusBoard::new();
        for n in 0..(HISTORY_LEN + 5) {
            board.publish(format!("status {n}"));
        }
        assert_eq!(board.current(), format!("status {}", HISTORY_LEN + 4));
        let history = board.history();
        assert_eq!(history.len(), HISTORY_LEN);
        assert_eq!(history[0], "status 5");
    }

    #[test_timeout::tokio_timeout_test]
    async fn feed_keeps_every_line_of_a_burst() {
        let board = StatusBoard::new();
        let mut feed = board.feed();
        let mut latest = board.subscribe();
        board.publish(r#"Received: {"command":"timerPacing","time":"5.30"}"#);
        board.publish("Pacing: 5.30");

        assert_eq!(
            feed.recv().await.unwrap(),
            r#"Received: {"command":"timerPacing","time":"5.30"}"#
        );
        assert_eq!(feed.recv().await.unwrap(), "Pacing: 5.30");
        latest.changed().await.unwrap();
        assert_eq!(*latest.borrow_and_update(), "Pacing: 5.30");
        assert!(!latest.has_changed().unwrap());
    }

    #[test_timeout::tokio_timeout_test]
    async fn wait_for_sees_later_publish() {
        let board = StatusBoard::new();
        let waiter = {
            let board = board.clone();
            tokio::spawn(async move { board.wait_for("Glasses ready").await })
        };
        board.publish("Connecting");
        board.publish("Glasses ready");
        waiter.await.unwrap();
        assert_eq!(board.count("Glasses ready"), 1);
    }
}
