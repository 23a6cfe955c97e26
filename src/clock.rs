//! Centralized clock.
//!
//! One owned ticker replaces per-view polling timers. Views call
//! `subscribe()` when they mount and drop the returned guard when they
//! unmount; the guard is the only way to hold a subscription, so release
//! cannot be forgotten.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Ticks buffered per subscriber before it starts lagging.
const TICK_BUFFER: usize = 16;

pub struct ClockService {
    sender: broadcast::Sender<DateTime<Utc>>,
    subscribers: Arc<AtomicUsize>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ClockService {
    /// Start ticking every `period`.
    pub fn spawn(period: Duration) -> Self {
        let (sender, _) = broadcast::channel(TICK_BUFFER);
        let (stop, mut stopped) = oneshot::channel::<()>();
        let tx = sender.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_ms = period.as_millis() as u64, "Clock started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // No subscribers is not an error.
                        let _ = tx.send(Utc::now());
                    }
                    _ = &mut stopped => break,
                }
            }
            debug!("Clock stopped");
        });

        Self {
            sender,
            subscribers: Arc::new(AtomicUsize::new(0)),
            stop: Some(stop),
            task: Some(task),
        }
    }

    pub fn subscribe(&self) -> ClockSubscription {
        self.subscribers.fetch_add(1, Ordering::SeqCst);
        ClockSubscription {
            receiver: self.sender.subscribe(),
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::SeqCst)
    }

    /// Stop the ticker and wait for it to exit. Subscribers then see `None`.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ClockService {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct ClockSubscription {
    receiver: broadcast::Receiver<DateTime<Utc>>,
    subscribers: Arc<AtomicUsize>,
}

impl ClockSubscription {
    /// Wait for the next tick. A subscriber that fell behind skips straight
    /// to the newest tick. Returns `None` once the clock has stopped.
    pub async fn tick(&mut self) -> Option<DateTime<Utc>> {
        loop {
            match self.receiver.recv().await {
                Ok(now) => return Some(now),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Clock subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ClockSubscription {
    fn drop(&mut self) {
        self.subscribers.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
