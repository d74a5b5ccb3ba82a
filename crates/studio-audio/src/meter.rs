//! Level metering distribution.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use studio_ipc::VolumeLevels;

use crate::error::AudioError;
use crate::AudioResult;

/// How often callback threads check for shutdown.
const CALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Subscriber {
    sender: Sender<VolumeLevels>,
    /// Kept to evict the oldest entry when the queue is full.
    evict: Receiver<VolumeLevels>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl Subscriber {
    /// Push without blocking, evicting the oldest queued entry if full.
    /// Returns false once the subscription is gone.
    fn offer(&self, levels: VolumeLevels) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut pending = levels;
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return true,
                Err(TrySendError::Full(levels)) => {
                    if self.evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    pending = levels;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}

/// Pull side of a meter subscription.
///
/// Holds at most `capacity` events; when the consumer falls behind the
/// oldest events are discarded.
pub struct MeterSubscription {
    receiver: Receiver<VolumeLevels>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl MeterSubscription {
    /// Take the next event without waiting.
    pub fn try_recv(&self) -> Option<VolumeLevels> {
        match self.receiver.try_recv() {
            Ok(levels) => Some(levels),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<VolumeLevels, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Take every queued event.
    pub fn drain(&self) -> Vec<VolumeLevels> {
        self.receiver.try_iter().collect()
    }

    /// Number of events discarded because this subscription was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns true once the feed has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for MeterSubscription {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Fan-out of engine level measurements to subscribers.
pub struct MeterFeed {
    subscribers: Mutex<Vec<Subscriber>>,
    callbacks: Mutex<Vec<JoinHandle<()>>>,
    should_stop: Arc<AtomicBool>,
    published: AtomicU64,
}

impl MeterFeed {
    /// Create an empty feed.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            should_stop: Arc::new(AtomicBool::new(false)),
            published: AtomicU64::new(0),
        }
    }

    /// Subscribe with a queue of `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> AudioResult<MeterSubscription> {
        if self.should_stop.load(Ordering::SeqCst) {
            return Err(AudioError::FeedClosed);
        }
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let closed = Arc::new(AtomicBool::new(false));

        self.subscribers.lock().push(Subscriber {
            sender,
            evict: receiver.clone(),
            dropped: Arc::clone(&dropped),
            closed: Arc::clone(&closed),
        });

        debug!(capacity, "Meter subscription added");
        Ok(MeterSubscription {
            receiver,
            dropped,
            closed,
        })
    }

    /// Run `callback` for every event on a dedicated delivery thread.
    ///
    /// A slow callback only loses its own oldest events.
    pub fn add_callback<F>(&self, capacity: usize, callback: F) -> AudioResult<()>
    where
        F: Fn(&VolumeLevels) + Send + 'static,
    {
        let subscription = self.subscribe(capacity)?;
        let should_stop = Arc::clone(&self.should_stop);

        let handle = thread::Builder::new()
            .name("studio-volmeter".to_string())
            .spawn(move || {
                while !should_stop.load(Ordering::SeqCst) {
                    match subscription.recv_timeout(CALLBACK_POLL_INTERVAL) {
                        Ok(levels) => callback(&levels),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(dropped = subscription.dropped(), "Meter callback exiting");
            })
            .map_err(|e| {
                warn!("Failed to spawn meter callback thread: {}", e);
                AudioError::FeedClosed
            })?;

        self.callbacks.lock().push(handle);
        info!("Meter callback registered");
        Ok(())
    }

    /// Deliver one measurement to every subscriber. Never blocks.
    pub fn publish(&self, levels: VolumeLevels) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }

        let mut gone = Vec::new();
        for (i, subscriber) in subscribers.iter().enumerate() {
            if !subscriber.offer(levels.clone()) {
                gone.push(i);
            }
        }

        for i in gone.into_iter().rev() {
            trace!("Removing closed meter subscription");
            subscribers.swap_remove(i);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Total events published.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Close every subscription and join callback threads. Idempotent.
    pub fn close(&self) {
        if self.should_stop.swap(true, Ordering::SeqCst) {
            return;
        }
        for subscriber in self.subscribers.lock().drain(..) {
            subscriber.closed.store(true, Ordering::Release);
        }
        let handles: Vec<_> = self.callbacks.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        info!("Meter feed closed");
    }
}

impl Default for MeterFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MeterFeed {
    fn drop(&mut self) {
        self.close();
    }
}
