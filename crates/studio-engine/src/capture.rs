//! Single-frame capture requests.
//!
//! Requests against the same source are coalesced: only the first one is
//! sent to the engine and every waiter is answered with the same frame.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use studio_ipc::SourceKey;

use crate::error::{StudioError, StudioResult};

/// Identity of a capture sent to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureId(pub u64);

impl fmt::Display for CaptureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture-{}", self.0)
    }
}

type Waiter = oneshot::Sender<StudioResult<Bytes>>;

/// Pending answer to a screenshot request.
#[derive(Debug)]
pub struct CaptureTicket {
    source: SourceKey,
    receiver: oneshot::Receiver<StudioResult<Bytes>>,
    timeout: Duration,
}

impl CaptureTicket {
    /// Source the frame is taken from.
    pub fn source(&self) -> &SourceKey {
        &self.source
    }

    /// Wait for the encoded image, at most the capture timeout.
    pub async fn wait(self) -> StudioResult<Bytes> {
        match tokio::time::timeout(self.timeout, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StudioError::CaptureFailed(format!(
                "capture of {} was abandoned",
                self.source
            ))),
            Err(_) => Err(StudioError::CaptureFailed(format!(
                "capture of {} timed out after {:?}",
                self.source, self.timeout
            ))),
        }
    }
}

#[derive(Debug)]
struct Pending {
    source: SourceKey,
    waiters: Vec<Waiter>,
    deadline: Instant,
}

impl Pending {
    fn resolve(self, result: Result<Bytes, String>) -> usize {
        let count = self.waiters.len();
        for waiter in self.waiters {
            let answer = match &result {
                Ok(bytes) => Ok(bytes.clone()),
                Err(message) => Err(StudioError::CaptureFailed(message.clone())),
            };
            // A dropped ticket is not an error.
            let _ = waiter.send(answer);
        }
        count
    }
}

/// Outstanding capture requests.
#[derive(Debug)]
pub(crate) struct CaptureService {
    timeout: Duration,
    pending: HashMap<CaptureId, Pending>,
    by_source: HashMap<SourceKey, CaptureId>,
    next_id: u64,
}

impl CaptureService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
            by_source: HashMap::new(),
            next_id: 1,
        }
    }

    /// Register a request. Returns the capture to send to the engine, or
    /// `None` if the request joined one already in flight.
    pub fn request(&mut self, source: SourceKey, now: Instant) -> (CaptureTicket, Option<CaptureId>) {
        let (sender, receiver) = oneshot::channel();
        let ticket = CaptureTicket {
            source: source.clone(),
            receiver,
            timeout: self.timeout,
        };

        if let Some(id) = self.by_source.get(&source) {
            if let Some(pending) = self.pending.get_mut(id) {
                if pending.deadline > now {
                    trace!(%source, capture = %id, "Joining capture in flight");
                    pending.waiters.push(sender);
                    return (ticket, None);
                }
            }
        }

        let id = CaptureId(self.next_id);
        self.next_id += 1;
        self.by_source.insert(source.clone(), id);
        self.pending.insert(
            id,
            Pending {
                source,
                waiters: vec![sender],
                deadline: now + self.timeout,
            },
        );
        (ticket, Some(id))
    }

    /// Answer a capture. Returns the number of waiters resolved.
    pub fn complete(&mut self, id: CaptureId, result: Result<Bytes, String>) -> usize {
        let Some(pending) = self.pending.remove(&id) else {
            debug!(capture = %id, "Answer for unknown capture, ignoring");
            return 0;
        };
        if self.by_source.get(&pending.source) == Some(&id) {
            self.by_source.remove(&pending.source);
        }
        pending.resolve(result)
    }

    /// Fail captures whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<CaptureId> {
        let expired: Vec<CaptureId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            warn!(capture = %id, "Capture expired without an answer");
            self.complete(*id, Err("engine did not answer in time".to_string()));
        }
        expired
    }

    /// Fail every pending capture.
    pub fn fail_all(&mut self, reason: &str) -> usize {
        self.by_source.clear();
        self.pending
            .drain()
            .map(|(_, pending)| pending.resolve(Err(reason.to_string())))
            .sum()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
