use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::camera::pool::FrameLease;
use crate::camera::types::BufferStatus;

/// A completed, converted frame handed back to the consumer.
pub struct CaptureResult {
    /// Sequence number of the capture request this frame satisfies.
    pub sequence: u64,
    /// Lease on the converted output buffer. Dropping it returns the buffer
    /// to the pool.
    pub buffer: FrameLease,
    /// Arrival timestamp of the source frame, microseconds since the epoch.
    pub timestamp_us: u64,
    pub status: BufferStatus,
}

/// Notifications delivered to the capture consumer.
///
/// Delivered over a channel rather than raw callbacks so cancellation is
/// well-defined: once the session starts closing, no further events are
/// produced and the receiver simply disconnects.
pub enum SessionEvent {
    /// Immediate acknowledgment that a request was accepted, decoupled from
    /// pixel delivery.
    Shutter { sequence: u64, timestamp_us: u64 },
    /// A converted frame satisfying one outstanding request.
    Result(CaptureResult),
    /// A request that can no longer be satisfied (rejected or flushed).
    RequestError { sequence: u64 },
}

/// Sending half of a session's event channel.
///
/// Cloneable; `close` makes every subsequent send from any clone a no-op.
#[derive(Clone)]
pub struct EventSender {
    tx: flume::Sender<SessionEvent>,
    closed: Arc<AtomicBool>,
}

impl EventSender {
    /// Deliver an event unless the session is closed. A consumer that has
    /// dropped its receiver is ignored.
    pub fn send(&self, event: SessionEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.tx.send(event);
    }

    /// Stop all future deliveries.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Create a session event channel.
pub fn channel() -> (EventSender, flume::Receiver<SessionEvent>) {
    let (tx, rx) = flume::unbounded();
    (
        EventSender {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        },
        rx,
    )
}
