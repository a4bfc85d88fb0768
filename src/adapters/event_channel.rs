//! Task → main event channel.
//!
//! Uses an `embassy-sync` bounded channel to carry [`NodeEvent`]s from the
//! node tasks to the thread that owns the log sink.  Publishing never
//! blocks a task: if the channel is full the event is dropped and counted.
//!
//! ```text
//! ┌──────────────┐                   ┌──────────────┐
//! │ command task │──┐                │              │
//! ├──────────────┤  │  NodeEvent     │  main loop   │──▶ LogEventSink
//! │ telemetry    │──┼──────────────▶│  (receiver)  │
//! ├──────────────┤  │                │              │
//! │ supervisor   │──┘                └──────────────┘
//! └──────────────┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::app::events::NodeEvent;
use crate::app::ports::EventSink;

/// Channel depth.  Two telemetry reports per second plus sporadic command
/// and bus events fit with ample headroom.
pub const EVENT_DEPTH: usize = 16;

type EventQueue = Channel<CriticalSectionRawMutex, NodeEvent, EVENT_DEPTH>;

struct Shared {
    queue: EventQueue,
    dropped: AtomicU32,
}

/// Sending half, one clone per task.
#[derive(Clone)]
pub struct EventPublisher {
    shared: Arc<Shared>,
}

/// Receiving half, owned by the main loop.
pub struct EventReceiver {
    shared: Arc<Shared>,
}

/// Create a connected publisher/receiver pair.
pub fn event_channel() -> (EventPublisher, EventReceiver) {
    let shared = Arc::new(Shared {
        queue: Channel::new(),
        dropped: AtomicU32::new(0),
    });
    (
        EventPublisher {
            shared: Arc::clone(&shared),
        },
        EventReceiver { shared },
    )
}

impl EventSink for EventPublisher {
    fn emit(&mut self, event: &NodeEvent) {
        if self.shared.queue.try_send(event.clone()).is_err() {
            let n = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!("Event channel full, dropped {:?} (total {})", event, n);
        }
    }
}

impl EventReceiver {
    /// Block the calling thread until the next event arrives.
    pub fn next_blocking(&self) -> NodeEvent {
        futures_lite::future::block_on(self.shared.queue.receive())
    }

    /// Next event if one is queued.
    pub fn try_next(&self) -> Option<NodeEvent> {
        self.shared.queue.try_receive().ok()
    }

    /// Forward every queued event to `sink`.  Returns how many were moved.
    pub fn drain_into(&self, sink: &mut impl EventSink) -> usize {
        let mut n = 0;
        while let Some(event) = self.try_next() {
            sink.emit(&event);
            n += 1;
        }
        n
    }

    /// Events lost to a full channel since boot.
    pub fn dropped(&self) -> u32 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}
