//! Event bus - typed broadcast of link state changes
//!
//! Every event carries its full payload as data. Subscribers come and go;
//! emitting with no subscribers is not an error. Slow subscribers may miss
//! events (broadcast semantics); anything that must not be missed (command
//! completion) travels through the dispatcher, not the bus.

use dbgmux_core::DebugEvent;
use tokio::sync::broadcast;
use tracing::trace;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DebugEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: DebugEvent) {
        trace!(?event, "broadcast");
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = DebugEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(DebugEvent::DebuggerBusy);
        assert_eq!(rx1.recv().await.unwrap(), DebugEvent::DebuggerBusy);
        assert_eq!(rx2.recv().await.unwrap(), DebugEvent::DebuggerBusy);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.emit(DebugEvent::DebuggerReadyForInput);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_emit_all_preserves_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit_all([DebugEvent::DebuggerBusy, DebugEvent::DebuggerReadyForInput]);
        assert_eq!(rx.recv().await.unwrap(), DebugEvent::DebuggerBusy);
        assert_eq!(rx.recv().await.unwrap(), DebugEvent::DebuggerReadyForInput);
    }
}
