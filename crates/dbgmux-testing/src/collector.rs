//! Broadcast event collection for assertions

use dbgmux_core::DebugEvent;
use tokio::sync::broadcast;

/// Drains a link's event subscription so tests can assert on what was
/// broadcast between two points.
pub struct EventCollector {
    receiver: broadcast::Receiver<DebugEvent>,
}

impl EventCollector {
    pub fn new(receiver: broadcast::Receiver<DebugEvent>) -> Self {
        Self { receiver }
    }

    /// All events broadcast since the last take.
    pub fn take(&mut self) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Drop pending events.
    pub fn discard(&mut self) {
        let _ = self.take();
    }
}

/// Count events matching a predicate.
pub fn count_matching(events: &[DebugEvent], pred: impl Fn(&DebugEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_and_discard() {
        let (tx, rx) = broadcast::channel(16);
        let mut collector = EventCollector::new(rx);

        tx.send(DebugEvent::DebuggerBusy).unwrap();
        tx.send(DebugEvent::DebuggerReadyForInput).unwrap();
        assert_eq!(collector.take().len(), 2);
        assert!(collector.take().is_empty());

        tx.send(DebugEvent::DebuggerBusy).unwrap();
        collector.discard();
        assert!(collector.take().is_empty());
    }
}
