//! Outbound delivery switchboard.
//!
//! Each connection task registers an unbounded queue here; the
//! coordinator fans frames out by connection id without knowing
//! anything about sockets. This is the server's implementation of
//! [`confab_core::EventSink`]: enqueue-only, never blocking, so it is
//! safe to call with the coordinator lock held.

use confab_core::EventSink;
use confab_protocol::Frame;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Connection id -> outbound frame queue.
#[derive(Debug, Default)]
pub struct Switchboard {
    lines: DashMap<String, mpsc::UnboundedSender<Frame>>,
}

impl Switchboard {
    /// Create an empty switchboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue.
    pub fn attach(&self, connection_id: impl Into<String>, line: mpsc::UnboundedSender<Frame>) {
        let connection_id = connection_id.into();
        debug!(connection = %connection_id, "Line attached");
        self.lines.insert(connection_id, line);
    }

    /// Remove a connection's outbound queue.
    ///
    /// Returns `true` if the connection was attached.
    pub fn detach(&self, connection_id: &str) -> bool {
        let removed = self.lines.remove(connection_id).is_some();
        if removed {
            debug!(connection = %connection_id, "Line detached");
        }
        removed
    }

    /// Number of attached connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check whether no connections are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl EventSink for Switchboard {
    fn deliver(&self, target: &str, frame: Frame) {
        let Some(line) = self.lines.get(target) else {
            // The target disconnected while a fan-out was in flight.
            trace!(connection = %target, "Dropped frame for detached connection");
            return;
        };

        if line.send(frame).is_err() {
            // Receiver gone but not yet detached: the connection task is
            // on its way out. Prune here; detach later is a no-op.
            drop(line);
            self.lines.remove(target);
            debug!(connection = %target, "Pruned dead line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_protocol::Frame;

    #[test]
    fn test_attach_deliver_detach() {
        let switchboard = Switchboard::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        switchboard.attach("conn-1", tx);
        assert_eq!(switchboard.len(), 1);

        switchboard.deliver("conn-1", Frame::ack(1));
        assert_eq!(rx.try_recv().unwrap(), Frame::ack(1));

        assert!(switchboard.detach("conn-1"));
        assert!(!switchboard.detach("conn-1"));
        assert!(switchboard.is_empty());
    }

    #[test]
    fn test_deliver_to_unknown_target_is_silent() {
        let switchboard = Switchboard::new();
        switchboard.deliver("nobody", Frame::ack(1));
    }

    #[test]
    fn test_dead_line_is_pruned() {
        let switchboard = Switchboard::new();
        let (tx, rx) = mpsc::unbounded_channel();

        switchboard.attach("conn-1", tx);
        drop(rx);

        switchboard.deliver("conn-1", Frame::ack(1));
        assert!(switchboard.is_empty());
    }
}
