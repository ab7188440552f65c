//! Per-order status subscriber registry with message buffering.
//!
//! The hub maps `order_id → subscriber` where a subscriber is the sending
//! half of an unbounded channel drained by that order's WebSocket task.
//! Messages emitted while no subscriber is attached land in a per-order
//! backlog and are replayed, in order, on the next `attach`.
//!
//! At most one subscriber per order; a second `attach` replaces the first.
//! Per-order ordering is preserved; across orders nothing is guaranteed.

use std::collections::HashMap;
use std::sync::Mutex;

use common::{OrderStatus, StatusMessage};
use tokio::sync::mpsc;
use tracing::debug;

/// Sending half handed to the hub by a WebSocket task.
pub type StatusSender = mpsc::UnboundedSender<StatusMessage>;

struct Subscriber {
    ticket: u64,
    tx: StatusSender,
}

#[derive(Default)]
struct Inner {
    next_ticket: u64,
    subscribers: HashMap<String, Subscriber>,
    backlog: HashMap<String, Vec<StatusMessage>>,
}

/// Process-wide status hub, constructed once and injected into the worker,
/// the intake service, and the WebSocket surface.
#[derive(Default)]
pub struct StatusHub {
    inner: Mutex<Inner>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for an order, replacing any existing one, and
    /// replay the buffered backlog in insertion order.
    ///
    /// Returns a ticket identifying this attachment; the subscriber's task
    /// passes it back to [`detach_ticket`](Self::detach_ticket) so a replaced
    /// subscriber cannot detach its successor.
    pub fn attach(&self, order_id: &str, tx: StatusSender) -> u64 {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        inner.next_ticket += 1;
        let ticket = inner.next_ticket;

        let mut buffered = inner.backlog.remove(order_id).unwrap_or_default();
        let mut failed_at = None;
        for (index, message) in buffered.iter().enumerate() {
            if tx.send(message.clone()).is_err() {
                failed_at = Some(index);
                break;
            }
        }
        if let Some(index) = failed_at {
            // Subscriber died mid-replay; keep the undelivered tail buffered.
            inner
                .backlog
                .insert(order_id.to_string(), buffered.split_off(index));
            return ticket;
        }

        debug!(order_id, ticket, "subscriber attached");
        inner
            .subscribers
            .insert(order_id.to_string(), Subscriber { ticket, tx });
        ticket
    }

    /// Deliver a message to the order's subscriber, or buffer it.
    ///
    /// Never blocks. A failed delivery detaches the dead subscriber and the
    /// message joins the backlog instead of being dropped.
    pub fn send(&self, order_id: &str, message: StatusMessage) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if let Some(subscriber) = inner.subscribers.get(order_id) {
            match subscriber.tx.send(message) {
                Ok(()) => return,
                Err(failed) => {
                    debug!(order_id, "subscriber channel closed, buffering");
                    inner.subscribers.remove(order_id);
                    inner
                        .backlog
                        .entry(order_id.to_string())
                        .or_default()
                        .push(failed.0);
                    return;
                }
            }
        }
        inner
            .backlog
            .entry(order_id.to_string())
            .or_default()
            .push(message);
    }

    /// Convenience wrapper over [`send`](Self::send).
    pub fn send_status(
        &self,
        order_id: &str,
        status: OrderStatus,
        detail: Option<String>,
        link: Option<String>,
    ) {
        self.send(order_id, StatusMessage::new(order_id, status, detail, link));
    }

    /// Remove the order's subscriber, whoever holds it.
    pub fn detach(&self, order_id: &str) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if inner.subscribers.remove(order_id).is_some() {
            debug!(order_id, "subscriber detached");
        }
    }

    /// Remove the order's subscriber only if it still belongs to `ticket`.
    pub fn detach_ticket(&self, order_id: &str, ticket: u64) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        if inner
            .subscribers
            .get(order_id)
            .is_some_and(|s| s.ticket == ticket)
        {
            inner.subscribers.remove(order_id);
            debug!(order_id, ticket, "subscriber detached");
        }
    }

    /// Number of live subscribers, for the health endpoint.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("hub lock poisoned").subscribers.len()
    }

    /// Buffered message count for an order (tests and diagnostics).
    pub fn backlog_len(&self, order_id: &str) -> usize {
        self.inner
            .lock()
            .expect("hub lock poisoned")
            .backlog
            .get(order_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderStatus::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<StatusMessage>) -> Vec<StatusMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn buffers_until_attach_then_replays_in_order() {
        let hub = StatusHub::new();
        hub.send_status("ORD1", Pending, Some("Order accepted".into()), None);
        hub.send_status("ORD1", Queued, None, None);
        hub.send_status("ORD1", Routing, None, None);
        assert_eq!(hub.backlog_len("ORD1"), 3);

        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.attach("ORD1", tx);

        let messages = drain(&mut rx);
        let statuses: Vec<_> = messages.iter().map(|m| m.status).collect();
        assert_eq!(statuses, vec![Pending, Queued, Routing]);
        assert_eq!(hub.backlog_len("ORD1"), 0);
    }

    #[test]
    fn live_subscriber_receives_directly() {
        let hub = StatusHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.attach("ORD1", tx);

        hub.send_status("ORD1", Queued, None, None);
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(hub.backlog_len("ORD1"), 0);
    }

    #[test]
    fn disconnect_between_emissions_does_not_drop_messages() {
        let hub = StatusHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.attach("ORD1", tx);
        hub.send_status("ORD1", Queued, None, None);
        assert_eq!(drain(&mut rx).len(), 1);

        drop(rx);
        hub.send_status("ORD1", Routing, None, None);
        hub.send_status("ORD1", Building, None, None);
        assert_eq!(hub.backlog_len("ORD1"), 2);

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.attach("ORD1", tx2);
        let statuses: Vec<_> = drain(&mut rx2).iter().map(|m| m.status).collect();
        assert_eq!(statuses, vec![Routing, Building]);
    }

    #[test]
    fn second_attach_replaces_first() {
        let hub = StatusHub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.attach("ORD1", tx1);
        hub.attach("ORD1", tx2);

        hub.send_status("ORD1", Queued, None, None);
        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2).len(), 1);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn stale_ticket_cannot_detach_successor() {
        let hub = StatusHub::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let first = hub.attach("ORD1", tx1);
        let _second = hub.attach("ORD1", tx2);

        hub.detach_ticket("ORD1", first);
        hub.send_status("ORD1", Queued, None, None);
        assert_eq!(drain(&mut rx2).len(), 1);
    }

    #[test]
    fn orders_are_isolated() {
        let hub = StatusHub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.attach("ORD1", tx);

        hub.send_status("ORD2", Queued, None, None);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(hub.backlog_len("ORD2"), 1);
    }
}
