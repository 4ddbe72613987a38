//! Fan-out of outbound events to the listeners registered at publish time.

use std::sync::mpsc::{self, Receiver, Sender};

use critter_protocol::OutboundEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerId, Sender<OutboundEvent>)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> (ListenerId, Receiver<OutboundEvent>) {
        let (tx, rx) = mpsc::channel();
        (self.subscribe_sender(tx), rx)
    }

    pub fn subscribe_sender(&mut self, sender: Sender<OutboundEvent>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, sender));
        id
    }

    /// Returns false if `id` was not registered.
    #[allow(dead_code)]
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener, _)| *listener != id);
        self.listeners.len() != before
    }

    /// Delivers a clone of `event` to every listener, dropping any whose
    /// receiver has gone away. Returns the number of deliveries.
    pub fn publish(&mut self, event: &OutboundEvent) -> usize {
        let before = self.listeners.len();
        self.listeners
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
        let pruned = before - self.listeners.len();
        if pruned > 0 {
            tracing::debug!(pruned, event = event.name(), "Pruned disconnected listeners");
        }
        self.listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
