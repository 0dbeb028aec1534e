//! Event bus for case notifications
//!
//! Tokio broadcast channel. Slow subscribers lag and lose the oldest events;
//! the audit log remains the durable record.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::CaseEvent;
use crate::state::CaseKind;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus dropped")]
    Closed,

    #[error("Subscriber lagged, {0} events dropped")]
    Lagged(u64),
}

pub type EventBusResult<T> = Result<T, EventBusError>;

pub type SharedEventBus = Arc<EventBus>;

/// Broadcast bus for [`CaseEvent`]s
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<CaseEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Fan `event` out to current subscribers; returns how many got it.
    /// Publishing with nobody listening is not an error.
    pub fn publish(&self, event: CaseEvent) -> usize {
        let kind = event.event_type();
        let delivered = self.sender.send(event).unwrap_or(0);
        debug!(event = kind, delivered, "Case event");
        delivered
    }

    /// Every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CaseEvent> {
        self.sender.subscribe()
    }

    /// Only events accepted by `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver {
            inner: self.sender.subscribe(),
            filter,
        }
    }

    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Conjunction of optional constraints; an empty filter accepts everything
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub case_kind: Option<CaseKind>,
    pub case_id: Option<String>,
    /// Accepted `event_type()` names
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: CaseKind) -> Self {
        self.case_kind = Some(kind);
        self
    }

    pub fn case(mut self, case_id: &str) -> Self {
        self.case_id = Some(case_id.to_string());
        self
    }

    pub fn types<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        self.event_types = Some(names.into_iter().map(str::to_string).collect());
        self
    }

    pub fn matches(&self, event: &CaseEvent) -> bool {
        let case_ref = event.case_ref();
        let kind_ok = self
            .case_kind
            .map_or(true, |kind| case_ref.map(|(k, _)| k) == Some(kind));
        let id_ok = self
            .case_id
            .as_deref()
            .map_or(true, |id| case_ref.map(|(_, i)| i) == Some(id));
        let type_ok = self
            .event_types
            .as_ref()
            .map_or(true, |names| names.iter().any(|n| n == event.event_type()));
        kind_ok && id_ok && type_ok
    }
}

/// Receiver that skips events its filter rejects
pub struct FilteredReceiver {
    inner: broadcast::Receiver<CaseEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Wait for the next accepted event. A lagged receiver reports the gap
    /// once and can keep receiving afterwards.
    pub async fn recv(&mut self) -> EventBusResult<CaseEvent> {
        use broadcast::error::RecvError;
        loop {
            match self.inner.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => return Err(EventBusError::Lagged(skipped)),
                Err(RecvError::Closed) => return Err(EventBusError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn claimed(ticket: &str) -> CaseEvent {
        CaseEvent::TicketClaimed {
            ticket_id: ticket.to_string(),
            claimed_by: "staff".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_published_event() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        assert_eq!(events.publish(claimed("t-1")), 1);
        assert_eq!(rx.recv().await.unwrap().event_type(), "ticket_claimed");
    }

    #[test]
    fn test_publishing_to_nobody_is_fine() {
        let events = EventBus::with_capacity(0);
        assert_eq!(events.listeners(), 0);
        assert_eq!(events.publish(claimed("t-1")), 0);
    }

    #[test]
    fn test_filter_constraints_combine() {
        let filter = EventFilter::new().kind(CaseKind::Ticket).case("t-1");
        assert!(filter.matches(&claimed("t-1")));
        assert!(!filter.matches(&claimed("t-2")));

        let rank = CaseEvent::RankChanged {
            staff_id: "s".into(),
            old_rank: None,
            new_rank: "moderator".into(),
            timestamp: Utc::now(),
        };
        assert!(!filter.matches(&rank));
        assert!(EventFilter::new().types(vec!["rank_changed"]).matches(&rank));
    }

    #[tokio::test]
    async fn test_filtered_receiver_skips_other_cases() {
        let events = EventBus::new().shared();
        let mut only_target = events.subscribe_filtered(EventFilter::new().case("target"));

        events.publish(claimed("other"));
        events.publish(claimed("target"));

        let event = only_target.recv().await.unwrap();
        assert_eq!(event.case_ref(), Some((CaseKind::Ticket, "target")));
    }

    #[tokio::test]
    async fn test_dropped_bus_closes_receiver() {
        let events = EventBus::new();
        let mut rx = events.subscribe_filtered(EventFilter::new());
        drop(events);
        assert!(matches!(rx.recv().await, Err(EventBusError::Closed)));
    }
}
