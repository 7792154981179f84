//! # Notification Fanout
//!
//! The engine hands every committed domain event to a [`Notifier`] once per
//! audience. Delivery is best effort: a failed publish is logged by the
//! caller and never undoes the transition that produced it.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderLifecycleManager                                                  │
//! │       │  (after commit)                                                 │
//! │       │  publish(Kitchen, "new_kitchen_ticket", {...})                  │
//! │       ▼                                                                 │
//! │  BroadcastNotifier ── tokio::broadcast ──┬──▶ Subscription(Kitchen)     │
//! │                                          ├──▶ Subscription(Waiters)     │
//! │                                          └──▶ Subscription(all)         │
//! │                                                                         │
//! │  Each subscription skips notifications for other audiences.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use cantina_core::{Audience, DomainEvent};

use crate::error::NotifyError;

/// Outbound port for role-scoped notifications.
pub trait Notifier: Send + Sync {
    fn publish(&self, audience: Audience, event_type: &str, payload: serde_json::Value) -> Result<(), NotifyError>;
}

/// Hands `event` to `notifier` once per audience.
///
/// Failures are logged and swallowed.
pub fn dispatch(notifier: &dyn Notifier, event: &DomainEvent) {
    let payload = event.payload();
    for &audience in event.audiences() {
        match notifier.publish(audience, event.event_type(), payload.clone()) {
            Ok(()) => {}
            Err(NotifyError::NoSubscribers) => {
                debug!(%audience, event = event.event_type(), "No subscribers for notification")
            }
        }
    }
}

/// One delivered notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event_id: Uuid,
    pub audience: Audience,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

// =============================================================================
// Broadcast Notifier
// =============================================================================

/// In-process fanout over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        BroadcastNotifier { tx }
    }

    /// Receives notifications for one audience.
    pub fn subscribe(&self, audience: Audience) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            audience: Some(audience),
        }
    }

    /// Receives every notification regardless of audience.
    pub fn subscribe_all(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            audience: None,
        }
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, audience: Audience, event_type: &str, payload: serde_json::Value) -> Result<(), NotifyError> {
        let notification = Notification {
            event_id: Uuid::new_v4(),
            audience,
            event_type: event_type.to_string(),
            payload,
            emitted_at: Utc::now(),
        };

        self.tx
            .send(notification)
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers)
    }
}

/// A receiver filtered to one audience.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Notification>,
    audience: Option<Audience>,
}

impl Subscription {
    /// Waits for the next notification for this audience.
    ///
    /// Returns `None` once the notifier is dropped.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(notification) if self.wants(&notification) => return Some(notification),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, audience = ?self.audience, "Subscriber lagged, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-buffered notification for this audience, if any.
    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.try_recv() {
                Ok(notification) if self.wants(&notification) => return Some(notification),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, audience = ?self.audience, "Subscriber lagged, notifications dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Everything currently buffered for this audience.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn wants(&self, notification: &Notification) -> bool {
        self.audience.map_or(true, |audience| audience == notification.audience)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_without_subscribers_fails() {
        let notifier = BroadcastNotifier::new(8);
        let result = notifier.publish(Audience::Kitchen, "order_cancelled", json!({"order_id": 1}));
        assert_eq!(result, Err(NotifyError::NoSubscribers));
    }

    #[test]
    fn test_subscription_filters_by_audience() {
        let notifier = BroadcastNotifier::new(8);
        let mut kitchen = notifier.subscribe(Audience::Kitchen);
        let mut everyone = notifier.subscribe_all();

        notifier
            .publish(Audience::Waiters, "order_created", json!({"order_id": 1}))
            .unwrap();
        notifier
            .publish(Audience::Kitchen, "new_kitchen_ticket", json!({"order_id": 1}))
            .unwrap();

        let kitchen_events: Vec<_> = kitchen.drain().into_iter().map(|n| n.event_type).collect();
        assert_eq!(kitchen_events, vec!["new_kitchen_ticket"]);
        assert_eq!(everyone.drain().len(), 2);
    }

    #[tokio::test]
    async fn test_recv_ends_when_notifier_dropped() {
        let notifier = BroadcastNotifier::new(8);
        let mut admin = notifier.subscribe(Audience::Admin);

        notifier
            .publish(Audience::Admin, "stock_changed", json!({"product_id": 1, "new_stock": 3}))
            .unwrap();
        drop(notifier);

        let first = admin.recv().await.unwrap();
        assert_eq!(first.payload["new_stock"], 3);
        assert!(admin.recv().await.is_none());
    }

    #[test]
    fn test_dispatch_reaches_every_audience_of_event() {
        let notifier = BroadcastNotifier::new(16);
        let mut everyone = notifier.subscribe_all();

        let event = DomainEvent::OrderCancelled {
            order_id: cantina_core::OrderId(9),
        };
        dispatch(&notifier, &event);

        let audiences: Vec<_> = everyone.drain().into_iter().map(|n| n.audience).collect();
        assert_eq!(audiences, Audience::ALL.to_vec());
    }

    #[test]
    fn test_lagging_subscriber_skips_ahead() {
        let notifier = BroadcastNotifier::new(2);
        let mut waiters = notifier.subscribe(Audience::Waiters);

        for id in 0..5 {
            notifier
                .publish(Audience::Waiters, "order_created", json!({ "order_id": id }))
                .unwrap();
        }

        let ids: Vec<_> = waiters.drain().into_iter().map(|n| n.payload["order_id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(4)]);
    }
}
