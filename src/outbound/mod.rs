//! Best-effort side calls triggered by committed dispatch events.
//!
//! The relay consumes the event channel, so nothing it does can roll back
//! or delay an assignment. Each side call carries its own timeout, which is
//! unrelated to the offer acceptance window.

pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::event::DispatchEvent;
use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("collaborator returned status {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Courier(Uuid),
    Merchant(Uuid),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub recipient: Recipient,
    pub event: String,
    pub order_id: Uuid,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), OutboundError>;
}

#[async_trait]
pub trait TrackingClient: Send + Sync {
    /// Opens a live-location session for the courier carrying the order.
    async fn open_session(&self, order_id: Uuid, courier_id: Uuid) -> Result<(), OutboundError>;
}

/// Used when no notification service is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), OutboundError> {
        info!(
            order_id = %notification.order_id,
            event = %notification.event,
            recipient = ?notification.recipient,
            "notification (no notification service configured)"
        );
        Ok(())
    }
}

/// Used when no tracking service is configured.
pub struct LogTrackingClient;

#[async_trait]
impl TrackingClient for LogTrackingClient {
    async fn open_session(&self, order_id: Uuid, courier_id: Uuid) -> Result<(), OutboundError> {
        info!(
            order_id = %order_id,
            courier_id = %courier_id,
            "tracking session requested (no tracking service configured)"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub tracking: Arc<dyn TrackingClient>,
    pub timeout: Duration,
}

impl Collaborators {
    pub fn log_only(timeout: Duration) -> Self {
        Self {
            notifier: Arc::new(LogNotifier),
            tracking: Arc::new(LogTrackingClient),
            timeout,
        }
    }
}

pub async fn run_outbound_relay(
    mut events: broadcast::Receiver<DispatchEvent>,
    collaborators: Collaborators,
) {
    info!("outbound relay started");

    loop {
        match events.recv().await {
            Ok(event) => {
                let collaborators = collaborators.clone();
                tokio::spawn(async move { relay_event(&collaborators, &event).await });
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "outbound relay lagged; side calls dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }

    info!("outbound relay stopped: event channel closed");
}

/// Side calls owed for one event, in the order they are attempted.
pub fn notifications_for(event: &DispatchEvent) -> Vec<Notification> {
    let note = |recipient, event: &str, order_id, message: String| Notification {
        recipient,
        event: event.to_string(),
        order_id,
        message,
    };

    match event {
        DispatchEvent::Offered {
            order_id,
            courier_id,
            merchant_id,
            deadline,
            attempt,
            ..
        } => {
            let mut notes = vec![note(
                Recipient::Courier(*courier_id),
                "offer",
                *order_id,
                format!(
                    "New delivery {order_id} offered to you, accept before {}",
                    deadline.format("%H:%M:%S UTC")
                ),
            )];
            if *attempt == 1 {
                notes.extend(merchant_note(
                    *merchant_id,
                    "courier_found",
                    *order_id,
                    "A courier has been found for your delivery",
                ));
            }
            notes
        }
        DispatchEvent::Accepted {
            order_id,
            merchant_id,
            ..
        } => merchant_note(*merchant_id, "courier_accepted", *order_id, "A courier accepted your delivery")
            .into_iter()
            .collect(),
        DispatchEvent::OfferExpired {
            order_id,
            courier_id,
            ..
        } => vec![note(
            Recipient::Courier(*courier_id),
            "offer_expired",
            *order_id,
            format!("Offer for delivery {order_id} expired"),
        )],
        DispatchEvent::StatusChanged {
            order_id,
            courier_id,
            merchant_id,
            from,
            to,
        } => {
            let mut notes: Vec<Notification> = merchant_note(
                *merchant_id,
                &to.as_str().to_ascii_lowercase(),
                *order_id,
                &format!("Delivery is now {to}"),
            )
            .into_iter()
            .collect();
            if let Some(courier_id) = courier_id.filter(|_| is_direct_assignment(*from, *to)) {
                notes.push(note(
                    Recipient::Courier(courier_id),
                    "assigned",
                    *order_id,
                    format!("Delivery {order_id} has been assigned to you"),
                ));
            }
            notes
        }
        DispatchEvent::Cancelled {
            order_id,
            courier_id,
            merchant_id,
            refund_amount,
            ..
        } => {
            let mut notes: Vec<Notification> = merchant_note(
                *merchant_id,
                "cancelled",
                *order_id,
                &format!("Delivery cancelled, refund {refund_amount:.2}"),
            )
            .into_iter()
            .collect();
            if let Some(courier_id) = courier_id {
                notes.push(note(
                    Recipient::Courier(*courier_id),
                    "cancelled",
                    *order_id,
                    format!("Delivery {order_id} was cancelled"),
                ));
            }
            notes
        }
    }
}

fn merchant_note(
    merchant_id: Option<Uuid>,
    event: &str,
    order_id: Uuid,
    message: &str,
) -> Option<Notification> {
    merchant_id.map(|merchant_id| Notification {
        recipient: Recipient::Merchant(merchant_id),
        event: event.to_string(),
        order_id,
        message: message.to_string(),
    })
}

/// PENDING straight to ACCEPTED only happens through an admin assignment.
fn is_direct_assignment(from: OrderStatus, to: OrderStatus) -> bool {
    from == OrderStatus::Pending && to == OrderStatus::Accepted
}

/// The courier whose tracking session the event starts, if any.
pub fn tracking_start(event: &DispatchEvent) -> Option<(Uuid, Uuid)> {
    match event {
        DispatchEvent::Offered {
            order_id,
            courier_id,
            attempt: 1,
            ..
        } => Some((*order_id, *courier_id)),
        DispatchEvent::StatusChanged {
            order_id,
            courier_id: Some(courier_id),
            from,
            to,
            ..
        } if is_direct_assignment(*from, *to) => Some((*order_id, *courier_id)),
        _ => None,
    }
}

pub async fn relay_event(collaborators: &Collaborators, event: &DispatchEvent) {
    if let Some((order_id, courier_id)) = tracking_start(event) {
        let call = collaborators.tracking.open_session(order_id, courier_id);
        match with_timeout(collaborators.timeout, call).await {
            Ok(()) => debug!(order_id = %order_id, "tracking session opened"),
            Err(err) => warn!(order_id = %order_id, error = %err, "failed to start tracking"),
        }
    }

    for notification in notifications_for(event) {
        let call = collaborators.notifier.notify(&notification);
        if let Err(err) = with_timeout(collaborators.timeout, call).await {
            warn!(
                order_id = %notification.order_id,
                event = %notification.event,
                error = %err,
                "failed to send notification"
            );
        }
    }
}

async fn with_timeout<F>(limit: Duration, call: F) -> Result<(), OutboundError>
where
    F: std::future::Future<Output = Result<(), OutboundError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| OutboundError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::{
        Collaborators, Notification, Notifier, OutboundError, Recipient, TrackingClient,
        notifications_for, relay_event, run_outbound_relay,
    };
    use crate::models::event::DispatchEvent;
    use crate::models::order::OrderStatus;

    #[derive(Default)]
    struct Recorder {
        notes: Mutex<Vec<Notification>>,
        sessions: Mutex<Vec<(Uuid, Uuid)>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(&self, notification: &Notification) -> Result<(), OutboundError> {
            self.notes.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl TrackingClient for Recorder {
        async fn open_session(&self, order_id: Uuid, courier_id: Uuid) -> Result<(), OutboundError> {
            self.sessions.lock().unwrap().push((order_id, courier_id));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Notifier for Failing {
        async fn notify(&self, _notification: &Notification) -> Result<(), OutboundError> {
            Err(OutboundError::Status(503))
        }
    }

    #[async_trait]
    impl TrackingClient for Failing {
        async fn open_session(&self, _order: Uuid, _courier: Uuid) -> Result<(), OutboundError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    fn offered(attempt: u32) -> DispatchEvent {
        DispatchEvent::Offered {
            order_id: Uuid::from_u128(1),
            courier_id: Uuid::from_u128(2),
            merchant_id: Some(Uuid::from_u128(3)),
            deadline: Utc::now(),
            attempt,
            score: 0.9,
        }
    }

    fn recording() -> (Arc<Recorder>, Collaborators) {
        let recorder = Arc::new(Recorder::default());
        let collaborators = Collaborators {
            notifier: recorder.clone(),
            tracking: recorder.clone(),
            timeout: Duration::from_millis(200),
        };
        (recorder, collaborators)
    }

    #[tokio::test]
    async fn first_offer_opens_tracking_and_notifies_courier_and_merchant() {
        let (recorder, collaborators) = recording();

        relay_event(&collaborators, &offered(1)).await;

        assert_eq!(
            *recorder.sessions.lock().unwrap(),
            vec![(Uuid::from_u128(1), Uuid::from_u128(2))]
        );
        let notes = recorder.notes.lock().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].recipient, Recipient::Courier(Uuid::from_u128(2)));
        assert_eq!(notes[0].event, "offer");
        assert_eq!(notes[1].recipient, Recipient::Merchant(Uuid::from_u128(3)));
        assert_eq!(notes[1].event, "courier_found");
    }

    #[tokio::test]
    async fn direct_assignment_opens_tracking_and_notifies_both_sides() {
        let (recorder, collaborators) = recording();
        let event = DispatchEvent::StatusChanged {
            order_id: Uuid::from_u128(1),
            courier_id: Some(Uuid::from_u128(2)),
            merchant_id: Some(Uuid::from_u128(3)),
            from: OrderStatus::Pending,
            to: OrderStatus::Accepted,
        };

        relay_event(&collaborators, &event).await;

        assert_eq!(
            *recorder.sessions.lock().unwrap(),
            vec![(Uuid::from_u128(1), Uuid::from_u128(2))]
        );
        let recipients: Vec<Recipient> =
            recorder.notes.lock().unwrap().iter().map(|n| n.recipient).collect();
        assert_eq!(
            recipients,
            vec![
                Recipient::Merchant(Uuid::from_u128(3)),
                Recipient::Courier(Uuid::from_u128(2))
            ]
        );
    }

    #[tokio::test]
    async fn progress_updates_do_not_open_tracking() {
        let (recorder, collaborators) = recording();
        let event = DispatchEvent::StatusChanged {
            order_id: Uuid::from_u128(1),
            courier_id: Some(Uuid::from_u128(2)),
            merchant_id: Some(Uuid::from_u128(3)),
            from: OrderStatus::Accepted,
            to: OrderStatus::PickedUp,
        };

        relay_event(&collaborators, &event).await;

        assert!(recorder.sessions.lock().unwrap().is_empty());
        assert_eq!(recorder.notes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cascaded_offer_does_not_reopen_tracking() {
        let (recorder, collaborators) = recording();

        relay_event(&collaborators, &offered(2)).await;

        assert!(recorder.sessions.lock().unwrap().is_empty());
        assert_eq!(recorder.notes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_collaborators_are_swallowed() {
        let collaborators = Collaborators {
            notifier: Arc::new(Failing),
            tracking: Arc::new(Failing),
            timeout: Duration::from_millis(50),
        };

        tokio::time::timeout(Duration::from_secs(2), relay_event(&collaborators, &offered(1)))
            .await
            .expect("side calls are bounded by their own timeout");
    }

    #[test]
    fn cancellation_notifies_merchant_and_courier() {
        let event = DispatchEvent::Cancelled {
            order_id: Uuid::from_u128(1),
            courier_id: Some(Uuid::from_u128(2)),
            merchant_id: Some(Uuid::from_u128(3)),
            from: OrderStatus::PickedUp,
            refund_amount: 90.0,
        };

        let notes = notifications_for(&event);
        let recipients: Vec<Recipient> = notes.iter().map(|n| n.recipient).collect();
        assert_eq!(
            recipients,
            vec![
                Recipient::Merchant(Uuid::from_u128(3)),
                Recipient::Courier(Uuid::from_u128(2))
            ]
        );
        assert!(notes[0].message.contains("90.00"));
    }

    #[test]
    fn status_change_without_merchant_sends_nothing() {
        let event = DispatchEvent::StatusChanged {
            order_id: Uuid::from_u128(1),
            courier_id: Some(Uuid::from_u128(2)),
            merchant_id: None,
            from: OrderStatus::Accepted,
            to: OrderStatus::PickedUp,
        };
        assert!(notifications_for(&event).is_empty());
    }

    #[tokio::test]
    async fn relay_forwards_published_events() {
        let (recorder, collaborators) = recording();
        let (tx, rx) = broadcast::channel(8);
        let relay = tokio::spawn(run_outbound_relay(rx, collaborators));

        tx.send(DispatchEvent::Accepted {
            order_id: Uuid::from_u128(1),
            courier_id: Uuid::from_u128(2),
            merchant_id: Some(Uuid::from_u128(3)),
        })
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while recorder.notes.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("notification delivered");

        drop(tx);
        relay.await.unwrap();
        assert_eq!(
            recorder.notes.lock().unwrap()[0].recipient,
            Recipient::Merchant(Uuid::from_u128(3))
        );
    }
}
