//! Post-commit events for the notification and bot layers.
//!
//! Services collect events while a transaction is open and publish them only
//! after `commit` succeeds. Publishing never blocks and never fails the
//! commerce operation; a slow consumer only grows the queue.

use std::future::Future;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommerceEvent {
    OrderDelivered {
        order_id: Uuid,
        user_id: Uuid,
        product_name: String,
        payload: String,
    },
    OrderNoStock {
        order_id: Uuid,
        user_id: Uuid,
        product_name: String,
    },
    BalanceCredited {
        user_id: Uuid,
        order_id: Option<Uuid>,
        amount: i64,
        balance: i64,
    },
    CardRedeemed {
        user_id: Uuid,
        card_code: String,
        amount: i64,
        balance: i64,
    },
    OrderExpired {
        order_id: Uuid,
        user_id: Uuid,
        refunded: i64,
    },
    DeliveryFailedPermanent {
        order_id: Uuid,
        user_id: Uuid,
        retry_count: i32,
    },
}

impl CommerceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CommerceEvent::OrderDelivered { .. } => "order_delivered",
            CommerceEvent::OrderNoStock { .. } => "order_no_stock",
            CommerceEvent::BalanceCredited { .. } => "balance_credited",
            CommerceEvent::CardRedeemed { .. } => "card_redeemed",
            CommerceEvent::OrderExpired { .. } => "order_expired",
            CommerceEvent::DeliveryFailedPermanent { .. } => "delivery_failed_permanent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<CommerceEvent>,
}

pub type EventStream = mpsc::UnboundedReceiver<CommerceEvent>;

pub fn channel() -> (EventBus, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventBus { tx }, rx)
}

impl EventBus {
    pub fn publish(&self, event: CommerceEvent) {
        let kind = event.kind();
        if self.tx.send(event).is_err() {
            tracing::warn!(event = kind, "event stream closed, dropping event");
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = CommerceEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// Consumer side, implemented by the bot/notification collaborator.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, event: &CommerceEvent) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Default notifier: writes each event to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, event: &CommerceEvent) -> anyhow::Result<()> {
        tracing::info!(event = event.kind(), payload = ?event, "commerce event");
        Ok(())
    }
}

/// Drain the stream into `notifier` until the stream closes or `shutdown` fires.
pub async fn dispatch<N: Notifier>(mut events: EventStream, notifier: N, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            next = events.recv() => {
                let Some(event) = next else { break };
                if let Err(err) = notifier.notify(&event).await {
                    tracing::warn!(event = event.kind(), error = %err, "notifier failed");
                }
            }
        }
    }
    tracing::info!("event dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Recording(Arc<Mutex<Vec<&'static str>>>);

    impl Notifier for Recording {
        async fn notify(&self, event: &CommerceEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.kind());
            anyhow::ensure!(event.kind() != "order_no_stock", "bot unreachable");
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatcher_survives_notifier_failures() {
        let (bus, stream) = channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let user_id = Uuid::new_v4();

        bus.publish(CommerceEvent::OrderNoStock {
            order_id: Uuid::new_v4(),
            user_id,
            product_name: "Gift".into(),
        });
        bus.publish(CommerceEvent::BalanceCredited {
            user_id,
            order_id: None,
            amount: 100,
            balance: 100,
        });
        drop(bus);

        dispatch(stream, Recording(seen.clone()), CancellationToken::new()).await;
        assert_eq!(*seen.lock().unwrap(), vec!["order_no_stock", "balance_credited"]);
    }

    #[test]
    fn publishing_to_closed_stream_does_not_panic() {
        let (bus, stream) = channel();
        drop(stream);
        bus.publish(CommerceEvent::OrderExpired {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            refunded: 0,
        });
    }
}
