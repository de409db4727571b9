//! Forwards bus events to the webhook service

use std::sync::Arc;

use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::bus::EventBus;
use crate::infrastructure::webhook::WebhookServiceTrait;

/// Spawn the task that hands every published event to `webhooks`.
///
/// Each event is dispatched in its own task, at most `concurrency` at a time.
/// The receive loop never waits for a permit, so a slow target cannot make
/// the dispatcher lag behind the bus and skip events.
pub fn spawn_webhook_dispatcher(
    bus: &EventBus,
    webhooks: Arc<dyn WebhookServiceTrait>,
    concurrency: usize,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));

    tokio::spawn(Box::pin(async move {
        info!(concurrency, "Webhook dispatcher started");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = receiver.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Webhook dispatcher lagged behind the event bus");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };

            let permits = permits.clone();
            let webhooks = webhooks.clone();

            tokio::spawn(Box::pin(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(e) = webhooks.dispatch(&event).await {
                    error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "Webhook dispatch failed"
                    );
                }
            }));
        }

        info!("Webhook dispatcher stopped");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::{DeliveryStatus, Webhook};
    use crate::domain::{EngineEvent, EventType};
    use crate::infrastructure::webhook::{
        InMemoryWebhookDeliveryRepository, InMemoryWebhookRepository, WebhookService,
    };
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_published_event_reaches_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let service = Arc::new(WebhookService::new(
            Arc::new(InMemoryWebhookRepository::new()),
            Arc::new(InMemoryWebhookDeliveryRepository::new()),
        ));
        service
            .create(Webhook::new("hook-1", "Hook", server.uri()).with_event(EventType::JobCompleted))
            .await
            .unwrap();

        let bus = EventBus::new(16);
        let shutdown = CancellationToken::new();
        let handle = spawn_webhook_dispatcher(&bus, service.clone(), 2, shutdown.clone());

        // Not subscribed; ignored
        bus.publish(EngineEvent::new(EventType::JobStarted, "req-1", json!({})));
        bus.publish(EngineEvent::new(EventType::JobCompleted, "req-1", json!({})));

        let mut delivered = false;
        for _ in 0..50 {
            let history = service.get_deliveries("hook-1", 10, 0).await.unwrap();
            if history.iter().any(|d| d.status == DeliveryStatus::Success) {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(delivered);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_target_does_not_drop_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .expect(8)
            .mount(&server)
            .await;

        let service = Arc::new(WebhookService::new(
            Arc::new(InMemoryWebhookRepository::new()),
            Arc::new(InMemoryWebhookDeliveryRepository::new()),
        ));
        service
            .create(Webhook::new("hook-1", "Hook", server.uri()).with_event(EventType::JobCompleted))
            .await
            .unwrap();

        let bus = EventBus::new(4);
        let shutdown = CancellationToken::new();
        let handle = spawn_webhook_dispatcher(&bus, service.clone(), 1, shutdown.clone());

        for i in 0..8 {
            bus.publish(EngineEvent::new(
                EventType::JobCompleted,
                format!("req-{}", i),
                json!({}),
            ));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // One permit: only the first delivery can be in flight so far
        let in_flight = server.received_requests().await.unwrap_or_default().len();
        assert!(in_flight <= 1, "{} requests in flight", in_flight);

        let mut succeeded = 0;
        for _ in 0..100 {
            let history = service.get_deliveries("hook-1", 20, 0).await.unwrap();
            succeeded = history
                .iter()
                .filter(|d| d.status == DeliveryStatus::Success)
                .count();
            if succeeded == 8 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(succeeded, 8);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
