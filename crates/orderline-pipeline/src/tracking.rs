use std::sync::Arc;

use orderline_core::{
    NewTracking, OrderCreatedEvent, OrderTracking, TOPIC_ORDER_CREATED, TOPIC_TRACKING_UPDATED,
    TrackingPatch, TrackingStore, TrackingUpdatedEvent,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

/// Keeps `order_tracking` in step with the order events on the bus.
///
/// Handlers never return errors: a bad message is logged and dropped so the
/// subscription keeps running. Messages may be handled concurrently and in
/// any order.
pub struct TrackingSync<S> {
    store: Arc<S>,
}

impl<S: TrackingStore> TrackingSync<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, topic: &str, payload: &str) -> Option<OrderTracking> {
        match topic {
            TOPIC_ORDER_CREATED => {
                let event = decode::<OrderCreatedEvent>(topic, payload)?;
                self.on_order_created(event).await
            }
            TOPIC_TRACKING_UPDATED => {
                let event = decode::<TrackingUpdatedEvent>(topic, payload)?;
                self.on_tracking_updated(event).await
            }
            other => {
                debug!("ignoring message on unhandled topic {other}");
                None
            }
        }
    }

    /// Opens a `pending` tracking row. An order that already has one is left
    /// alone, so a repeated event does not add a second row.
    pub async fn on_order_created(&self, event: OrderCreatedEvent) -> Option<OrderTracking> {
        match self.store.tracking_for_order(event.order_id).await {
            Ok(rows) if !rows.is_empty() => {
                debug!("order {} already has tracking, skipping", event.order_id);
                return None;
            }
            Ok(_) => {}
            Err(err) => {
                error!("failed to read tracking for order {}: {err:#}", event.order_id);
                return None;
            }
        }

        match self.store.create_tracking(NewTracking::pending(event.order_id)).await {
            Ok(row) => {
                info!("tracking {} opened for order {}", row.id, event.order_id);
                Some(row)
            }
            Err(err) => {
                error!("failed to create tracking for order {}: {err:#}", event.order_id);
                None
            }
        }
    }

    /// Updates the first tracking row the store returns for the order. Nothing
    /// is created when the order has no tracking yet.
    pub async fn on_tracking_updated(&self, event: TrackingUpdatedEvent) -> Option<OrderTracking> {
        let rows = match self.store.tracking_for_order(event.order_id).await {
            Ok(rows) => rows,
            Err(err) => {
                error!("failed to read tracking for order {}: {err:#}", event.order_id);
                return None;
            }
        };

        let Some(first) = rows.first() else {
            warn!(
                "tracking update for order {} with no tracking row, skipping",
                event.order_id
            );
            return None;
        };
        if rows.len() > 1 {
            debug!(
                "order {} has {} tracking rows, updating {}",
                event.order_id,
                rows.len(),
                first.id
            );
        }

        let patch = TrackingPatch {
            status: Some(event.status),
            courier: event.courier,
            tracking_number: event.tracking_number,
            ..TrackingPatch::default()
        };
        match self.store.update_tracking(first.id, patch).await {
            Ok(Some(row)) => {
                info!("tracking {} for order {} now {}", row.id, row.order_id, row.status);
                Some(row)
            }
            Ok(None) => {
                warn!("tracking {} disappeared before update", first.id);
                None
            }
            Err(err) => {
                error!("failed to update tracking {}: {err:#}", first.id);
                None
            }
        }
    }
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &str) -> Option<T> {
    serde_json::from_str(payload)
        .map_err(|err| error!("malformed {topic} message: {err}"))
        .ok()
}
