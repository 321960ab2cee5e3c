//! Market event consumer loop: bus → hub.

use std::sync::Arc;

use bus::RecordStream;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use types::feed::FeedEvent;

use crate::error::HubError;
use crate::hub::BroadcastHub;

/// Decode one bus record and route it.
///
/// Errors describe the record only; the caller logs nothing further.
pub fn handle_record(hub: &BroadcastHub, payload: &[u8]) -> Result<usize, HubError> {
    let event: FeedEvent = match serde_json::from_slice(payload) {
        Ok(event) => event,
        Err(e) => {
            hub.metrics().record_decode_failed();
            warn!(error = %e, bytes = payload.len(), "Dropping malformed market event");
            return Err(HubError::Decode(e.to_string()));
        }
    };

    if !hub.products().contains(event.product_id()) {
        hub.metrics().record_unknown_product();
        warn!(
            product_id = %event.product_id(),
            event = event.kind(),
            "Dropping event for unknown product"
        );
        return Err(HubError::UnknownProduct(event.product_id().to_string()));
    }

    let delivered = hub.route(&event);
    debug!(
        product_id = %event.product_id(),
        event = event.kind(),
        delivered,
        "Event routed"
    );
    Ok(delivered)
}

/// Drain market events until the stream ends or shutdown is signalled.
///
/// Records are routed one at a time, so events for a product reach each
/// subscriber in the order the bus delivered them.
pub async fn run_event_consumer(
    hub: Arc<BroadcastHub>,
    mut records: RecordStream,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Market event consumer running");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!("Market event consumer received shutdown signal");
                break;
            }

            record = records.next() => {
                match record {
                    Some(record) => {
                        let _ = handle_record(&hub, &record.payload);
                    }
                    None => {
                        warn!("Market event stream ended unexpectedly");
                        break;
                    }
                }
            }
        }
    }

    info!("Market event consumer stopped");
}
