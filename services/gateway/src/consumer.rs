//! Confirmation consumer loop: bus → correlator.

use std::sync::Arc;

use bus::RecordStream;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::correlator::Correlator;

/// Drain confirmations until the stream ends or shutdown is signalled.
///
/// Each record is handled independently; a bad record never stops the loop.
pub async fn run_confirmation_consumer(
    correlator: Arc<Correlator>,
    mut records: RecordStream,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Confirmation consumer running");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                info!("Confirmation consumer received shutdown signal");
                break;
            }

            record = records.next() => {
                match record {
                    Some(record) => {
                        // Outcome is already logged by the correlator.
                        let _ = correlator.on_confirmation(&record.payload);
                    }
                    None => {
                        warn!("Confirmation stream ended unexpectedly");
                        break;
                    }
                }
            }
        }
    }

    info!("Confirmation consumer stopped");
}
