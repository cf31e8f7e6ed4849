use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events emitted after the owning database transaction commits.
/// Delivery is best-effort; consumers must not be load-bearing for
/// correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Ledger events
    InventoryTransactionRecorded {
        transaction_id: Uuid,
        clinic_id: Uuid,
        drug_id: Uuid,
        batch_id: Uuid,
        transaction_type: String,
        quantity: i32,
        balance_after: i32,
    },
    StockReceived {
        batch_id: Uuid,
        clinic_id: Uuid,
        drug_id: Uuid,
        quantity: i32,
    },

    // Dispensing / auto-healing events
    MedicationDispensed {
        dispensing_record_id: Uuid,
        clinic_id: Uuid,
        drug_id: Uuid,
        batch_id: Uuid,
        quantity: i32,
        balance_after: i32,
    },
    BatchAutoCreated {
        batch_id: Uuid,
        drug_id: Uuid,
        dispensing_record_id: Uuid,
        reason: String,
    },

    // Sync events
    SyncPullCompleted {
        user_id: Uuid,
        entities: usize,
        last_pulled_at: Option<DateTime<Utc>>,
    },
    SyncPushApplied {
        user_id: Uuid,
        applied: Vec<String>,
        failed: Vec<String>,
    },
}

/// Drains the event channel, logging each event. Spawned once at startup.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::BatchAutoCreated {
                batch_id, reason, ..
            } => {
                warn!(batch_id = %batch_id, reason = %reason, "batch auto-created during dispensing");
            }
            Event::SyncPushApplied { failed, .. } if !failed.is_empty() => {
                warn!(?event, "sync push applied with per-entity failures");
            }
            _ => info!(?event, "event processed"),
        }
    }
    info!("Event channel closed; processor exiting");
}
