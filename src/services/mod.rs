pub mod dispensing;
pub mod inventory;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::events::EventSender;
use crate::sync::SyncService;

/// Aggregated services handed to HTTP handlers through AppState.
#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<inventory::InventoryService>,
    pub dispensing: Arc<dispensing::DispensingService>,
    pub sync: Arc<SyncService>,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self {
            inventory: Arc::new(inventory::InventoryService::new(
                db.clone(),
                event_sender.clone(),
            )),
            dispensing: Arc::new(dispensing::DispensingService::new(
                db.clone(),
                event_sender.clone(),
            )),
            sync: Arc::new(SyncService::new(db, event_sender)),
        }
    }
}
