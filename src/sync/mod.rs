//! Offline-first delta synchronization between the server database and
//! disconnected mobile clients.
//!
//! Pull ships every participating entity's changes since a client-held
//! watermark (`last_pulled_at`); the server keeps no per-client cursor.
//! Push applies client-originated created/updated/deleted batches per
//! entity, idempotently, with last-write-wins conflict semantics.
//!
//! Entities join the protocol by implementing [`SyncEntity`] and appearing
//! in the [`participant::participants`] registry; the endpoint iterates the
//! registry instead of hardcoding entity names.

pub mod participant;
pub mod pull;
pub mod push;

pub use participant::{
    participant_by_mobile_name, participants, ChangeSet, EntityDelta, SyncEntity, SyncParticipant,
};
pub use pull::pull_changes;
pub use push::{apply_changes, PushFailure, PushReport, PushRequest};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Orchestrates pull and push for the sync endpoint.
#[derive(Clone)]
pub struct SyncService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl SyncService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Assemble the change set for every mobile-visible participant.
    #[instrument(skip(self))]
    pub async fn pull(
        &self,
        since: Option<DateTime<Utc>>,
        user_id: Uuid,
    ) -> Result<ChangeSet, ServiceError> {
        let changes = pull_changes(&self.db, since).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::SyncPullCompleted {
                user_id,
                entities: changes.len(),
                last_pulled_at: since,
            })
            .await
        {
            tracing::warn!("failed to emit sync pull event: {}", e);
        }

        Ok(changes)
    }

    /// Apply a client push. Each entity's batch is its own atomic unit; a
    /// failing entity is reported without blocking the others.
    #[instrument(skip(self, request))]
    pub async fn push(
        &self,
        request: PushRequest,
        user_id: Uuid,
    ) -> Result<PushReport, ServiceError> {
        let report = apply_changes(&self.db, request).await?;

        if let Err(e) = self
            .event_sender
            .send(Event::SyncPushApplied {
                user_id,
                applied: report.applied.clone(),
                failed: report.failed.iter().map(|f| f.entity.clone()).collect(),
            })
            .await
        {
            tracing::warn!("failed to emit sync push event: {}", e);
        }

        Ok(report)
    }
}
