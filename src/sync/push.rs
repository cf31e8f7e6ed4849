use std::collections::BTreeMap;

use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;

use super::participant::{participant_by_mobile_name, EntityDelta};
use crate::errors::ServiceError;

/// Push body: mobile table name → created/updated/deleted batch.
pub type PushRequest = BTreeMap<String, EntityDelta>;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PushFailure {
    pub entity: String,
    pub error: String,
}

/// Outcome of a push. Entities are applied independently so one bad batch
/// never corrupts or blocks the others; clients retry just the failed ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PushReport {
    pub applied: Vec<String>,
    pub failed: Vec<PushFailure>,
}

impl PushReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Apply a client push, one transaction per entity.
pub async fn apply_changes(
    db: &DatabaseConnection,
    request: PushRequest,
) -> Result<PushReport, ServiceError> {
    let mut report = PushReport::default();

    for (entity_name, delta) in request {
        match apply_entity(db, &entity_name, delta).await {
            Ok(()) => {
                report.applied.push(entity_name);
            }
            Err(e) => {
                error!(entity = %entity_name, error = %e, "push batch failed");
                report.failed.push(PushFailure {
                    entity: entity_name,
                    error: e.response_message(),
                });
            }
        }
    }

    info!(
        applied = report.applied.len(),
        failed = report.failed.len(),
        "push applied"
    );
    Ok(report)
}

/// One entity's batch as a single atomic unit: every upsert and soft delete
/// commits together or not at all.
async fn apply_entity(
    db: &DatabaseConnection,
    entity_name: &str,
    delta: EntityDelta,
) -> Result<(), ServiceError> {
    let participant = participant_by_mobile_name(entity_name).ok_or_else(|| {
        ServiceError::ValidationError(format!("unknown sync entity: {}", entity_name))
    })?;

    // One-way tables never accept client writes.
    if participant.always_push() {
        return Err(ServiceError::ValidationError(format!(
            "{} is server-authoritative and cannot be pushed",
            entity_name
        )));
    }

    if delta.is_empty() {
        return Ok(());
    }

    let txn = db.begin().await?;

    for record in delta.created.into_iter().chain(delta.updated) {
        participant.upsert_from_delta(&txn, record).await?;
    }

    for id in &delta.deleted {
        participant.delete_from_delta(&txn, id).await?;
    }

    txn.commit().await?;
    Ok(())
}
