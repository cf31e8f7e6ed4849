use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tracing::debug;

use super::participant::{participants, ChangeSet};
use crate::errors::ServiceError;

/// Scan every registered participant for changes since the watermark and
/// assemble the per-entity change set.
///
/// - Ordinary participants: rows with `last_modified > since`, split into
///   created/updated by `server_created_at`, plus soft-deleted ids. A row
///   updated several times in the window appears once with its latest state.
/// - Always-push participants: the entire current table, watermark ignored.
/// - Server-only participants (no mobile table name): excluded entirely.
pub async fn pull_changes(
    db: &DatabaseConnection,
    since: Option<DateTime<Utc>>,
) -> Result<ChangeSet, ServiceError> {
    let mut changes = ChangeSet::new();

    for participant in participants() {
        // The server table name can differ from the mobile table name; the
        // response is keyed by what the client database calls it.
        let Some(mobile_name) = participant.mobile_name() else {
            continue;
        };

        let delta = participant.pull(db, since).await?;
        debug!(
            entity = participant.table_name(),
            mobile = mobile_name,
            created = delta.created.len(),
            updated = delta.updated.len(),
            deleted = delta.deleted.len(),
            "pulled entity delta"
        );

        changes.insert(mobile_name.to_string(), delta);
    }

    Ok(changes)
}
