use std::collections::BTreeMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, IdenStatic, IntoActiveModel, Iterable, ModelTrait, QueryFilter, Value,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    appointment, clinic, clinic_department, clinic_inventory, dispensing_record, drug_batch,
    event, event_form, patient, patient_attribute, patient_registration_form, prescription,
    prescription_item, user, visit,
};
use crate::errors::ServiceError;
use crate::services::dispensing::process_dispensing_insert;

/// Columns the sync machinery needs from a participating entity. Implemented
/// next to each entity definition; the pull/push logic below is generic over
/// this trait so no entity is special-cased.
pub trait SyncEntity: EntityTrait {
    const TABLE_NAME: &'static str;
    /// Table name in the mobile database, or `None` for server-only entities
    /// that must never appear in pull output.
    const MOBILE_NAME: Option<&'static str>;
    /// Always-push tables are server-authoritative reference data: the full
    /// table is shipped on every pull and client pushes are rejected.
    const ALWAYS_PUSH: bool;

    fn id_column() -> Self::Column;
    fn is_deleted_column() -> Self::Column;
    fn deleted_at_column() -> Self::Column;
    fn last_modified_column() -> Self::Column;
    fn server_created_at_column() -> Self::Column;
}

/// One entity's slice of a pull response or push request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EntityDelta {
    #[serde(default)]
    pub created: Vec<JsonValue>,
    #[serde(default)]
    pub updated: Vec<JsonValue>,
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl EntityDelta {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Mobile table name → delta. BTreeMap keeps response ordering stable.
pub type ChangeSet = BTreeMap<String, EntityDelta>;

/// Object-safe face of a sync participant, so the registry can hold every
/// entity behind one type.
#[async_trait]
pub trait SyncParticipant: Send + Sync {
    fn table_name(&self) -> &'static str;
    fn mobile_name(&self) -> Option<&'static str>;
    fn always_push(&self) -> bool;

    /// Extract this entity's delta since the watermark (or the full table
    /// for always-push participants).
    async fn pull(
        &self,
        db: &DatabaseConnection,
        since: Option<DateTime<Utc>>,
    ) -> Result<EntityDelta, ServiceError>;

    /// Idempotent upsert keyed by primary id. Applying the same record twice
    /// leaves the row in the same state.
    async fn upsert_from_delta(
        &self,
        txn: &DatabaseTransaction,
        record: JsonValue,
    ) -> Result<(), ServiceError>;

    /// Idempotent soft delete by id.
    async fn delete_from_delta(
        &self,
        txn: &DatabaseTransaction,
        id: &str,
    ) -> Result<(), ServiceError>;
}

/// Adapter instantiating the generic sync behavior for one entity.
pub struct Registrant<E: SyncEntity>(PhantomData<fn() -> E>);

impl<E: SyncEntity> Registrant<E> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<E> SyncParticipant for Registrant<E>
where
    E: SyncEntity,
    E::Model: Serialize + DeserializeOwned + IntoActiveModel<E::ActiveModel> + Send + Sync,
    E::ActiveModel: Send,
{
    fn table_name(&self) -> &'static str {
        E::TABLE_NAME
    }

    fn mobile_name(&self) -> Option<&'static str> {
        E::MOBILE_NAME
    }

    fn always_push(&self) -> bool {
        E::ALWAYS_PUSH
    }

    async fn pull(
        &self,
        db: &DatabaseConnection,
        since: Option<DateTime<Utc>>,
    ) -> Result<EntityDelta, ServiceError> {
        pull_delta::<E>(db, since).await
    }

    async fn upsert_from_delta(
        &self,
        txn: &DatabaseTransaction,
        record: JsonValue,
    ) -> Result<(), ServiceError> {
        upsert_from_delta::<E, _>(txn, record).await
    }

    async fn delete_from_delta(
        &self,
        txn: &DatabaseTransaction,
        id: &str,
    ) -> Result<(), ServiceError> {
        delete_from_delta::<E, _>(txn, id).await
    }
}

/// The full participant registry. The sync endpoint iterates this instead of
/// naming entities; adding a syncable entity means adding one line here.
static REGISTRY: Lazy<Vec<Box<dyn SyncParticipant>>> = Lazy::new(|| {
    vec![
        Box::new(Registrant::<patient::Entity>::new()),
        Box::new(Registrant::<patient_attribute::Entity>::new()),
        Box::new(Registrant::<clinic::Entity>::new()),
        Box::new(Registrant::<clinic_department::Entity>::new()),
        Box::new(Registrant::<visit::Entity>::new()),
        Box::new(Registrant::<event::Entity>::new()),
        Box::new(Registrant::<event_form::Entity>::new()),
        Box::new(Registrant::<patient_registration_form::Entity>::new()),
        Box::new(Registrant::<appointment::Entity>::new()),
        Box::new(Registrant::<prescription::Entity>::new()),
        Box::new(Registrant::<prescription_item::Entity>::new()),
        Box::new(Registrant::<drug_batch::Entity>::new()),
        Box::new(Registrant::<clinic_inventory::Entity>::new()),
        // Dispensing records get bespoke push handling: a brand-new record
        // must run the auto-healing resolver, exactly as a direct insert
        // does.
        Box::new(DispensingRecordSync),
        // Server-only: present so the contract is explicit, skipped on pull.
        Box::new(Registrant::<user::Entity>::new()),
    ]
});

pub fn participants() -> &'static [Box<dyn SyncParticipant>] {
    &REGISTRY
}

/// Look up a participant by its mobile table name (the key clients use in
/// push payloads). Server-only participants are unreachable here.
pub fn participant_by_mobile_name(name: &str) -> Option<&'static dyn SyncParticipant> {
    REGISTRY
        .iter()
        .find(|p| p.mobile_name() == Some(name))
        .map(|p| p.as_ref())
}

/// Sync adapter for dispensing records. Pull and delete are the generic
/// behavior; upsert distinguishes inserts from updates because inserting a
/// dispensing record triggers the inventory resolver, while updating one
/// only rewrites its fields (deductions never re-fire).
struct DispensingRecordSync;

#[async_trait]
impl SyncParticipant for DispensingRecordSync {
    fn table_name(&self) -> &'static str {
        <dispensing_record::Entity as SyncEntity>::TABLE_NAME
    }

    fn mobile_name(&self) -> Option<&'static str> {
        <dispensing_record::Entity as SyncEntity>::MOBILE_NAME
    }

    fn always_push(&self) -> bool {
        <dispensing_record::Entity as SyncEntity>::ALWAYS_PUSH
    }

    async fn pull(
        &self,
        db: &DatabaseConnection,
        since: Option<DateTime<Utc>>,
    ) -> Result<EntityDelta, ServiceError> {
        pull_delta::<dispensing_record::Entity>(db, since).await
    }

    async fn upsert_from_delta(
        &self,
        txn: &DatabaseTransaction,
        record: JsonValue,
    ) -> Result<(), ServiceError> {
        let mut record = record;
        apply_server_defaults(&mut record);

        let model: dispensing_record::Model =
            serde_json::from_value(record).map_err(|e| {
                ServiceError::ValidationError(format!("malformed dispensing_records record: {}", e))
            })?;

        let existing = dispensing_record::Entity::find_by_id(model.id)
            .one(txn)
            .await?;

        if existing.is_some() {
            let value = serde_json::to_value(&model)?;
            upsert_from_delta::<dispensing_record::Entity, _>(txn, value).await
        } else {
            process_dispensing_insert(txn, model).await.map(|_| ())
        }
    }

    async fn delete_from_delta(
        &self,
        txn: &DatabaseTransaction,
        id: &str,
    ) -> Result<(), ServiceError> {
        delete_from_delta::<dispensing_record::Entity, _>(txn, id).await
    }
}

async fn pull_delta<E>(
    db: &DatabaseConnection,
    since: Option<DateTime<Utc>>,
) -> Result<EntityDelta, ServiceError>
where
    E: SyncEntity,
    E::Model: Serialize + Send + Sync,
{
    if E::ALWAYS_PUSH {
        // Full replace every pull: the watermark is deliberately ignored and
        // clients swap in the entire payload.
        let rows = E::find()
            .filter(E::is_deleted_column().eq(false))
            .all(db)
            .await?;
        let deleted = E::find()
            .filter(E::is_deleted_column().eq(true))
            .all(db)
            .await?;

        return Ok(EntityDelta {
            created: Vec::new(),
            updated: to_json_rows(rows)?,
            deleted: to_id_strings::<E>(deleted)?,
        });
    }

    let since = since.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    // is_deleted is filtered first, so a row created and soft-deleted inside
    // one window surfaces only as a deletion. Documented contract: deleted
    // wins over created.
    let created = E::find()
        .filter(E::last_modified_column().gt(since))
        .filter(E::server_created_at_column().gt(since))
        .filter(E::is_deleted_column().eq(false))
        .all(db)
        .await?;

    let updated = E::find()
        .filter(E::last_modified_column().gt(since))
        .filter(E::server_created_at_column().lte(since))
        .filter(E::is_deleted_column().eq(false))
        .all(db)
        .await?;

    let deleted = E::find()
        .filter(E::is_deleted_column().eq(true))
        .filter(E::deleted_at_column().gt(since))
        .all(db)
        .await?;

    Ok(EntityDelta {
        created: to_json_rows(created)?,
        updated: to_json_rows(updated)?,
        deleted: to_id_strings::<E>(deleted)?,
    })
}

async fn upsert_from_delta<E, C>(db: &C, record: JsonValue) -> Result<(), ServiceError>
where
    E: SyncEntity,
    C: ConnectionTrait,
    E::Model: DeserializeOwned + IntoActiveModel<E::ActiveModel>,
    E::ActiveModel: Send,
{
    let mut record = record;
    apply_server_defaults(&mut record);

    let model: E::Model = serde_json::from_value(record).map_err(|e| {
        ServiceError::ValidationError(format!("malformed {} record: {}", E::TABLE_NAME, e))
    })?;

    // reset_all marks every field Set so the conflict clause overwrites the
    // full row: last write wins, no timestamp comparison against current
    // server state. Known limitation for concurrent multi-device edits.
    let mut active = model.into_active_model().reset_all();
    active.set(E::last_modified_column(), Utc::now().into());

    // The primary key is the conflict target; server_created_at keeps its
    // original value so the created/updated pull split stays stable.
    let update_columns: Vec<E::Column> = E::Column::iter()
        .filter(|c| {
            c.as_str() != E::id_column().as_str()
                && c.as_str() != E::server_created_at_column().as_str()
        })
        .collect();

    let on_conflict = OnConflict::column(E::id_column())
        .update_columns(update_columns)
        .to_owned();

    E::insert(active).on_conflict(on_conflict).exec(db).await?;

    Ok(())
}

async fn delete_from_delta<E, C>(db: &C, id: &str) -> Result<(), ServiceError>
where
    E: SyncEntity,
    C: ConnectionTrait,
{
    let uuid = Uuid::parse_str(id).map_err(|_| {
        ServiceError::ValidationError(format!("invalid {} id: {}", E::TABLE_NAME, id))
    })?;

    let now = Utc::now();
    E::update_many()
        .col_expr(E::is_deleted_column(), Expr::value(true))
        .col_expr(E::deleted_at_column(), Expr::value(now))
        .col_expr(E::last_modified_column(), Expr::value(now))
        .filter(E::id_column().eq(uuid))
        .exec(db)
        .await?;

    Ok(())
}

fn to_json_rows<M: Serialize>(rows: Vec<M>) -> Result<Vec<JsonValue>, ServiceError> {
    rows.into_iter()
        .map(|row| serde_json::to_value(row).map_err(ServiceError::from))
        .collect()
}

fn to_id_strings<E: SyncEntity>(rows: Vec<E::Model>) -> Result<Vec<String>, ServiceError> {
    rows.into_iter()
        .map(|row| match row.get(E::id_column()) {
            Value::Uuid(Some(id)) => Ok(id.to_string()),
            other => Err(ServiceError::InternalError(format!(
                "non-uuid primary key on {}: {:?}",
                E::TABLE_NAME,
                other
            ))),
        })
        .collect()
}

/// Mobile payloads carry domain fields; the server owns bookkeeping columns.
/// Fill in whatever the client left out so deserialization into the full row
/// model succeeds.
fn apply_server_defaults(record: &mut JsonValue) {
    let now = Utc::now().to_rfc3339();
    if let Some(map) = record.as_object_mut() {
        for key in [
            "created_at",
            "updated_at",
            "last_modified",
            "server_created_at",
        ] {
            let missing = map.get(key).map_or(true, JsonValue::is_null);
            if missing {
                map.insert(key.to_string(), JsonValue::String(now.clone()));
            }
        }
        map.entry("is_deleted").or_insert(JsonValue::Bool(false));
        if !map.contains_key("deleted_at") {
            map.insert("deleted_at".to_string(), JsonValue::Null);
        }
        if !map.contains_key("metadata") {
            map.insert("metadata".to_string(), serde_json::json!({}));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn registry_has_no_duplicate_mobile_names() {
        let mut seen = std::collections::HashSet::new();
        for p in participants() {
            if let Some(name) = p.mobile_name() {
                assert!(seen.insert(name), "duplicate mobile table name: {}", name);
            }
        }
    }

    #[test_case("clinics", true; "clinics are reference data")]
    #[test_case("clinic_inventory", true; "balances are server authoritative")]
    #[test_case("drug_batches", true; "batches are server authoritative")]
    #[test_case("patients", false; "patients accept client edits")]
    #[test_case("dispensing_records", false; "dispensing flows up from the field")]
    fn always_push_flags(name: &str, expected: bool) {
        let p = participant_by_mobile_name(name).expect("participant registered");
        assert_eq!(p.always_push(), expected);
    }

    #[test]
    fn server_only_entities_have_no_mobile_name() {
        assert!(participant_by_mobile_name("users").is_none());
        assert!(participant_by_mobile_name("inventory_transactions").is_none());
    }

    #[test]
    fn server_defaults_fill_missing_bookkeeping_fields() {
        let mut record = serde_json::json!({
            "id": "7e5ce81e-3175-4cd5-a1b1-0060ff7a9b6e",
            "given_name": "Awa",
        });
        apply_server_defaults(&mut record);
        assert!(record["created_at"].is_string());
        assert_eq!(record["is_deleted"], JsonValue::Bool(false));
        assert!(record["deleted_at"].is_null());
    }
}
