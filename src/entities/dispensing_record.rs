use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncEntity;

/// A medication handed to a patient. Inserting one of these is the sole
/// trigger of the auto-healing inventory resolver: the insert always
/// succeeds even when batch/inventory metadata is missing or wrong, because
/// care delivery must never be blocked by data-entry gaps.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "dispensing_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub drug_id: Uuid,
    /// Nullable at insert time, never null after resolution.
    pub batch_id: Option<Uuid>,
    pub prescription_item_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub quantity_dispensed: i32,
    pub dosage_instructions: Option<String>,
    pub days_supply: Option<i32>,
    pub dispensed_by: Uuid,
    pub dispensed_at: DateTime<Utc>,
    pub recorded_by_user_id: Option<Uuid>,
    pub metadata: Json,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub server_created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::patient::Entity",
        from = "Column::PatientId",
        to = "super::patient::Column::Id"
    )]
    Patient,
}

impl Related<super::patient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Patient.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl SyncEntity for Entity {
    const TABLE_NAME: &'static str = "dispensing_records";
    const MOBILE_NAME: Option<&'static str> = Some("dispensing_records");
    const ALWAYS_PUSH: bool = false;

    fn id_column() -> Column {
        Column::Id
    }
    fn is_deleted_column() -> Column {
        Column::IsDeleted
    }
    fn deleted_at_column() -> Column {
        Column::DeletedAt
    }
    fn last_modified_column() -> Column {
        Column::LastModified
    }
    fn server_created_at_column() -> Column {
        Column::ServerCreatedAt
    }
}
