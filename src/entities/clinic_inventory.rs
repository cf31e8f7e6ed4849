use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncEntity;

/// Materialized stock balance per (clinic, drug, batch). `quantity_available`
/// may legitimately go negative; a negative balance is a reconciliation
/// signal, never an error. Synced to mobile as a full replace on every pull.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clinic_inventory")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub drug_id: Uuid,
    pub batch_id: Uuid,
    pub quantity_available: i32,
    pub reserved_quantity: i32,
    /// Denormalized from drug_batches so mobile can display stock without a
    /// join against a table it does not sync in full.
    pub batch_number: Option<String>,
    pub batch_expiry_date: Option<DateTime<Utc>>,
    pub last_counted_at: Option<DateTime<Utc>>,
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
        belongs_to = "super::clinic::Entity",
        from = "Column::ClinicId",
        to = "super::clinic::Column::Id"
    )]
    Clinic,
    #[sea_orm(
        belongs_to = "super::drug_batch::Entity",
        from = "Column::BatchId",
        to = "super::drug_batch::Column::Id"
    )]
    Batch,
}

impl Related<super::clinic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Clinic.def()
    }
}

impl Related<super::drug_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl SyncEntity for Entity {
    const TABLE_NAME: &'static str = "clinic_inventory";
    const MOBILE_NAME: Option<&'static str> = Some("clinic_inventory");
    // One-way: the balance projection is server-authoritative and must never
    // accept client edits.
    const ALWAYS_PUSH: bool = true;

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
