use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncEntity;

/// Metadata keys stamped on batches fabricated by the auto-healing resolver.
/// Back-office reconciliation queries filter on
/// `metadata->>'auto_created' = 'true'`.
pub const METADATA_AUTO_CREATED: &str = "auto_created";
pub const METADATA_REASON: &str = "reason";
pub const METADATA_DISPENSING_RECORD_ID: &str = "dispensing_record_id";

/// Typed view of the batch `metadata` blob at the application boundary. The
/// storage layer keeps the open-ended JSON map so the documented SQL
/// reconciliation queries keep working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchProvenance {
    AutoCreated {
        reason: String,
        dispensing_record_id: Option<Uuid>,
    },
    Manual,
}

impl BatchProvenance {
    pub fn from_metadata(metadata: &Json) -> Self {
        let auto_created = metadata
            .get(METADATA_AUTO_CREATED)
            .and_then(Json::as_bool)
            .unwrap_or(false);
        if !auto_created {
            return BatchProvenance::Manual;
        }
        BatchProvenance::AutoCreated {
            reason: metadata
                .get(METADATA_REASON)
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string(),
            dispensing_record_id: metadata
                .get(METADATA_DISPENSING_RECORD_ID)
                .and_then(Json::as_str)
                .and_then(|s| Uuid::parse_str(s).ok()),
        }
    }

    pub fn to_metadata(&self) -> Json {
        match self {
            BatchProvenance::Manual => serde_json::json!({}),
            BatchProvenance::AutoCreated {
                reason,
                dispensing_record_id,
            } => serde_json::json!({
                METADATA_AUTO_CREATED: true,
                METADATA_REASON: reason,
                METADATA_DISPENSING_RECORD_ID: dispensing_record_id.map(|id| id.to_string()),
            }),
        }
    }

    pub fn is_auto_created(&self) -> bool {
        matches!(self, BatchProvenance::AutoCreated { .. })
    }
}

/// A received (or fabricated) lot of a drug. Created explicitly on stock
/// receipt, or implicitly by the auto-healing resolver when a dispensing
/// record arrives without a usable batch reference.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "drug_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub drug_id: Uuid,
    pub batch_number: String,
    pub expiry_date: DateTime<Utc>,
    pub manufacture_date: Option<DateTime<Utc>>,
    pub quantity_received: i32,
    pub quantity_remaining: i32,
    pub supplier_name: Option<String>,
    pub purchase_price: Option<f64>,
    pub purchase_currency: String,
    pub received_date: DateTime<Utc>,
    pub is_quarantined: bool,
    pub recorded_by_user_id: Option<Uuid>,
    pub metadata: Json,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub server_created_at: DateTime<Utc>,
}

impl Model {
    pub fn provenance(&self) -> BatchProvenance {
        BatchProvenance::from_metadata(&self.metadata)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::drug::Entity",
        from = "Column::DrugId",
        to = "super::drug::Column::Id"
    )]
    Drug,
}

impl Related<super::drug::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Drug.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl SyncEntity for Entity {
    const TABLE_NAME: &'static str = "drug_batches";
    const MOBILE_NAME: Option<&'static str> = Some("drug_batches");
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
