use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncEntity;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "appointments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub provider_id: Option<Uuid>,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub user_id: Option<Uuid>,
    pub current_visit_id: Option<Uuid>,
    pub fulfilled_visit_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    /// Planned duration in minutes.
    pub duration: Option<i32>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub status: String,
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
    #[sea_orm(
        belongs_to = "super::clinic::Entity",
        from = "Column::ClinicId",
        to = "super::clinic::Column::Id"
    )]
    Clinic,
}

impl Related<super::patient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Patient.def()
    }
}

impl Related<super::clinic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Clinic.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl SyncEntity for Entity {
    const TABLE_NAME: &'static str = "appointments";
    const MOBILE_NAME: Option<&'static str> = Some("appointments");
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
