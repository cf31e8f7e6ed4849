use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncEntity;

/// A clinical data point captured during (or outside) a visit: a filled form,
/// a vital measurement, a note. The payload shape is owned by the form
/// definition; the server stores it opaquely.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub patient_id: Uuid,
    pub visit_id: Option<Uuid>,
    pub form_id: Option<Uuid>,
    pub event_type: String,
    pub form_data: Json,
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
    const TABLE_NAME: &'static str = "events";
    const MOBILE_NAME: Option<&'static str> = Some("events");
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
