use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::SyncEntity;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "patients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub date_of_birth: Option<Date>,
    pub sex: Option<String>,
    pub citizenship: Option<String>,
    pub phone: Option<String>,
    pub primary_clinic_id: Option<Uuid>,
    pub government_id: Option<String>,
    pub external_patient_id: Option<String>,
    pub photo_url: Option<String>,
    pub metadata: Json,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub server_created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl SyncEntity for Entity {
    const TABLE_NAME: &'static str = "patients";
    const MOBILE_NAME: Option<&'static str> = Some("patients");
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
