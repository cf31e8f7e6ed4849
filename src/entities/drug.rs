use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Drug catalogue. Not a sync participant: mobile displays stock through the
/// denormalized fields on clinic_inventory instead.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "drug_catalogue")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub generic_name: String,
    pub brand_name: Option<String>,
    pub form: Option<String>,
    pub route: Option<String>,
    pub dosage_quantity: Option<f64>,
    pub dosage_units: Option<String>,
    pub sale_price: Option<f64>,
    pub sale_currency: Option<String>,
    pub is_controlled: bool,
    pub requires_refrigeration: bool,
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
