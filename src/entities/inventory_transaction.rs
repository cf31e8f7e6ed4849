use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inventory movement types. Transfers are plain ledger records; there is no
/// transfer workflow engine on top of them.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
    Received,
    Dispensed,
    TransferredIn,
    TransferredOut,
    Expired,
    Damaged,
    Adjustment,
    Returned,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

/// Polymorphic link back to the business record that caused a movement.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    utoipa::ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReferenceType {
    DispensingRecord,
    StockOrder,
    TransferOrder,
    AdjustmentRecord,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

/// Append-only audit ledger of inventory movements. Quantity and balance are
/// immutable once written; only reason/reference metadata may change. This
/// table is server-only and never synced to mobile clients.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub drug_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub transaction_type: String,
    /// Signed delta applied to the balance.
    pub quantity: i32,
    /// Snapshot of the resulting balance, for audit without recomputation.
    pub balance_after: i32,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub reason: Option<String>,
    pub performed_by: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if let ActiveValue::NotSet = active_model.timestamp {
            active_model.timestamp = Set(now);
        }
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(now);
        }
        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(now);
        }
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn transaction_types_round_trip_through_strings() {
        for (ty, s) in [
            (TransactionType::Received, "received"),
            (TransactionType::Dispensed, "dispensed"),
            (TransactionType::TransferredIn, "transferred_in"),
            (TransactionType::TransferredOut, "transferred_out"),
            (TransactionType::Expired, "expired"),
            (TransactionType::Damaged, "damaged"),
            (TransactionType::Adjustment, "adjustment"),
            (TransactionType::Returned, "returned"),
        ] {
            assert_eq!(ty.as_str(), s);
            assert_eq!(TransactionType::from_str(s).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_transaction_type_is_rejected() {
        assert!(TransactionType::from_str("teleported").is_err());
    }
}
