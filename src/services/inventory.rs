use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    clinic_inventory, drug_batch,
    inventory_transaction::{self, ReferenceType, TransactionType},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Result of a ledger append: the transaction id and the balance snapshot it
/// carried.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerReceipt {
    pub transaction_id: Uuid,
    pub balance_after: i32,
}

/// Input for a ledger append.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: Option<Uuid>,
    pub clinic_id: Uuid,
    pub drug_id: Uuid,
    pub batch_id: Uuid,
    pub transaction_type: TransactionType,
    /// Signed delta; positive adds stock, negative removes it.
    pub quantity: i32,
    pub reference: Option<(ReferenceType, Uuid)>,
    pub reason: Option<String>,
    pub performed_by: Option<Uuid>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Input for a stock receipt: a new batch and the clinic taking it in.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub drug_id: Uuid,
    pub clinic_id: Uuid,
    pub batch_number: String,
    pub expiry_date: DateTime<Utc>,
    pub manufacture_date: Option<DateTime<Utc>>,
    pub quantity_received: i32,
    pub supplier_name: Option<String>,
    pub purchase_price: Option<f64>,
    pub purchase_currency: Option<String>,
    pub recorded_by_user_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Filters for listing ledger entries.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilters {
    pub drug_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Back-office review queue: everything the auto-healing resolver flagged.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub auto_created_batches: Vec<drug_batch::Model>,
    pub negative_balances: Vec<clinic_inventory::Model>,
    pub flagged_transactions: Vec<inventory_transaction::Model>,
}

/// Change Ledger and Balance Aggregator. Every stock movement flows through
/// [`InventoryService::record_transaction`], which appends to the
/// append-only ledger and maintains the (clinic, drug, batch) balance
/// projection in the same database transaction.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Append a movement to the ledger and apply its delta to the balance
    /// projection, atomically. Negative resulting balances are allowed: they
    /// are a reconciliation signal, not an error.
    #[instrument(skip(self))]
    pub async fn record_transaction(
        &self,
        new: NewTransaction,
    ) -> Result<LedgerReceipt, ServiceError> {
        validate_transaction(&new)?;

        let event_input = new.clone();
        let receipt = self
            .db
            .transaction::<_, LedgerReceipt, ServiceError>(move |txn| {
                Box::pin(async move { record_transaction_in(txn, new).await })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        if let Err(e) = self
            .event_sender
            .send(Event::InventoryTransactionRecorded {
                transaction_id: receipt.transaction_id,
                clinic_id: event_input.clinic_id,
                drug_id: event_input.drug_id,
                batch_id: event_input.batch_id,
                transaction_type: event_input.transaction_type.as_str().to_string(),
                quantity: event_input.quantity,
                balance_after: receipt.balance_after,
            })
            .await
        {
            tracing::warn!("failed to emit ledger event: {}", e);
        }

        Ok(receipt)
    }

    /// Receive a new batch of stock: create the drug_batches row, seed the
    /// clinic balance, and append the `received` ledger entry in one
    /// transaction.
    #[instrument(skip(self, new))]
    pub async fn receive_batch(
        &self,
        new: NewBatch,
    ) -> Result<(drug_batch::Model, LedgerReceipt), ServiceError> {
        if new.quantity_received <= 0 {
            return Err(ServiceError::ValidationError(
                "quantity_received must be positive".to_string(),
            ));
        }
        if new.batch_number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "batch_number is required".to_string(),
            ));
        }
        if new.drug_id.is_nil() || new.clinic_id.is_nil() {
            return Err(ServiceError::ValidationError(
                "drug_id and clinic_id are required".to_string(),
            ));
        }

        let input = new.clone();
        let (batch, receipt) = self
            .db
            .transaction::<_, (drug_batch::Model, LedgerReceipt), ServiceError>(move |txn| {
                Box::pin(async move {
                    let now = Utc::now();
                    let batch = drug_batch::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        drug_id: Set(new.drug_id),
                        batch_number: Set(new.batch_number.clone()),
                        expiry_date: Set(new.expiry_date),
                        manufacture_date: Set(new.manufacture_date),
                        quantity_received: Set(new.quantity_received),
                        quantity_remaining: Set(new.quantity_received),
                        supplier_name: Set(new.supplier_name.clone()),
                        purchase_price: Set(new.purchase_price),
                        purchase_currency: Set(new
                            .purchase_currency
                            .clone()
                            .unwrap_or_else(|| "USD".to_string())),
                        received_date: Set(now),
                        is_quarantined: Set(false),
                        recorded_by_user_id: Set(new.recorded_by_user_id),
                        metadata: Set(serde_json::json!({})),
                        is_deleted: Set(false),
                        deleted_at: Set(None),
                        created_at: Set(now),
                        updated_at: Set(now),
                        last_modified: Set(now),
                        server_created_at: Set(now),
                    }
                    .insert(txn)
                    .await?;

                    let reason = match &new.notes {
                        Some(notes) => format!(
                            "New batch received - Batch #{} - {}",
                            new.batch_number, notes
                        ),
                        None => format!("New batch received - Batch #{}", new.batch_number),
                    };

                    let receipt = record_transaction_in(
                        txn,
                        NewTransaction {
                            id: None,
                            clinic_id: new.clinic_id,
                            drug_id: new.drug_id,
                            batch_id: batch.id,
                            transaction_type: TransactionType::Received,
                            quantity: new.quantity_received,
                            reference: Some((ReferenceType::StockOrder, batch.id)),
                            reason: Some(reason),
                            performed_by: new.recorded_by_user_id,
                            timestamp: None,
                        },
                    )
                    .await?;

                    Ok((batch, receipt))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        if let Err(e) = self
            .event_sender
            .send(Event::StockReceived {
                batch_id: batch.id,
                clinic_id: input.clinic_id,
                drug_id: input.drug_id,
                quantity: input.quantity_received,
            })
            .await
        {
            tracing::warn!("failed to emit stock received event: {}", e);
        }

        info!(batch_id = %batch.id, quantity = input.quantity_received, "stock received");
        Ok((batch, receipt))
    }

    /// Record a physical stock count. A matching count only touches
    /// `last_counted_at`; a mismatch appends an `adjustment` for the
    /// difference.
    #[instrument(skip(self))]
    pub async fn recount(
        &self,
        clinic_id: Uuid,
        drug_id: Uuid,
        batch_id: Uuid,
        counted_quantity: i32,
        performed_by: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<Option<LedgerReceipt>, ServiceError> {
        let current = clinic_inventory::Entity::find()
            .filter(clinic_inventory::Column::ClinicId.eq(clinic_id))
            .filter(clinic_inventory::Column::DrugId.eq(drug_id))
            .filter(clinic_inventory::Column::BatchId.eq(batch_id))
            .one(self.db.as_ref())
            .await?;

        let current_quantity = current.as_ref().map_or(0, |row| row.quantity_available);
        let delta = counted_quantity - current_quantity;

        if delta == 0 {
            if let Some(row) = current {
                let now = Utc::now();
                let mut active: clinic_inventory::ActiveModel = row.into();
                active.last_counted_at = Set(Some(now));
                active.updated_at = Set(now);
                active.last_modified = Set(now);
                active.update(self.db.as_ref()).await?;
            }
            return Ok(None);
        }

        let reason = reason.unwrap_or_else(|| {
            format!(
                "Stock count adjustment: {}{}",
                if delta > 0 { "+" } else { "" },
                delta
            )
        });

        let receipt = self
            .record_transaction(NewTransaction {
                id: None,
                clinic_id,
                drug_id,
                batch_id,
                transaction_type: TransactionType::Adjustment,
                quantity: delta,
                reference: None,
                reason: Some(reason),
                performed_by,
                timestamp: None,
            })
            .await?;

        let now = Utc::now();
        clinic_inventory::Entity::update_many()
            .col_expr(clinic_inventory::Column::LastCountedAt, Expr::value(now))
            .filter(clinic_inventory::Column::ClinicId.eq(clinic_id))
            .filter(clinic_inventory::Column::DrugId.eq(drug_id))
            .filter(clinic_inventory::Column::BatchId.eq(batch_id))
            .exec(self.db.as_ref())
            .await?;

        Ok(Some(receipt))
    }

    /// Current balances for a clinic.
    pub async fn balances(
        &self,
        clinic_id: Uuid,
    ) -> Result<Vec<clinic_inventory::Model>, ServiceError> {
        let rows = clinic_inventory::Entity::find()
            .filter(clinic_inventory::Column::ClinicId.eq(clinic_id))
            .filter(clinic_inventory::Column::IsDeleted.eq(false))
            .order_by_asc(clinic_inventory::Column::DrugId)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    /// Ledger entries for a clinic, newest first.
    pub async fn list_transactions(
        &self,
        clinic_id: Uuid,
        filters: TransactionFilters,
    ) -> Result<Vec<inventory_transaction::Model>, ServiceError> {
        let mut query = inventory_transaction::Entity::find()
            .filter(inventory_transaction::Column::ClinicId.eq(clinic_id));

        if let Some(drug_id) = filters.drug_id {
            query = query.filter(inventory_transaction::Column::DrugId.eq(drug_id));
        }
        if let Some(ty) = filters.transaction_type {
            query = query.filter(inventory_transaction::Column::TransactionType.eq(ty.as_str()));
        }
        if let Some(start) = filters.start {
            query = query.filter(inventory_transaction::Column::Timestamp.gte(start));
        }
        if let Some(end) = filters.end {
            query = query.filter(inventory_transaction::Column::Timestamp.lte(end));
        }

        let rows = query
            .order_by_desc(inventory_transaction::Column::Timestamp)
            .limit(filters.limit.unwrap_or(50))
            .offset(filters.offset.unwrap_or(0))
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    /// Update the audit metadata of a ledger entry. Quantity and balance are
    /// immutable once written.
    pub async fn update_transaction_metadata(
        &self,
        id: Uuid,
        reason: Option<String>,
        reference: Option<(ReferenceType, Uuid)>,
    ) -> Result<(), ServiceError> {
        let row = inventory_transaction::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("transaction {} not found", id)))?;

        let mut active: inventory_transaction::ActiveModel = row.into();
        if let Some(reason) = reason {
            active.reason = Set(Some(reason));
        }
        if let Some((ref_type, ref_id)) = reference {
            active.reference_type = Set(Some(ref_type.as_str().to_string()));
            active.reference_id = Set(Some(ref_id));
        }
        active.updated_at = Set(Utc::now());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    /// Everything queued for back-office review: fabricated batches, negative
    /// balances, and reconciliation-flagged ledger entries.
    #[instrument(skip(self))]
    pub async fn reconciliation_report(
        &self,
        clinic_id: Option<Uuid>,
    ) -> Result<ReconciliationReport, ServiceError> {
        let db = self.db.as_ref();

        let auto_created_filter = match db.get_database_backend() {
            DbBackend::Postgres => Expr::cust("metadata ->> 'auto_created' = 'true'"),
            _ => Expr::cust("json_extract(metadata, '$.auto_created') = 1"),
        };
        let auto_created_batches = drug_batch::Entity::find()
            .filter(drug_batch::Column::IsDeleted.eq(false))
            .filter(auto_created_filter)
            .all(db)
            .await?;

        let mut negative = clinic_inventory::Entity::find()
            .filter(clinic_inventory::Column::QuantityAvailable.lt(0))
            .filter(clinic_inventory::Column::IsDeleted.eq(false));
        if let Some(clinic_id) = clinic_id {
            negative = negative.filter(clinic_inventory::Column::ClinicId.eq(clinic_id));
        }
        let negative_balances = negative.all(db).await?;

        let mut flagged = inventory_transaction::Entity::find()
            .filter(inventory_transaction::Column::Reason.contains("RECONCILIATION"));
        if let Some(clinic_id) = clinic_id {
            flagged = flagged.filter(inventory_transaction::Column::ClinicId.eq(clinic_id));
        }
        let flagged_transactions = flagged
            .order_by_desc(inventory_transaction::Column::Timestamp)
            .all(db)
            .await?;

        Ok(ReconciliationReport {
            auto_created_batches,
            negative_balances,
            flagged_transactions,
        })
    }
}

fn validate_transaction(new: &NewTransaction) -> Result<(), ServiceError> {
    if new.clinic_id.is_nil() || new.drug_id.is_nil() || new.batch_id.is_nil() {
        return Err(ServiceError::ValidationError(
            "clinic_id, drug_id and batch_id are required".to_string(),
        ));
    }
    if new.quantity == 0 {
        return Err(ServiceError::ValidationError(
            "quantity must be non-zero".to_string(),
        ));
    }
    Ok(())
}

/// Ledger append + balance upsert against an existing connection or
/// transaction. The dispensing resolver reuses this inside its own atomic
/// unit.
pub(crate) async fn record_transaction_in<C: ConnectionTrait>(
    conn: &C,
    new: NewTransaction,
) -> Result<LedgerReceipt, ServiceError> {
    validate_transaction(&new)?;

    // Denormalized batch fields ride along on the balance row.
    let batch = drug_batch::Entity::find_by_id(new.batch_id).one(conn).await?;
    let (batch_number, batch_expiry) = batch
        .map(|b| (Some(b.batch_number), Some(b.expiry_date)))
        .unwrap_or((None, None));

    let balance_after = apply_balance_delta(
        conn,
        new.clinic_id,
        new.drug_id,
        new.batch_id,
        new.quantity,
        batch_number,
        batch_expiry,
        new.performed_by,
    )
    .await?;

    let now = Utc::now();
    let transaction_id = new.id.unwrap_or_else(Uuid::new_v4);
    inventory_transaction::ActiveModel {
        id: Set(transaction_id),
        clinic_id: Set(new.clinic_id),
        drug_id: Set(new.drug_id),
        batch_id: Set(Some(new.batch_id)),
        transaction_type: Set(new.transaction_type.as_str().to_string()),
        quantity: Set(new.quantity),
        balance_after: Set(balance_after),
        reference_type: Set(new.reference.map(|(t, _)| t.as_str().to_string())),
        reference_id: Set(new.reference.map(|(_, id)| id)),
        reason: Set(new.reason),
        performed_by: Set(new.performed_by),
        timestamp: Set(new.timestamp.unwrap_or(now)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    Ok(LedgerReceipt {
        transaction_id,
        balance_after,
    })
}

/// Atomic increment of the (clinic, drug, batch) balance. The whole point of
/// this shape is that the delta is applied inside the database
/// (`quantity_available = quantity_available + delta`), never via
/// read-modify-write in application code, so concurrent movements against
/// the same key serialize on the row instead of losing updates.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn apply_balance_delta<C: ConnectionTrait>(
    conn: &C,
    clinic_id: Uuid,
    drug_id: Uuid,
    batch_id: Uuid,
    delta: i32,
    batch_number: Option<String>,
    batch_expiry_date: Option<DateTime<Utc>>,
    recorded_by: Option<Uuid>,
) -> Result<i32, ServiceError> {
    let now = Utc::now();

    // A missing balance row starts at the delta itself, which is how a
    // dispense against untracked stock legitimately lands negative.
    let seed = clinic_inventory::ActiveModel {
        id: Set(Uuid::new_v4()),
        clinic_id: Set(clinic_id),
        drug_id: Set(drug_id),
        batch_id: Set(batch_id),
        quantity_available: Set(delta),
        reserved_quantity: Set(0),
        batch_number: Set(batch_number),
        batch_expiry_date: Set(batch_expiry_date),
        last_counted_at: Set(None),
        recorded_by_user_id: Set(recorded_by),
        metadata: Set(serde_json::json!({})),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        last_modified: Set(now),
        server_created_at: Set(now),
    };

    let on_conflict = OnConflict::columns([
        clinic_inventory::Column::ClinicId,
        clinic_inventory::Column::DrugId,
        clinic_inventory::Column::BatchId,
    ])
    .value(
        clinic_inventory::Column::QuantityAvailable,
        Expr::col((
            clinic_inventory::Entity,
            clinic_inventory::Column::QuantityAvailable,
        ))
        .add(delta),
    )
    .value(clinic_inventory::Column::UpdatedAt, Expr::value(now))
    .value(clinic_inventory::Column::LastModified, Expr::value(now))
    .to_owned();

    clinic_inventory::Entity::insert(seed)
        .on_conflict(on_conflict)
        .exec(conn)
        .await?;

    // Reading back inside the same transaction observes the row the upsert
    // just locked, so this is the post-delta balance.
    let row = clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::ClinicId.eq(clinic_id))
        .filter(clinic_inventory::Column::DrugId.eq(drug_id))
        .filter(clinic_inventory::Column::BatchId.eq(batch_id))
        .one(conn)
        .await?
        .ok_or_else(|| {
            ServiceError::InternalError("balance row missing after upsert".to_string())
        })?;

    Ok(row.quantity_available)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_quantity_is_rejected_before_any_write() {
        let new = NewTransaction {
            id: None,
            clinic_id: Uuid::new_v4(),
            drug_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            transaction_type: TransactionType::Adjustment,
            quantity: 0,
            reference: None,
            reason: None,
            performed_by: None,
            timestamp: None,
        };
        assert!(matches!(
            validate_transaction(&new),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn nil_ids_are_rejected_before_any_write() {
        let new = NewTransaction {
            id: None,
            clinic_id: Uuid::nil(),
            drug_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            transaction_type: TransactionType::Received,
            quantity: 5,
            reference: None,
            reason: None,
            performed_by: None,
            timestamp: None,
        };
        assert!(matches!(
            validate_transaction(&new),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
