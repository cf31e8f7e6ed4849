use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    dispensing_record, drug_batch,
    drug_batch::BatchProvenance,
    inventory_transaction::{ReferenceType, TransactionType},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::inventory::{record_transaction_in, NewTransaction};

pub const RECONCILIATION_REASON: &str = "RECONCILIATION NEEDED: Dispensed with negative inventory";
pub const PLAIN_DISPENSE_REASON: &str = "Medication dispensed to patient";

/// Input for a dispensing insert, as supplied by the clinical-workflow
/// caller. `batch_id` may be absent or point at a batch that does not exist;
/// the resolver heals both cases rather than rejecting the dispense.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewDispense {
    pub id: Option<Uuid>,
    pub clinic_id: Uuid,
    pub drug_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub prescription_item_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub quantity_dispensed: i32,
    pub dosage_instructions: Option<String>,
    pub days_supply: Option<i32>,
    pub dispensed_by: Uuid,
    pub dispensed_at: Option<DateTime<Utc>>,
    pub recorded_by_user_id: Option<Uuid>,
}

/// What a dispensing insert produced once the resolver ran.
#[derive(Debug, Clone, Serialize)]
pub struct DispenseOutcome {
    pub record: dispensing_record::Model,
    pub batch_id: Uuid,
    pub balance_after: i32,
    pub batch_auto_created: bool,
    pub reconciliation_flagged: bool,
}

/// Auto-Healing Resolver. Guarantees that dispensing medication to a patient
/// always succeeds, fabricating clearly-tagged batch and inventory rows when
/// the caller's references are missing or wrong. Data gaps become
/// reconciliation work, never a failure at the point of care.
#[derive(Clone)]
pub struct DispensingService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl DispensingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Insert a dispensing record and run the resolver. All derived writes
    /// (batch fabrication, balance deduction, ledger entry) share one
    /// database transaction with the insert: the inputs may be garbage, but
    /// once accepted, the derived records all exist together.
    #[instrument(skip(self, new))]
    pub async fn dispense(&self, new: NewDispense) -> Result<DispenseOutcome, ServiceError> {
        validate_dispense(&new)?;

        let now = Utc::now();
        let record = dispensing_record::Model {
            id: new.id.unwrap_or_else(Uuid::new_v4),
            clinic_id: new.clinic_id,
            drug_id: new.drug_id,
            batch_id: new.batch_id,
            prescription_item_id: new.prescription_item_id,
            patient_id: new.patient_id,
            quantity_dispensed: new.quantity_dispensed,
            dosage_instructions: new.dosage_instructions,
            days_supply: new.days_supply,
            dispensed_by: new.dispensed_by,
            dispensed_at: new.dispensed_at.unwrap_or(now),
            recorded_by_user_id: new.recorded_by_user_id,
            metadata: serde_json::json!({}),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            last_modified: now,
            server_created_at: now,
        };

        let effects = self
            .db
            .transaction::<_, DispenseEffects, ServiceError>(move |txn| {
                Box::pin(async move { process_dispensing_insert(txn, record).await })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        if let Some(reason) = &effects.auto_create_reason {
            if let Err(e) = self
                .event_sender
                .send(Event::BatchAutoCreated {
                    batch_id: effects.batch_id,
                    drug_id: effects.record.drug_id,
                    dispensing_record_id: effects.record.id,
                    reason: reason.clone(),
                })
                .await
            {
                warn!("failed to emit batch auto-created event: {}", e);
            }
        }

        if let Err(e) = self
            .event_sender
            .send(Event::MedicationDispensed {
                dispensing_record_id: effects.record.id,
                clinic_id: effects.record.clinic_id,
                drug_id: effects.record.drug_id,
                batch_id: effects.batch_id,
                quantity: effects.record.quantity_dispensed,
                balance_after: effects.balance_after,
            })
            .await
        {
            warn!("failed to emit dispensed event: {}", e);
        }

        info!(
            record_id = %effects.record.id,
            batch_id = %effects.batch_id,
            balance_after = effects.balance_after,
            auto_created = effects.auto_create_reason.is_some(),
            "medication dispensed"
        );

        Ok(DispenseOutcome {
            batch_id: effects.batch_id,
            balance_after: effects.balance_after,
            batch_auto_created: effects.auto_create_reason.is_some(),
            reconciliation_flagged: effects.balance_after < 0,
            record: effects.record,
        })
    }
}

fn validate_dispense(new: &NewDispense) -> Result<(), ServiceError> {
    if new.clinic_id.is_nil()
        || new.drug_id.is_nil()
        || new.patient_id.is_nil()
        || new.dispensed_by.is_nil()
    {
        return Err(ServiceError::ValidationError(
            "clinic_id, drug_id, patient_id and dispensed_by are required".to_string(),
        ));
    }
    if new.quantity_dispensed <= 0 {
        return Err(ServiceError::ValidationError(
            "quantity_dispensed must be positive".to_string(),
        ));
    }
    Ok(())
}

pub(crate) struct DispenseEffects {
    pub record: dispensing_record::Model,
    pub batch_id: Uuid,
    pub balance_after: i32,
    pub auto_create_reason: Option<String>,
}

/// The resolver itself, runnable against any connection so the sync push
/// path can invoke it inside its own per-entity transaction (mirroring the
/// insert trigger semantics: new dispensing rows deduct stock no matter how
/// they arrive).
///
/// Steps, in order, each branch mutually exclusive:
/// 1. null batch_id: adopt the latest-expiring batch for the drug, else
///    fabricate `UNTRACKED-{drug}-{epoch}`.
/// 2. dangling batch_id: fabricate a batch under that exact id, numbered
///    `RECOVERED-{id}`.
/// 3./4. ensure the balance row exists and deduct from it atomically (a
///    fresh row starts at the negative of the dispensed quantity), and
///    deduct from the batch's remaining quantity.
/// 5. append the `dispensed` ledger entry, reconciliation-flagged when the
///    resulting balance is negative.
pub(crate) async fn process_dispensing_insert<C: ConnectionTrait>(
    conn: &C,
    record: dispensing_record::Model,
) -> Result<DispenseEffects, ServiceError> {
    if record.quantity_dispensed <= 0 {
        return Err(ServiceError::ValidationError(
            "quantity_dispensed must be positive".to_string(),
        ));
    }

    let quantity = record.quantity_dispensed;
    let (batch, auto_create_reason) = resolve_batch(conn, &record).await?;

    let mut record = record;
    record.batch_id = Some(batch.id);

    let record = dispensing_record::ActiveModel::from(record.clone())
        .reset_all()
        .insert(conn)
        .await?;

    if let Some(auto_reason) = &auto_create_reason {
        tracing::debug!(batch_id = %batch.id, reason = %auto_reason, "dispensing against auto-created batch");
    }

    // Deduct from the batch's remaining quantity with an in-database
    // decrement, same discipline as the balance row.
    let now = Utc::now();
    drug_batch::Entity::update_many()
        .col_expr(
            drug_batch::Column::QuantityRemaining,
            Expr::col((drug_batch::Entity, drug_batch::Column::QuantityRemaining)).sub(quantity),
        )
        .col_expr(drug_batch::Column::UpdatedAt, Expr::value(now))
        .col_expr(drug_batch::Column::LastModified, Expr::value(now))
        .filter(drug_batch::Column::Id.eq(batch.id))
        .exec(conn)
        .await?;

    // Balance deduction and ledger append. The reason is decided by the
    // post-deduction balance, so peek at it via the same atomic path.
    let balance_after = crate::services::inventory::apply_balance_delta(
        conn,
        record.clinic_id,
        record.drug_id,
        batch.id,
        -quantity,
        Some(batch.batch_number.clone()),
        Some(batch.expiry_date),
        Some(record.dispensed_by),
    )
    .await?;

    let ledger_reason = if balance_after < 0 {
        RECONCILIATION_REASON.to_string()
    } else {
        PLAIN_DISPENSE_REASON.to_string()
    };

    let now = Utc::now();
    let transaction_id = Uuid::new_v4();
    crate::entities::inventory_transaction::ActiveModel {
        id: Set(transaction_id),
        clinic_id: Set(record.clinic_id),
        drug_id: Set(record.drug_id),
        batch_id: Set(Some(batch.id)),
        transaction_type: Set(TransactionType::Dispensed.as_str().to_string()),
        quantity: Set(-quantity),
        balance_after: Set(balance_after),
        reference_type: Set(Some(ReferenceType::DispensingRecord.as_str().to_string())),
        reference_id: Set(Some(record.id)),
        reason: Set(Some(ledger_reason)),
        performed_by: Set(Some(record.dispensed_by)),
        timestamp: Set(record.dispensed_at),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await?;

    Ok(DispenseEffects {
        batch_id: batch.id,
        balance_after,
        auto_create_reason,
        record,
    })
}

/// Steps 1 and 2 of the resolver: produce a real batch row for the dispense,
/// whatever the caller supplied.
async fn resolve_batch<C: ConnectionTrait>(
    conn: &C,
    record: &dispensing_record::Model,
) -> Result<(drug_batch::Model, Option<String>), ServiceError> {
    match record.batch_id {
        None => {
            let existing = drug_batch::Entity::find()
                .filter(drug_batch::Column::DrugId.eq(record.drug_id))
                .filter(drug_batch::Column::IsDeleted.eq(false))
                .order_by_desc(drug_batch::Column::ExpiryDate)
                .one(conn)
                .await?;

            match existing {
                Some(batch) => Ok((batch, None)),
                None => {
                    let reason = "batch_id was null during dispensing".to_string();
                    let batch = fabricate_batch(
                        conn,
                        Uuid::new_v4(),
                        record,
                        format!(
                            "UNTRACKED-{}-{}",
                            record.drug_id,
                            Utc::now().timestamp()
                        ),
                        &reason,
                    )
                    .await?;
                    Ok((batch, Some(reason)))
                }
            }
        }
        Some(batch_id) => {
            let existing = drug_batch::Entity::find_by_id(batch_id).one(conn).await?;
            match existing {
                Some(batch) => Ok((batch, None)),
                None => {
                    // The referenced id is kept so the dangling reference
                    // becomes valid retroactively.
                    let reason = "batch referenced but did not exist".to_string();
                    let batch = fabricate_batch(
                        conn,
                        batch_id,
                        record,
                        format!("RECOVERED-{}", batch_id),
                        &reason,
                    )
                    .await?;
                    Ok((batch, Some(reason)))
                }
            }
        }
    }
}

/// Minimally-valid placeholder batch: one year of shelf life, the dispensed
/// quantity as received, nothing remaining (the dispense consumes it), and
/// provenance metadata for the reconciliation queue.
async fn fabricate_batch<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    record: &dispensing_record::Model,
    batch_number: String,
    reason: &str,
) -> Result<drug_batch::Model, ServiceError> {
    let now = Utc::now();
    let provenance = BatchProvenance::AutoCreated {
        reason: reason.to_string(),
        dispensing_record_id: Some(record.id),
    };

    let batch = drug_batch::ActiveModel {
        id: Set(id),
        drug_id: Set(record.drug_id),
        batch_number: Set(batch_number),
        expiry_date: Set(now + Duration::days(365)),
        manufacture_date: Set(None),
        quantity_received: Set(record.quantity_dispensed),
        // Already considered consumed; the dispense deduction below takes it
        // negative, which is exactly the reconciliation signal.
        quantity_remaining: Set(0),
        supplier_name: Set(None),
        purchase_price: Set(None),
        purchase_currency: Set("USD".to_string()),
        received_date: Set(now),
        is_quarantined: Set(false),
        recorded_by_user_id: Set(record.recorded_by_user_id),
        metadata: Set(provenance.to_metadata()),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        last_modified: Set(now),
        server_created_at: Set(now),
    }
    .insert(conn)
    .await?;

    Ok(batch)
}
