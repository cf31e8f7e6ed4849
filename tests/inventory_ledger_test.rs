mod common;

use assert_matches::assert_matches;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use uuid::Uuid;

use carebase_api::entities::{
    clinic_inventory,
    inventory_transaction::{self, ReferenceType, TransactionType},
};
use carebase_api::errors::ServiceError;
use carebase_api::services::inventory::{NewBatch, NewTransaction};

use common::{build_services, seed_batch, seed_clinic, seed_drug, setup_db};

fn new_transaction(
    clinic_id: Uuid,
    drug_id: Uuid,
    batch_id: Uuid,
    transaction_type: TransactionType,
    quantity: i32,
) -> NewTransaction {
    NewTransaction {
        id: None,
        clinic_id,
        drug_id,
        batch_id,
        transaction_type,
        quantity,
        reference: None,
        reason: None,
        performed_by: None,
        timestamp: None,
    }
}

async fn current_balance(
    db: &sea_orm::DatabaseConnection,
    clinic_id: Uuid,
    drug_id: Uuid,
    batch_id: Uuid,
) -> Option<i32> {
    clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::ClinicId.eq(clinic_id))
        .filter(clinic_inventory::Column::DrugId.eq(drug_id))
        .filter(clinic_inventory::Column::BatchId.eq(batch_id))
        .one(db)
        .await
        .unwrap()
        .map(|row| row.quantity_available)
}

#[tokio::test]
async fn balance_equals_ledger_sum_and_latest_snapshot() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Nyala Clinic").await;
    let drug = seed_drug(&db, "amoxicillin").await;
    let batch = seed_batch(&db, drug.id, "AMX-001", 100).await;

    let movements = [
        (TransactionType::Received, 100),
        (TransactionType::Dispensed, -30),
        (TransactionType::Adjustment, -5),
        (TransactionType::Returned, 10),
        (TransactionType::TransferredOut, -20),
    ];

    for (ty, qty) in movements {
        services
            .inventory
            .record_transaction(new_transaction(clinic.id, drug.id, batch.id, ty, qty))
            .await
            .expect("record transaction");
    }

    let transactions = inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::ClinicId.eq(clinic.id))
        .order_by_asc(inventory_transaction::Column::CreatedAt)
        .all(db.as_ref())
        .await
        .unwrap();

    let ledger_sum: i32 = transactions.iter().map(|t| t.quantity).sum();
    let balance = current_balance(&db, clinic.id, drug.id, batch.id)
        .await
        .expect("balance row exists");

    assert_eq!(ledger_sum, 55);
    assert_eq!(balance, ledger_sum);
    assert_eq!(transactions.last().unwrap().balance_after, balance);

    // Every intermediate snapshot is the running sum up to that entry.
    let mut running = 0;
    for t in &transactions {
        running += t.quantity;
        assert_eq!(t.balance_after, running);
    }
}

#[tokio::test]
async fn negative_balances_are_recorded_not_rejected() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Remote Outpost").await;
    let drug = seed_drug(&db, "paracetamol").await;
    let batch = seed_batch(&db, drug.id, "PCM-7", 0).await;

    let receipt = services
        .inventory
        .record_transaction(new_transaction(
            clinic.id,
            drug.id,
            batch.id,
            TransactionType::Dispensed,
            -40,
        ))
        .await
        .expect("negative balance must not be an error");

    assert_eq!(receipt.balance_after, -40);
    assert_eq!(
        current_balance(&db, clinic.id, drug.id, batch.id).await,
        Some(-40)
    );
}

#[tokio::test]
async fn validation_failures_leave_no_partial_state() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Nyala Clinic").await;
    let drug = seed_drug(&db, "ibuprofen").await;
    let batch = seed_batch(&db, drug.id, "IBU-1", 10).await;

    let err = services
        .inventory
        .record_transaction(new_transaction(
            clinic.id,
            drug.id,
            batch.id,
            TransactionType::Adjustment,
            0,
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = services
        .inventory
        .record_transaction(new_transaction(
            Uuid::nil(),
            drug.id,
            batch.id,
            TransactionType::Adjustment,
            5,
        ))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let count = inventory_transaction::Entity::find()
        .count(db.as_ref())
        .await
        .unwrap();
    assert_eq!(count, 0, "rejected input must write nothing");
    assert_eq!(current_balance(&db, clinic.id, drug.id, batch.id).await, None);
}

#[tokio::test]
async fn receive_batch_is_one_atomic_receipt() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Central Pharmacy").await;
    let drug = seed_drug(&db, "ceftriaxone").await;

    let (batch, receipt) = services
        .inventory
        .receive_batch(NewBatch {
            drug_id: drug.id,
            clinic_id: clinic.id,
            batch_number: "CFX-2026-04".to_string(),
            expiry_date: chrono::Utc::now() + chrono::Duration::days(400),
            manufacture_date: None,
            quantity_received: 250,
            supplier_name: Some("Medline Wholesale".to_string()),
            purchase_price: Some(112.50),
            purchase_currency: None,
            recorded_by_user_id: None,
            notes: Some("quarterly order".to_string()),
        })
        .await
        .expect("receive batch");

    assert_eq!(batch.quantity_received, 250);
    assert_eq!(batch.quantity_remaining, 250);
    assert_eq!(receipt.balance_after, 250);

    let transactions = inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::BatchId.eq(batch.id))
        .all(db.as_ref())
        .await
        .unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].transaction_type, "received");
    assert_eq!(transactions[0].quantity, 250);
    assert_eq!(transactions[0].balance_after, 250);
    assert_eq!(
        transactions[0].reference_type.as_deref(),
        Some(ReferenceType::StockOrder.as_str())
    );
    assert!(transactions[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("CFX-2026-04"));

    assert_eq!(
        current_balance(&db, clinic.id, drug.id, batch.id).await,
        Some(250)
    );
}

#[tokio::test]
async fn recount_records_only_the_difference() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Nyala Clinic").await;
    let drug = seed_drug(&db, "metformin").await;
    let batch = seed_batch(&db, drug.id, "MET-3", 50).await;

    services
        .inventory
        .record_transaction(new_transaction(
            clinic.id,
            drug.id,
            batch.id,
            TransactionType::Received,
            50,
        ))
        .await
        .unwrap();

    // Physical count found 47.
    let receipt = services
        .inventory
        .recount(clinic.id, drug.id, batch.id, 47, None, None)
        .await
        .unwrap()
        .expect("mismatch records an adjustment");
    assert_eq!(receipt.balance_after, 47);

    let adjustment = inventory_transaction::Entity::find_by_id(receipt.transaction_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(adjustment.transaction_type, "adjustment");
    assert_eq!(adjustment.quantity, -3);

    // Counting the same number again is a no-op on the ledger.
    let receipt = services
        .inventory
        .recount(clinic.id, drug.id, batch.id, 47, None, None)
        .await
        .unwrap();
    assert!(receipt.is_none());

    let row = clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::BatchId.eq(batch.id))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(row.last_counted_at.is_some());
}

/// No partial ledger state: if the ledger append fails after the balance
/// upsert already ran inside the same transaction, neither write survives.
#[tokio::test]
async fn failed_ledger_append_rolls_back_the_balance_upsert() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Nyala Clinic").await;
    let drug = seed_drug(&db, "gentamicin").await;
    let batch = seed_batch(&db, drug.id, "GEN-1", 10).await;

    let fixed_id = Uuid::new_v4();
    let mut first = new_transaction(clinic.id, drug.id, batch.id, TransactionType::Received, 10);
    first.id = Some(fixed_id);
    services
        .inventory
        .record_transaction(first)
        .await
        .expect("first append succeeds");

    // Same primary key again: the ledger insert violates the pk constraint
    // AFTER the balance increment already executed in the transaction.
    let mut second = new_transaction(clinic.id, drug.id, batch.id, TransactionType::Received, 7);
    second.id = Some(fixed_id);
    let err = services.inventory.record_transaction(second).await;
    assert!(err.is_err());

    // The increment was rolled back with the failed append.
    assert_eq!(
        current_balance(&db, clinic.id, drug.id, batch.id).await,
        Some(10)
    );
    let count = inventory_transaction::Entity::find()
        .count(db.as_ref())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn transaction_metadata_updates_never_touch_quantity() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Nyala Clinic").await;
    let drug = seed_drug(&db, "amoxicillin").await;
    let batch = seed_batch(&db, drug.id, "AMX-2", 10).await;

    let receipt = services
        .inventory
        .record_transaction(new_transaction(
            clinic.id,
            drug.id,
            batch.id,
            TransactionType::Received,
            10,
        ))
        .await
        .unwrap();

    let reference_id = Uuid::new_v4();
    services
        .inventory
        .update_transaction_metadata(
            receipt.transaction_id,
            Some("corrected supplier note".to_string()),
            Some((ReferenceType::AdjustmentRecord, reference_id)),
        )
        .await
        .unwrap();

    let row = inventory_transaction::Entity::find_by_id(receipt.transaction_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.reason.as_deref(), Some("corrected supplier note"));
    assert_eq!(row.reference_id, Some(reference_id));
    assert_eq!(row.quantity, 10, "quantity is immutable");
    assert_eq!(row.balance_after, 10, "balance snapshot is immutable");
}

mod balance_property {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]
        /// P1 under arbitrary movement sequences: the materialized balance is
        /// always the signed sum of the ledger, and the last snapshot agrees.
        #[test]
        fn balance_matches_ledger_sum(raw_deltas in proptest::collection::vec(-50i32..=50, 1..10)) {
            let deltas: Vec<i32> = raw_deltas.into_iter().filter(|d| *d != 0).collect();
            prop_assume!(!deltas.is_empty());

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            rt.block_on(async move {
                let db = setup_db().await;
                let services = build_services(db.clone());

                let clinic = seed_clinic(&db, "Prop Clinic").await;
                let drug = seed_drug(&db, "propranolol").await;
                let batch = seed_batch(&db, drug.id, "PRP-1", 0).await;

                let mut expected = 0i32;
                for delta in &deltas {
                    let receipt = services
                        .inventory
                        .record_transaction(new_transaction(
                            clinic.id,
                            drug.id,
                            batch.id,
                            TransactionType::Adjustment,
                            *delta,
                        ))
                        .await
                        .expect("record transaction");
                    expected += delta;
                    assert_eq!(receipt.balance_after, expected);
                }

                let balance = current_balance(&db, clinic.id, drug.id, batch.id)
                    .await
                    .expect("balance row");
                assert_eq!(balance, expected);
            });
        }
    }
}
