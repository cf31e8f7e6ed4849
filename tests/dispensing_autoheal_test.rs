mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use carebase_api::entities::{
    clinic_inventory, dispensing_record, drug_batch, drug_batch::BatchProvenance,
    inventory_transaction,
};
use carebase_api::errors::ServiceError;
use carebase_api::services::dispensing::NewDispense;

use common::{build_services, seed_batch, seed_clinic, seed_drug, setup_db};

fn dispense_of(clinic_id: Uuid, drug_id: Uuid, quantity: i32) -> NewDispense {
    NewDispense {
        id: None,
        clinic_id,
        drug_id,
        batch_id: None,
        prescription_item_id: None,
        patient_id: Uuid::new_v4(),
        quantity_dispensed: quantity,
        dosage_instructions: Some("1 tablet twice daily".to_string()),
        days_supply: Some(5),
        dispensed_by: Uuid::new_v4(),
        dispensed_at: None,
        recorded_by_user_id: None,
    }
}

#[tokio::test]
async fn null_batch_with_no_batches_fabricates_untracked() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Field Clinic").await;
    let drug = seed_drug(&db, "artemether").await;

    let outcome = services
        .dispensing
        .dispense(dispense_of(clinic.id, drug.id, 5))
        .await
        .expect("dispensing must never block on missing batch data");

    assert!(outcome.batch_auto_created);
    assert!(outcome.reconciliation_flagged);
    assert_eq!(outcome.balance_after, -5);
    assert_eq!(outcome.record.batch_id, Some(outcome.batch_id));

    let batch = drug_batch::Entity::find_by_id(outcome.batch_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .expect("fabricated batch exists");
    assert!(batch.batch_number.starts_with(&format!("UNTRACKED-{}-", drug.id)));
    assert_eq!(batch.quantity_received, 5);
    assert_eq!(batch.quantity_remaining, -5);
    assert!(batch.expiry_date > Utc::now() + Duration::days(360));

    assert_matches!(
        batch.provenance(),
        BatchProvenance::AutoCreated { reason, dispensing_record_id }
            if reason == "batch_id was null during dispensing"
                && dispensing_record_id == Some(outcome.record.id)
    );

    let inventory = clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::BatchId.eq(outcome.batch_id))
        .one(db.as_ref())
        .await
        .unwrap()
        .expect("balance row created");
    assert_eq!(inventory.quantity_available, -5);
    assert_eq!(inventory.clinic_id, clinic.id);

    let transaction = inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::ReferenceId.eq(outcome.record.id))
        .one(db.as_ref())
        .await
        .unwrap()
        .expect("ledger entry created");
    assert_eq!(transaction.transaction_type, "dispensed");
    assert_eq!(transaction.quantity, -5);
    assert_eq!(transaction.balance_after, -5);
    assert!(transaction
        .reason
        .as_deref()
        .unwrap()
        .contains("RECONCILIATION NEEDED"));
}

#[tokio::test]
async fn dangling_batch_reference_is_recovered_under_same_id() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Field Clinic").await;
    let drug = seed_drug(&db, "quinine").await;

    let dangling = Uuid::new_v4();
    let mut new = dispense_of(clinic.id, drug.id, 3);
    new.batch_id = Some(dangling);

    let outcome = services.dispensing.dispense(new).await.expect("heals");

    assert_eq!(outcome.batch_id, dangling, "the referenced id becomes real");
    let batch = drug_batch::Entity::find_by_id(dangling)
        .one(db.as_ref())
        .await
        .unwrap()
        .expect("recovered batch exists");
    assert_eq!(batch.batch_number, format!("RECOVERED-{}", dangling));
    assert_matches!(
        batch.provenance(),
        BatchProvenance::AutoCreated { reason, .. }
            if reason == "batch referenced but did not exist"
    );

    let inventory = clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::BatchId.eq(dangling))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inventory.quantity_available, -3);
}

#[tokio::test]
async fn null_batch_adopts_the_latest_expiring_existing_batch() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Main Clinic").await;
    let drug = seed_drug(&db, "omeprazole").await;
    let older = seed_batch(&db, drug.id, "OMP-OLD", 40).await;
    let newer = seed_batch(&db, drug.id, "OMP-NEW", 40).await;

    // Push the second batch's expiry past the first.
    use sea_orm::{ActiveModelTrait, Set};
    let mut newer_active: drug_batch::ActiveModel = newer.clone().into();
    newer_active.expiry_date = Set(older.expiry_date + Duration::days(90));
    newer_active.update(db.as_ref()).await.unwrap();

    let outcome = services
        .dispensing
        .dispense(dispense_of(clinic.id, drug.id, 10))
        .await
        .unwrap();

    assert_eq!(outcome.batch_id, newer.id, "latest expiry wins");
    assert!(!outcome.batch_auto_created);

    let batch = drug_batch::Entity::find_by_id(newer.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.quantity_remaining, 30);
    assert_matches!(batch.provenance(), BatchProvenance::Manual);
}

#[tokio::test]
async fn stocked_dispense_stays_unflagged() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Main Clinic").await;
    let drug = seed_drug(&db, "amoxicillin").await;
    let batch = seed_batch(&db, drug.id, "AMX-9", 20).await;

    // Stock the clinic first.
    services
        .inventory
        .record_transaction(carebase_api::services::inventory::NewTransaction {
            id: None,
            clinic_id: clinic.id,
            drug_id: drug.id,
            batch_id: batch.id,
            transaction_type:
                carebase_api::entities::inventory_transaction::TransactionType::Received,
            quantity: 20,
            reference: None,
            reason: None,
            performed_by: None,
            timestamp: None,
        })
        .await
        .unwrap();

    let mut new = dispense_of(clinic.id, drug.id, 5);
    new.batch_id = Some(batch.id);
    let outcome = services.dispensing.dispense(new).await.unwrap();

    assert_eq!(outcome.balance_after, 15);
    assert!(!outcome.reconciliation_flagged);
    assert!(!outcome.batch_auto_created);

    let transaction = inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::ReferenceId.eq(outcome.record.id))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        transaction.reason.as_deref(),
        Some("Medication dispensed to patient")
    );
}

/// The §4.2 invariant: whatever batch_id the caller supplied, afterwards
/// there is exactly one batch under the resolved id, exactly one balance row
/// for the triple, and exactly one ledger entry referencing the record.
#[tokio::test]
async fn exactly_one_of_each_derived_record() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Edge Clinic").await;
    let drug = seed_drug(&db, "diazepam").await;

    for batch_id in [None, Some(Uuid::new_v4())] {
        let mut new = dispense_of(clinic.id, drug.id, 2);
        new.batch_id = batch_id;
        let outcome = services.dispensing.dispense(new).await.unwrap();

        let record = dispensing_record::Entity::find_by_id(outcome.record.id)
            .one(db.as_ref())
            .await
            .unwrap()
            .unwrap();
        let resolved = record.batch_id.expect("resolved batch id is non-null");

        let batches = drug_batch::Entity::find()
            .filter(drug_batch::Column::Id.eq(resolved))
            .count(db.as_ref())
            .await
            .unwrap();
        assert_eq!(batches, 1);

        let balances = clinic_inventory::Entity::find()
            .filter(clinic_inventory::Column::ClinicId.eq(clinic.id))
            .filter(clinic_inventory::Column::DrugId.eq(drug.id))
            .filter(clinic_inventory::Column::BatchId.eq(resolved))
            .count(db.as_ref())
            .await
            .unwrap();
        assert_eq!(balances, 1);

        let ledger_entries = inventory_transaction::Entity::find()
            .filter(inventory_transaction::Column::ReferenceId.eq(record.id))
            .count(db.as_ref())
            .await
            .unwrap();
        assert_eq!(ledger_entries, 1);
    }
}

#[tokio::test]
async fn concurrent_dispenses_never_lose_updates() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Busy Clinic").await;
    let drug = seed_drug(&db, "insulin").await;
    let batch = seed_batch(&db, drug.id, "INS-1", 8).await;

    services
        .inventory
        .record_transaction(carebase_api::services::inventory::NewTransaction {
            id: None,
            clinic_id: clinic.id,
            drug_id: drug.id,
            batch_id: batch.id,
            transaction_type:
                carebase_api::entities::inventory_transaction::TransactionType::Received,
            quantity: 8,
            reference: None,
            reason: None,
            performed_by: None,
            timestamp: None,
        })
        .await
        .unwrap();

    // Two concurrent dispenses of 10 against a starting balance of 8: the
    // final balance must be exactly -12, never -2 from a lost update.
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let services = services.clone();
        let clinic_id = clinic.id;
        let drug_id = drug.id;
        let batch_id = batch.id;
        tasks.push(tokio::spawn(async move {
            let mut new = dispense_of(clinic_id, drug_id, 10);
            new.batch_id = Some(batch_id);
            services.dispensing.dispense(new).await
        }));
    }

    for task in tasks {
        task.await.unwrap().expect("both dispenses succeed");
    }

    let row = clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::BatchId.eq(batch.id))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.quantity_available, -12);

    let quantities: i32 = inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::BatchId.eq(batch.id))
        .all(db.as_ref())
        .await
        .unwrap()
        .iter()
        .map(|t| t.quantity)
        .sum();
    assert_eq!(quantities, -12);
}

#[tokio::test]
async fn own_field_validation_still_applies() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Main Clinic").await;
    let drug = seed_drug(&db, "aspirin").await;

    let mut new = dispense_of(clinic.id, drug.id, 0);
    new.batch_id = None;
    let err = services.dispensing.dispense(new).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let count = dispensing_record::Entity::find()
        .count(db.as_ref())
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn reconciliation_report_surfaces_healed_records() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Field Clinic").await;
    let drug = seed_drug(&db, "artesunate").await;

    let outcome = services
        .dispensing
        .dispense(dispense_of(clinic.id, drug.id, 4))
        .await
        .unwrap();

    let report = services
        .inventory
        .reconciliation_report(Some(clinic.id))
        .await
        .unwrap();

    assert!(report
        .auto_created_batches
        .iter()
        .any(|b| b.id == outcome.batch_id));
    assert!(report
        .negative_balances
        .iter()
        .any(|row| row.batch_id == outcome.batch_id && row.quantity_available == -4));
    assert!(report
        .flagged_transactions
        .iter()
        .any(|t| t.reference_id == Some(outcome.record.id)));
}
