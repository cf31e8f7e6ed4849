mod common;

use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use carebase_api::entities::{clinic_inventory, dispensing_record, drug_batch, patient};
use carebase_api::sync::{pull_changes, EntityDelta, PushRequest};

use common::{
    build_services, dispensing_payload, patient_payload, seed_batch, seed_clinic, seed_drug,
    seed_patient_at, setup_db,
};

fn ids_of(rows: &[JsonValue]) -> Vec<String> {
    rows.iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn pull_splits_created_updated_deleted_by_watermark() {
    let db = setup_db().await;

    let watermark = Utc::now();
    let before = watermark - Duration::minutes(10);
    let after = watermark + Duration::minutes(5);

    // Existed before the watermark, modified after: updated.
    let modified = seed_patient_at(&db, "Amara", before, after).await;
    // Created after the watermark: created.
    let created = seed_patient_at(&db, "Binta", after, after).await;
    // Untouched since before the watermark: absent.
    let untouched = seed_patient_at(&db, "Chidi", before, before).await;
    // Soft-deleted after the watermark: deleted.
    let deleted = seed_patient_at(&db, "Didier", before, after).await;
    let mut active: patient::ActiveModel = deleted.clone().into();
    active.is_deleted = Set(true);
    active.deleted_at = Set(Some(after));
    active.update(db.as_ref()).await.unwrap();

    let changes = pull_changes(&db, Some(watermark)).await.unwrap();
    let delta = changes.get("patients").expect("patients delta present");

    assert_eq!(ids_of(&delta.created), vec![created.id.to_string()]);
    assert_eq!(ids_of(&delta.updated), vec![modified.id.to_string()]);
    assert_eq!(delta.deleted, vec![deleted.id.to_string()]);

    let all_ids: Vec<String> = ids_of(&delta.created)
        .into_iter()
        .chain(ids_of(&delta.updated))
        .collect();
    assert!(!all_ids.contains(&untouched.id.to_string()));
}

/// Documented contract: a row created and soft-deleted between two pulls
/// surfaces only as a deletion, never as a create the client must
/// immediately discard.
#[tokio::test]
async fn created_then_deleted_in_one_window_surfaces_as_deleted_only() {
    let db = setup_db().await;

    let watermark = Utc::now();
    let after = watermark + Duration::minutes(5);

    let ghost = seed_patient_at(&db, "Ephemeral", after, after).await;
    let mut active: patient::ActiveModel = ghost.clone().into();
    active.is_deleted = Set(true);
    active.deleted_at = Set(Some(after + Duration::minutes(1)));
    active.update(db.as_ref()).await.unwrap();

    let changes = pull_changes(&db, Some(watermark)).await.unwrap();
    let delta = changes.get("patients").unwrap();

    assert!(delta.created.is_empty());
    assert!(delta.updated.is_empty());
    assert_eq!(delta.deleted, vec![ghost.id.to_string()]);
}

#[tokio::test]
async fn always_push_entities_return_the_full_table_every_pull() {
    let db = setup_db().await;

    let clinic_a = seed_clinic(&db, "Clinic A").await;
    let clinic_b = seed_clinic(&db, "Clinic B").await;

    // Watermark far in the future: ordinary entities would ship nothing.
    let watermark = Utc::now() + Duration::hours(1);
    let changes = pull_changes(&db, Some(watermark)).await.unwrap();

    let clinics = changes.get("clinics").expect("clinics delta present");
    let mut ids = ids_of(&clinics.updated);
    ids.sort();
    let mut expected = vec![clinic_a.id.to_string(), clinic_b.id.to_string()];
    expected.sort();
    assert_eq!(ids, expected, "every row ships regardless of the watermark");
    assert!(clinics.created.is_empty());

    let patients = changes.get("patients").unwrap();
    assert!(patients.created.is_empty() && patients.updated.is_empty());
}

#[tokio::test]
async fn server_only_entities_never_appear_in_pull_output() {
    let db = setup_db().await;

    let changes = pull_changes(&db, None).await.unwrap();
    assert!(!changes.contains_key("users"));
    assert!(!changes.contains_key("inventory_transactions"));

    // Mobile-visible participants are all present, even when empty.
    for key in [
        "patients",
        "clinics",
        "visits",
        "events",
        "appointments",
        "prescriptions",
        "drug_batches",
        "clinic_inventory",
        "dispensing_records",
    ] {
        assert!(changes.contains_key(key), "missing {}", key);
    }
}

#[tokio::test]
async fn push_upserts_are_idempotent() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let patient_id = Uuid::new_v4();
    let payload = patient_payload(patient_id, "Fatou");

    let mut request = PushRequest::new();
    request.insert(
        "patients".to_string(),
        EntityDelta {
            created: vec![payload.clone()],
            updated: vec![],
            deleted: vec![],
        },
    );

    let first = services
        .sync
        .push(request.clone(), Uuid::new_v4())
        .await
        .unwrap();
    assert!(first.is_success());

    // Same payload again: no duplicate rows, same final state.
    let second = services.sync.push(request, Uuid::new_v4()).await.unwrap();
    assert!(second.is_success());

    let rows = patient::Entity::find()
        .filter(patient::Column::Id.eq(patient_id))
        .all(db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].given_name.as_deref(), Some("Fatou"));

    // Last write wins: a newer payload simply overwrites.
    let mut request = PushRequest::new();
    request.insert(
        "patients".to_string(),
        EntityDelta {
            created: vec![],
            updated: vec![patient_payload(patient_id, "Fatoumata")],
            deleted: vec![],
        },
    );
    services.sync.push(request, Uuid::new_v4()).await.unwrap();

    let row = patient::Entity::find_by_id(patient_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.given_name.as_deref(), Some("Fatoumata"));
}

#[tokio::test]
async fn push_soft_deletes_are_idempotent() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let existing = seed_patient_at(&db, "Gone", Utc::now(), Utc::now()).await;

    let mut request = PushRequest::new();
    request.insert(
        "patients".to_string(),
        EntityDelta {
            created: vec![],
            updated: vec![],
            deleted: vec![existing.id.to_string()],
        },
    );

    for _ in 0..2 {
        let report = services
            .sync
            .push(request.clone(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(report.is_success());
    }

    let row = patient::Entity::find_by_id(existing.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(row.is_deleted);
    assert!(row.deleted_at.is_some());
}

#[tokio::test]
async fn always_push_entities_reject_client_writes() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Target Clinic").await;
    let drug = seed_drug(&db, "amoxicillin").await;
    let batch = seed_batch(&db, drug.id, "AMX-P", 10).await;

    // A forged balance row the client should never be able to write.
    let forged = serde_json::json!({
        "id": Uuid::new_v4(),
        "clinic_id": clinic.id,
        "drug_id": drug.id,
        "batch_id": batch.id,
        "quantity_available": 9999,
        "reserved_quantity": 0,
        "batch_number": null,
        "batch_expiry_date": null,
        "last_counted_at": null,
        "recorded_by_user_id": null,
        "metadata": {},
    });

    let mut request = PushRequest::new();
    request.insert(
        "clinic_inventory".to_string(),
        EntityDelta {
            created: vec![forged],
            updated: vec![],
            deleted: vec![],
        },
    );
    // A legitimate batch for another entity in the same push.
    let patient_id = Uuid::new_v4();
    request.insert(
        "patients".to_string(),
        EntityDelta {
            created: vec![patient_payload(patient_id, "Halima")],
            updated: vec![],
            deleted: vec![],
        },
    );

    let report = services.sync.push(request, Uuid::new_v4()).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entity, "clinic_inventory");
    assert_eq!(report.applied, vec!["patients".to_string()]);

    // The rejected batch wrote nothing.
    let count = clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::QuantityAvailable.eq(9999))
        .count(db.as_ref())
        .await
        .unwrap();
    assert_eq!(count, 0);

    // The accepted batch landed.
    assert!(patient::Entity::find_by_id(patient_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn unknown_entities_fail_without_blocking_others() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let patient_id = Uuid::new_v4();
    let mut request = PushRequest::new();
    request.insert(
        "starships".to_string(),
        EntityDelta {
            created: vec![serde_json::json!({"id": Uuid::new_v4()})],
            updated: vec![],
            deleted: vec![],
        },
    );
    request.insert(
        "patients".to_string(),
        EntityDelta {
            created: vec![patient_payload(patient_id, "Idrissa")],
            updated: vec![],
            deleted: vec![],
        },
    );

    let report = services.sync.push(request, Uuid::new_v4()).await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entity, "starships");
    assert!(report.applied.contains(&"patients".to_string()));
}

#[tokio::test]
async fn a_failing_record_rolls_back_its_whole_entity_batch() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let good = patient_payload(Uuid::new_v4(), "Valid");
    let bad = serde_json::json!({"given_name": "No Id At All"});

    let mut request = PushRequest::new();
    request.insert(
        "patients".to_string(),
        EntityDelta {
            created: vec![good, bad],
            updated: vec![],
            deleted: vec![],
        },
    );

    let report = services.sync.push(request, Uuid::new_v4()).await.unwrap();
    assert!(!report.is_success());

    let count = patient::Entity::find().count(db.as_ref()).await.unwrap();
    assert_eq!(count, 0, "entity batch is atomic");
}

/// New dispensing records arriving through sync behave exactly like direct
/// inserts: the auto-healing resolver runs and stock is deducted.
#[tokio::test]
async fn pushed_dispensing_records_run_the_resolver() {
    let db = setup_db().await;
    let services = build_services(db.clone());

    let clinic = seed_clinic(&db, "Sync Clinic").await;
    let drug = seed_drug(&db, "rifampicin").await;

    let record_id = Uuid::new_v4();
    let mut request = PushRequest::new();
    request.insert(
        "dispensing_records".to_string(),
        EntityDelta {
            created: vec![dispensing_payload(record_id, clinic.id, drug.id, None, 6)],
            updated: vec![],
            deleted: vec![],
        },
    );

    let report = services.sync.push(request, Uuid::new_v4()).await.unwrap();
    assert!(report.is_success(), "failed: {:?}", report.failed);

    let record = dispensing_record::Entity::find_by_id(record_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .expect("record landed");
    let batch_id = record.batch_id.expect("resolver assigned a batch");

    let batch = drug_batch::Entity::find_by_id(batch_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(batch.batch_number.starts_with("UNTRACKED-"));

    let balance = clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::BatchId.eq(batch_id))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.quantity_available, -6);

    // Replaying the same push must not deduct twice: the record now exists,
    // so the second application is a plain upsert.
    let mut replay = PushRequest::new();
    replay.insert(
        "dispensing_records".to_string(),
        EntityDelta {
            created: vec![dispensing_payload(record_id, clinic.id, drug.id, Some(batch_id), 6)],
            updated: vec![],
            deleted: vec![],
        },
    );
    let report = services.sync.push(replay, Uuid::new_v4()).await.unwrap();
    assert!(report.is_success());

    let balance = clinic_inventory::Entity::find()
        .filter(clinic_inventory::Column::BatchId.eq(batch_id))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(balance.quantity_available, -6, "no double deduction");
}

#[tokio::test]
async fn second_pull_with_new_watermark_is_quiet_for_ordinary_entities() {
    let db = setup_db().await;

    seed_patient_at(&db, "Khady", Utc::now(), Utc::now()).await;
    seed_clinic(&db, "Steady Clinic").await;

    let first = pull_changes(&db, None).await.unwrap();
    assert_eq!(first.get("patients").unwrap().created.len(), 1);

    let next_watermark = Utc::now() + Duration::seconds(1);
    let second = pull_changes(&db, Some(next_watermark)).await.unwrap();

    let patients = second.get("patients").unwrap();
    assert!(patients.created.is_empty() && patients.updated.is_empty());

    // Always-push tables still ship in full.
    assert_eq!(second.get("clinics").unwrap().updated.len(), 1);
}
