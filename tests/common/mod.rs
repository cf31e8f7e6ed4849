#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use carebase_api::db;
use carebase_api::entities::{
    clinic, dispensing_record, drug, drug_batch, patient, user, user_clinic_permission,
};
use carebase_api::events::EventSender;
use carebase_api::services::AppServices;

/// Fresh in-memory database with the full schema applied. The pool is pinned
/// to a single connection so every session shares the same SQLite instance.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let pool = db::establish_connection("sqlite::memory:")
        .await
        .expect("db connect");
    db::run_migrations(&pool).await.expect("migrations");
    Arc::new(pool)
}

pub fn build_services(db: Arc<DatabaseConnection>) -> AppServices {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(carebase_api::events::process_events(rx));
    AppServices::new(db, EventSender::new(tx))
}

pub async fn seed_clinic(db: &DatabaseConnection, name: &str) -> clinic::Model {
    let now = Utc::now();
    clinic::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        last_modified: Set(now),
        server_created_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed clinic")
}

pub async fn seed_drug(db: &DatabaseConnection, generic_name: &str) -> drug::Model {
    let now = Utc::now();
    drug::ActiveModel {
        id: Set(Uuid::new_v4()),
        generic_name: Set(generic_name.to_string()),
        brand_name: Set(None),
        form: Set(Some("tablet".to_string())),
        route: Set(Some("oral".to_string())),
        dosage_quantity: Set(Some(500.0)),
        dosage_units: Set(Some("mg".to_string())),
        sale_price: Set(None),
        sale_currency: Set(None),
        is_controlled: Set(false),
        requires_refrigeration: Set(false),
        metadata: Set(serde_json::json!({})),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        last_modified: Set(now),
        server_created_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed drug")
}

pub async fn seed_batch(
    db: &DatabaseConnection,
    drug_id: Uuid,
    batch_number: &str,
    quantity: i32,
) -> drug_batch::Model {
    let now = Utc::now();
    drug_batch::ActiveModel {
        id: Set(Uuid::new_v4()),
        drug_id: Set(drug_id),
        batch_number: Set(batch_number.to_string()),
        expiry_date: Set(now + Duration::days(180)),
        manufacture_date: Set(None),
        quantity_received: Set(quantity),
        quantity_remaining: Set(quantity),
        supplier_name: Set(None),
        purchase_price: Set(None),
        purchase_currency: Set("USD".to_string()),
        received_date: Set(now),
        is_quarantined: Set(false),
        recorded_by_user_id: Set(None),
        metadata: Set(serde_json::json!({})),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        last_modified: Set(now),
        server_created_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed batch")
}

/// User with a known password and the given capabilities on a clinic.
pub async fn seed_user(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
    clinic_id: Uuid,
    can_sync: bool,
    can_manage_inventory: bool,
) -> user::Model {
    let now = Utc::now();
    let seeded = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set("Test Clinician".to_string()),
        email: Set(email.to_string()),
        hashed_password: Set(carebase_api::auth::hash_password(password).expect("hash")),
        role: Set("provider".to_string()),
        clinic_id: Set(Some(clinic_id)),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        last_modified: Set(now),
        server_created_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed user");

    user_clinic_permission::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(seeded.id),
        clinic_id: Set(clinic_id),
        can_manage_inventory: Set(can_manage_inventory),
        can_view_reports: Set(true),
        can_sync: Set(can_sync),
        is_clinic_admin: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("seed permissions");

    seeded
}

/// Patient row with explicit sync timestamps, for exercising the watermark
/// split in pull.
pub async fn seed_patient_at(
    db: &DatabaseConnection,
    given_name: &str,
    server_created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
) -> patient::Model {
    let now = Utc::now();
    patient::ActiveModel {
        id: Set(Uuid::new_v4()),
        given_name: Set(Some(given_name.to_string())),
        surname: Set(Some("Diallo".to_string())),
        date_of_birth: Set(None),
        sex: Set(None),
        citizenship: Set(None),
        phone: Set(None),
        primary_clinic_id: Set(None),
        government_id: Set(None),
        external_patient_id: Set(None),
        photo_url: Set(None),
        metadata: Set(serde_json::json!({})),
        is_deleted: Set(false),
        deleted_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        last_modified: Set(last_modified),
        server_created_at: Set(server_created_at),
    }
    .insert(db)
    .await
    .expect("seed patient")
}

/// Full patient row as a push payload, the way a mobile client would send it.
pub fn patient_payload(id: Uuid, given_name: &str) -> serde_json::Value {
    let now = Utc::now();
    serde_json::json!({
        "id": id,
        "given_name": given_name,
        "surname": "Diallo",
        "date_of_birth": null,
        "sex": "female",
        "citizenship": null,
        "phone": null,
        "primary_clinic_id": null,
        "government_id": null,
        "external_patient_id": null,
        "photo_url": null,
        "metadata": {},
        "is_deleted": false,
        "deleted_at": null,
        "created_at": now.to_rfc3339(),
        "updated_at": now.to_rfc3339(),
        "last_modified": now.to_rfc3339(),
        "server_created_at": now.to_rfc3339(),
    })
}

/// Dispensing record as pushed from a mobile client, batch reference left to
/// the caller.
pub fn dispensing_payload(
    id: Uuid,
    clinic_id: Uuid,
    drug_id: Uuid,
    batch_id: Option<Uuid>,
    quantity: i32,
) -> serde_json::Value {
    let record = dispensing_record::Model {
        id,
        clinic_id,
        drug_id,
        batch_id,
        prescription_item_id: None,
        patient_id: Uuid::new_v4(),
        quantity_dispensed: quantity,
        dosage_instructions: None,
        days_supply: None,
        dispensed_by: Uuid::new_v4(),
        dispensed_at: Utc::now(),
        recorded_by_user_id: None,
        metadata: serde_json::json!({}),
        is_deleted: false,
        deleted_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        last_modified: Utc::now(),
        server_created_at: Utc::now(),
    };
    serde_json::to_value(record).expect("serializable record")
}
