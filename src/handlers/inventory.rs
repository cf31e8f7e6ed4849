use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use sea_orm::EntityTrait;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{self, Capability, CredentialPolicy};
use crate::entities::{
    clinic_inventory, drug_batch,
    inventory_transaction::{self, ReferenceType, TransactionType},
};
use crate::errors::ServiceError;
use crate::services::dispensing::{DispenseOutcome, NewDispense};
use crate::services::inventory::{
    LedgerReceipt, NewBatch, NewTransaction, ReconciliationReport, TransactionFilters,
};
use crate::{ApiResponse, AppState};

pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/inventory/transactions",
            get(list_transactions)
                .post(record_transaction)
                .patch(update_transaction_metadata),
        )
        .route("/inventory/balances", get(list_balances))
        .route("/inventory/batches", post(receive_batch))
        .route("/inventory/recount", post(recount))
        .route("/inventory/reconciliation", get(reconciliation_report))
        .route("/dispensing", post(dispense))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordTransactionRequest {
    pub clinic_id: Uuid,
    pub drug_id: Uuid,
    pub batch_id: Uuid,
    pub transaction_type: TransactionType,
    pub quantity: i32,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
    pub reason: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReceiveBatchRequest {
    pub clinic_id: Uuid,
    pub drug_id: Uuid,
    pub batch_number: String,
    pub expiry_date: DateTime<Utc>,
    pub manufacture_date: Option<DateTime<Utc>>,
    pub quantity_received: i32,
    pub supplier_name: Option<String>,
    pub purchase_price: Option<f64>,
    pub purchase_currency: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecountRequest {
    pub clinic_id: Uuid,
    pub drug_id: Uuid,
    pub batch_id: Uuid,
    pub counted_quantity: i32,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTransactionMetadataRequest {
    pub id: Uuid,
    pub reason: Option<String>,
    pub reference_type: Option<ReferenceType>,
    pub reference_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TransactionListQuery {
    pub clinic_id: Uuid,
    pub drug_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ClinicQuery {
    pub clinic_id: Uuid,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReconciliationQuery {
    pub clinic_id: Option<Uuid>,
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/transactions",
    request_body = RecordTransactionRequest,
    responses(
        (status = 200, description = "Movement appended to the ledger", body = ApiResponse<LedgerReceipt>),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn record_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RecordTransactionRequest>,
) -> Result<Json<ApiResponse<LedgerReceipt>>, ServiceError> {
    let user = auth::authenticate_request(
        &state.db,
        &state.config,
        &headers,
        CredentialPolicy::TokenOrBasic,
    )
    .await?;
    auth::require_clinic_capability(
        &state.db,
        &user,
        body.clinic_id,
        Capability::ManageInventory,
    )
    .await?;

    let receipt = state
        .services
        .inventory
        .record_transaction(NewTransaction {
            id: None,
            clinic_id: body.clinic_id,
            drug_id: body.drug_id,
            batch_id: body.batch_id,
            transaction_type: body.transaction_type,
            quantity: body.quantity,
            reference: body.reference_type.zip(body.reference_id),
            reason: body.reason,
            performed_by: Some(user.id),
            timestamp: body.timestamp,
        })
        .await?;

    Ok(Json(ApiResponse::success(receipt)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/transactions",
    params(TransactionListQuery),
    responses(
        (status = 200, description = "Ledger entries, newest first"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TransactionListQuery>,
) -> Result<Json<ApiResponse<Vec<inventory_transaction::Model>>>, ServiceError> {
    let user = auth::authenticate_request(
        &state.db,
        &state.config,
        &headers,
        CredentialPolicy::TokenOrBasic,
    )
    .await?;
    auth::require_clinic_capability(&state.db, &user, query.clinic_id, Capability::ViewReports)
        .await?;

    let rows = state
        .services
        .inventory
        .list_transactions(
            query.clinic_id,
            TransactionFilters {
                drug_id: query.drug_id,
                transaction_type: query.transaction_type,
                start: query.start,
                end: query.end,
                limit: query.limit,
                offset: query.offset,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(rows)))
}

pub async fn update_transaction_metadata(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UpdateTransactionMetadataRequest>,
) -> Result<Json<ApiResponse<()>>, ServiceError> {
    let user = auth::authenticate_request(
        &state.db,
        &state.config,
        &headers,
        CredentialPolicy::TokenOrBasic,
    )
    .await?;

    // The transaction's own clinic scopes the capability check.
    let row = crate::entities::inventory_transaction::Entity::find_by_id(body.id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("transaction {} not found", body.id)))?;
    auth::require_clinic_capability(&state.db, &user, row.clinic_id, Capability::ManageInventory)
        .await?;

    state
        .services
        .inventory
        .update_transaction_metadata(body.id, body.reason, body.reference_type.zip(body.reference_id))
        .await?;

    Ok(Json(ApiResponse::success(())))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/balances",
    params(ClinicQuery),
    responses(
        (status = 200, description = "Current balances for the clinic"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_balances(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ClinicQuery>,
) -> Result<Json<ApiResponse<Vec<clinic_inventory::Model>>>, ServiceError> {
    let user = auth::authenticate_request(
        &state.db,
        &state.config,
        &headers,
        CredentialPolicy::TokenOrBasic,
    )
    .await?;
    auth::require_clinic_capability(&state.db, &user, query.clinic_id, Capability::ViewReports)
        .await?;

    let rows = state.services.inventory.balances(query.clinic_id).await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    post,
    path = "/api/v1/inventory/batches",
    request_body = ReceiveBatchRequest,
    responses(
        (status = 200, description = "Batch created and stock received"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn receive_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ReceiveBatchRequest>,
) -> Result<Json<ApiResponse<drug_batch::Model>>, ServiceError> {
    let user = auth::authenticate_request(
        &state.db,
        &state.config,
        &headers,
        CredentialPolicy::TokenOrBasic,
    )
    .await?;
    auth::require_clinic_capability(
        &state.db,
        &user,
        body.clinic_id,
        Capability::ManageInventory,
    )
    .await?;

    let (batch, _receipt) = state
        .services
        .inventory
        .receive_batch(NewBatch {
            drug_id: body.drug_id,
            clinic_id: body.clinic_id,
            batch_number: body.batch_number,
            expiry_date: body.expiry_date,
            manufacture_date: body.manufacture_date,
            quantity_received: body.quantity_received,
            supplier_name: body.supplier_name,
            purchase_price: body.purchase_price,
            purchase_currency: body.purchase_currency,
            recorded_by_user_id: Some(user.id),
            notes: body.notes,
        })
        .await?;

    Ok(Json(ApiResponse::success(batch)))
}

pub async fn recount(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RecountRequest>,
) -> Result<Json<ApiResponse<Option<LedgerReceipt>>>, ServiceError> {
    let user = auth::authenticate_request(
        &state.db,
        &state.config,
        &headers,
        CredentialPolicy::TokenOrBasic,
    )
    .await?;
    auth::require_clinic_capability(
        &state.db,
        &user,
        body.clinic_id,
        Capability::ManageInventory,
    )
    .await?;

    let receipt = state
        .services
        .inventory
        .recount(
            body.clinic_id,
            body.drug_id,
            body.batch_id,
            body.counted_quantity,
            Some(user.id),
            body.reason,
        )
        .await?;

    Ok(Json(ApiResponse::success(receipt)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/reconciliation",
    params(ReconciliationQuery),
    responses(
        (status = 200, description = "Auto-created batches, negative balances, flagged ledger entries"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn reconciliation_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReconciliationQuery>,
) -> Result<Json<ApiResponse<ReconciliationReport>>, ServiceError> {
    let user = auth::authenticate_request(
        &state.db,
        &state.config,
        &headers,
        CredentialPolicy::TokenOrBasic,
    )
    .await?;
    match query.clinic_id {
        Some(clinic_id) => {
            auth::require_clinic_capability(&state.db, &user, clinic_id, Capability::ViewReports)
                .await?
        }
        None => {
            auth::require_any_clinic_capability(&state.db, &user, Capability::ViewReports).await?
        }
    }

    let report = state
        .services
        .inventory
        .reconciliation_report(query.clinic_id)
        .await?;

    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    post,
    path = "/api/v1/dispensing",
    request_body = NewDispense,
    responses(
        (status = 200, description = "Medication dispensed; inventory healed and deducted"),
        (status = 400, description = "Validation failure", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "dispensing"
)]
pub async fn dispense(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewDispense>,
) -> Result<Json<ApiResponse<DispenseOutcome>>, ServiceError> {
    let user = auth::authenticate_request(
        &state.db,
        &state.config,
        &headers,
        CredentialPolicy::TokenOrBasic,
    )
    .await?;
    auth::require_clinic_capability(
        &state.db,
        &user,
        body.clinic_id,
        Capability::ManageInventory,
    )
    .await?;

    let outcome = state.services.dispensing.dispense(body).await?;
    Ok(Json(ApiResponse::success(outcome)))
}
