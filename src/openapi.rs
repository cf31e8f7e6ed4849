use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Carebase API",
        version = "0.3.0",
        description = r#"
Backend for the Carebase clinic platform.

## Sync

Offline-first mobile clients exchange data through the `/api/sync` family of
endpoints: `GET` pulls every change since the client-held `last_pulled_at`
watermark, `POST` pushes client-side created/updated/deleted records per
entity. `/api/v2/sync` additionally accepts Bearer tokens; the legacy
`/api/sync` and `/v1/api/sync` paths speak Basic auth and are served
indefinitely for fielded clients.

## Inventory

Stock movements are an append-only ledger (`inventory_transactions`) with a
materialized balance per clinic, drug and batch (`clinic_inventory`).
Dispensing never fails on missing batch data: the resolver fabricates
clearly-tagged placeholder rows and queues them for back-office
reconciliation.

## Authentication

`POST /api/v1/auth/login` exchanges email/password for a Bearer token:

```
Authorization: Bearer <token>
```
"#
    ),
    paths(
        crate::handlers::sync::pull_v2,
        crate::handlers::sync::push_v2,
        crate::handlers::auth::login,
        crate::handlers::inventory::record_transaction,
        crate::handlers::inventory::list_transactions,
        crate::handlers::inventory::list_balances,
        crate::handlers::inventory::receive_batch,
        crate::handlers::inventory::reconciliation_report,
        crate::handlers::inventory::dispense,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::sync::EntityDelta,
        crate::sync::PushFailure,
        crate::handlers::sync::PullResponse,
        crate::handlers::sync::PushResponse,
        crate::handlers::auth::LoginRequest,
        crate::handlers::auth::LoginResponse,
        crate::handlers::auth::UserSummary,
        crate::handlers::inventory::RecordTransactionRequest,
        crate::handlers::inventory::ReceiveBatchRequest,
        crate::handlers::inventory::RecountRequest,
        crate::services::inventory::LedgerReceipt,
        crate::services::dispensing::NewDispense,
        crate::entities::inventory_transaction::TransactionType,
        crate::entities::inventory_transaction::ReferenceType,
    )),
    tags(
        (name = "sync", description = "Offline-first delta synchronization"),
        (name = "inventory", description = "Ledger, balances and reconciliation"),
        (name = "dispensing", description = "Dispensing with auto-healing inventory deduction"),
        (name = "auth", description = "Credential exchange")
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at /docs, spec at /api-docs/openapi.json.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
