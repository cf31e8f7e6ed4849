pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_identity_tables;
mod m20250301_000002_create_clinical_tables;
mod m20250315_000003_create_prescription_tables;
mod m20250402_000004_create_drug_catalogue_tables;
mod m20250402_000005_create_inventory_tables;
mod m20250420_000006_create_dispensing_records_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_identity_tables::Migration),
            Box::new(m20250301_000002_create_clinical_tables::Migration),
            Box::new(m20250315_000003_create_prescription_tables::Migration),
            Box::new(m20250402_000004_create_drug_catalogue_tables::Migration),
            Box::new(m20250402_000005_create_inventory_tables::Migration),
            Box::new(m20250420_000006_create_dispensing_records_table::Migration),
        ]
    }
}

/// Columns every mobile-syncable table carries. The delta extractor keys off
/// `last_modified` / `server_created_at`, soft deletion off `is_deleted` /
/// `deleted_at`.
#[derive(DeriveIden)]
pub(crate) enum SyncField {
    IsDeleted,
    DeletedAt,
    CreatedAt,
    UpdatedAt,
    LastModified,
    ServerCreatedAt,
}

pub(crate) fn with_sync_columns(table: &mut TableCreateStatement) -> &mut TableCreateStatement {
    table
        .col(
            ColumnDef::new(SyncField::IsDeleted)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(SyncField::DeletedAt)
                .timestamp_with_time_zone()
                .null(),
        )
        .col(
            ColumnDef::new(SyncField::CreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(SyncField::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(SyncField::LastModified)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(SyncField::ServerCreatedAt)
                .timestamp_with_time_zone()
                .not_null()
                .default(Expr::current_timestamp()),
        )
}
