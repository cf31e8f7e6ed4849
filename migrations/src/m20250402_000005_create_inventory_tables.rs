use sea_orm_migration::prelude::*;

use crate::with_sync_columns;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Materialized balance per (clinic, drug, batch). batch_number and
        // batch_expiry_date are denormalized from drug_batches so mobile can
        // display stock without syncing a join.
        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(ClinicInventory::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ClinicInventory::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ClinicInventory::ClinicId).uuid().not_null())
                        .col(ColumnDef::new(ClinicInventory::DrugId).uuid().not_null())
                        .col(ColumnDef::new(ClinicInventory::BatchId).uuid().not_null())
                        .col(
                            ColumnDef::new(ClinicInventory::QuantityAvailable)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ClinicInventory::ReservedQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ClinicInventory::BatchNumber).string().null())
                        .col(
                            ColumnDef::new(ClinicInventory::BatchExpiryDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ClinicInventory::LastCountedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ClinicInventory::RecordedByUserId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ClinicInventory::Metadata)
                                .json_binary()
                                .not_null(),
                        ),
                )
                .to_owned(),
            )
            .await?;

        // The single point of contention per stock line; the balance upsert
        // targets this key with an atomic increment.
        manager
            .create_index(
                Index::create()
                    .name("idx_clinic_inventory_clinic_drug_batch")
                    .table(ClinicInventory::Table)
                    .col(ClinicInventory::ClinicId)
                    .col(ClinicInventory::DrugId)
                    .col(ClinicInventory::BatchId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_clinic_inventory_expiry")
                    .table(ClinicInventory::Table)
                    .col(ClinicInventory::BatchExpiryDate)
                    .to_owned(),
            )
            .await?;

        // Append-only movement ledger. No soft-delete columns: rows are
        // preserved for audit and never synced to mobile.
        manager
            .create_table(
                Table::create()
                    .table(InventoryTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InventoryTransactions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::ClinicId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::DrugId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InventoryTransactions::BatchId).uuid().null())
                    .col(
                        ColumnDef::new(InventoryTransactions::TransactionType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::Quantity)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::BalanceAfter)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::ReferenceType)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::ReferenceId)
                            .uuid()
                            .null(),
                    )
                    .col(ColumnDef::new(InventoryTransactions::Reason).text().null())
                    .col(
                        ColumnDef::new(InventoryTransactions::PerformedBy)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(InventoryTransactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inventory_transactions_clinic_timestamp")
                    .table(InventoryTransactions::Table)
                    .col(InventoryTransactions::ClinicId)
                    .col(InventoryTransactions::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inventory_transactions_key")
                    .table(InventoryTransactions::Table)
                    .col(InventoryTransactions::ClinicId)
                    .col(InventoryTransactions::DrugId)
                    .col(InventoryTransactions::BatchId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InventoryTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClinicInventory::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum ClinicInventory {
    Table,
    Id,
    ClinicId,
    DrugId,
    BatchId,
    QuantityAvailable,
    ReservedQuantity,
    BatchNumber,
    BatchExpiryDate,
    LastCountedAt,
    RecordedByUserId,
    Metadata,
}

#[derive(DeriveIden)]
enum InventoryTransactions {
    Table,
    Id,
    ClinicId,
    DrugId,
    BatchId,
    TransactionType,
    Quantity,
    BalanceAfter,
    ReferenceType,
    ReferenceId,
    Reason,
    PerformedBy,
    Timestamp,
    CreatedAt,
    UpdatedAt,
}
