use sea_orm_migration::prelude::*;

use crate::with_sync_columns;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(DrugCatalogue::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DrugCatalogue::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DrugCatalogue::GenericName).string().not_null())
                        .col(ColumnDef::new(DrugCatalogue::BrandName).string().null())
                        .col(ColumnDef::new(DrugCatalogue::Form).string().null())
                        .col(ColumnDef::new(DrugCatalogue::Route).string().null())
                        .col(ColumnDef::new(DrugCatalogue::DosageQuantity).double().null())
                        .col(ColumnDef::new(DrugCatalogue::DosageUnits).string().null())
                        .col(ColumnDef::new(DrugCatalogue::SalePrice).double().null())
                        .col(ColumnDef::new(DrugCatalogue::SaleCurrency).string().null())
                        .col(
                            ColumnDef::new(DrugCatalogue::IsControlled)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(DrugCatalogue::RequiresRefrigeration)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(DrugCatalogue::Metadata).json_binary().not_null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(DrugBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DrugBatches::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DrugBatches::DrugId).uuid().not_null())
                        .col(ColumnDef::new(DrugBatches::BatchNumber).string().not_null())
                        .col(
                            ColumnDef::new(DrugBatches::ExpiryDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DrugBatches::ManufactureDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(DrugBatches::QuantityReceived)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DrugBatches::QuantityRemaining)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DrugBatches::SupplierName).string().null())
                        .col(ColumnDef::new(DrugBatches::PurchasePrice).double().null())
                        .col(
                            ColumnDef::new(DrugBatches::PurchaseCurrency)
                                .string()
                                .not_null()
                                .default("USD"),
                        )
                        .col(
                            ColumnDef::new(DrugBatches::ReceivedDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DrugBatches::IsQuarantined)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(DrugBatches::RecordedByUserId).uuid().null())
                        .col(ColumnDef::new(DrugBatches::Metadata).json_binary().not_null()),
                )
                .to_owned(),
            )
            .await?;

        // Batch resolution during dispensing scans for the latest-expiring
        // batch of a drug.
        manager
            .create_index(
                Index::create()
                    .name("idx_drug_batches_drug_expiry")
                    .table(DrugBatches::Table)
                    .col(DrugBatches::DrugId)
                    .col(DrugBatches::ExpiryDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DrugBatches::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DrugCatalogue::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum DrugCatalogue {
    Table,
    Id,
    GenericName,
    BrandName,
    Form,
    Route,
    DosageQuantity,
    DosageUnits,
    SalePrice,
    SaleCurrency,
    IsControlled,
    RequiresRefrigeration,
    Metadata,
}

#[derive(DeriveIden)]
enum DrugBatches {
    Table,
    Id,
    DrugId,
    BatchNumber,
    ExpiryDate,
    ManufactureDate,
    QuantityReceived,
    QuantityRemaining,
    SupplierName,
    PurchasePrice,
    PurchaseCurrency,
    ReceivedDate,
    IsQuarantined,
    RecordedByUserId,
    Metadata,
}
