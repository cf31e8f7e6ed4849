use sea_orm_migration::prelude::*;

use crate::{with_sync_columns, SyncField};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(DispensingRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DispensingRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DispensingRecords::ClinicId).uuid().not_null())
                        .col(ColumnDef::new(DispensingRecords::DrugId).uuid().not_null())
                        .col(ColumnDef::new(DispensingRecords::BatchId).uuid().null())
                        .col(
                            ColumnDef::new(DispensingRecords::PrescriptionItemId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(DispensingRecords::PatientId).uuid().not_null())
                        .col(
                            ColumnDef::new(DispensingRecords::QuantityDispensed)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DispensingRecords::DosageInstructions)
                                .text()
                                .null(),
                        )
                        .col(ColumnDef::new(DispensingRecords::DaysSupply).integer().null())
                        .col(
                            ColumnDef::new(DispensingRecords::DispensedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DispensingRecords::DispensedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DispensingRecords::RecordedByUserId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(DispensingRecords::Metadata)
                                .json_binary()
                                .not_null(),
                        ),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dispensing_records_patient")
                    .table(DispensingRecords::Table)
                    .col(DispensingRecords::PatientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dispensing_records_clinic_dispensed_at")
                    .table(DispensingRecords::Table)
                    .col(DispensingRecords::ClinicId)
                    .col(DispensingRecords::DispensedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_dispensing_records_last_modified")
                    .table(DispensingRecords::Table)
                    .col(SyncField::LastModified)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DispensingRecords::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum DispensingRecords {
    Table,
    Id,
    ClinicId,
    DrugId,
    BatchId,
    PrescriptionItemId,
    PatientId,
    QuantityDispensed,
    DosageInstructions,
    DaysSupply,
    DispensedBy,
    DispensedAt,
    RecordedByUserId,
    Metadata,
}
