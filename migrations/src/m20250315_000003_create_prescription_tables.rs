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
                        .table(Prescriptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Prescriptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Prescriptions::PatientId).uuid().not_null())
                        .col(ColumnDef::new(Prescriptions::ProviderId).uuid().not_null())
                        .col(ColumnDef::new(Prescriptions::FilledBy).uuid().null())
                        .col(ColumnDef::new(Prescriptions::PickupClinicId).uuid().not_null())
                        .col(ColumnDef::new(Prescriptions::VisitId).uuid().null())
                        .col(ColumnDef::new(Prescriptions::Priority).string().not_null())
                        .col(
                            ColumnDef::new(Prescriptions::ExpirationDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Prescriptions::PrescribedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Prescriptions::FilledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Prescriptions::Status).string().not_null())
                        .col(ColumnDef::new(Prescriptions::Notes).text().null())
                        .col(ColumnDef::new(Prescriptions::Metadata).json_binary().not_null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(PrescriptionItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PrescriptionItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionItems::PrescriptionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PrescriptionItems::DrugId).uuid().null())
                        .col(ColumnDef::new(PrescriptionItems::DrugName).string().null())
                        .col(ColumnDef::new(PrescriptionItems::Dose).double().null())
                        .col(ColumnDef::new(PrescriptionItems::DoseUnits).string().null())
                        .col(ColumnDef::new(PrescriptionItems::Route).string().null())
                        .col(ColumnDef::new(PrescriptionItems::Form).string().null())
                        .col(ColumnDef::new(PrescriptionItems::Frequency).string().null())
                        .col(ColumnDef::new(PrescriptionItems::Duration).integer().null())
                        .col(
                            ColumnDef::new(PrescriptionItems::DurationUnits)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(PrescriptionItems::Quantity).integer().null())
                        .col(ColumnDef::new(PrescriptionItems::Status).string().not_null())
                        .col(
                            ColumnDef::new(PrescriptionItems::Metadata)
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
                    .name("idx_prescriptions_last_modified")
                    .table(Prescriptions::Table)
                    .col(SyncField::LastModified)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_prescription_items_prescription")
                    .table(PrescriptionItems::Table)
                    .col(PrescriptionItems::PrescriptionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PrescriptionItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Prescriptions::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Prescriptions {
    Table,
    Id,
    PatientId,
    ProviderId,
    FilledBy,
    PickupClinicId,
    VisitId,
    Priority,
    ExpirationDate,
    PrescribedAt,
    FilledAt,
    Status,
    Notes,
    Metadata,
}

#[derive(DeriveIden)]
enum PrescriptionItems {
    Table,
    Id,
    PrescriptionId,
    DrugId,
    DrugName,
    Dose,
    DoseUnits,
    Route,
    Form,
    Frequency,
    Duration,
    DurationUnits,
    Quantity,
    Status,
    Metadata,
}
