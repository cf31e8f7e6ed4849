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
                        .table(Patients::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Patients::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Patients::GivenName).string().null())
                        .col(ColumnDef::new(Patients::Surname).string().null())
                        .col(ColumnDef::new(Patients::DateOfBirth).date().null())
                        .col(ColumnDef::new(Patients::Sex).string().null())
                        .col(ColumnDef::new(Patients::Citizenship).string().null())
                        .col(ColumnDef::new(Patients::Phone).string().null())
                        .col(ColumnDef::new(Patients::PrimaryClinicId).uuid().null())
                        .col(ColumnDef::new(Patients::GovernmentId).string().null())
                        .col(ColumnDef::new(Patients::ExternalPatientId).string().null())
                        .col(ColumnDef::new(Patients::PhotoUrl).string().null())
                        .col(ColumnDef::new(Patients::Metadata).json_binary().not_null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(PatientAttributes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PatientAttributes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PatientAttributes::PatientId).uuid().not_null())
                        .col(ColumnDef::new(PatientAttributes::AttributeId).uuid().not_null())
                        .col(ColumnDef::new(PatientAttributes::Attribute).string().not_null())
                        .col(ColumnDef::new(PatientAttributes::StringValue).text().null())
                        .col(ColumnDef::new(PatientAttributes::NumberValue).double().null())
                        .col(
                            ColumnDef::new(PatientAttributes::BooleanValue)
                                .boolean()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PatientAttributes::DateValue)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PatientAttributes::Metadata)
                                .json_binary()
                                .not_null(),
                        ),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(PatientRegistrationForms::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PatientRegistrationForms::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PatientRegistrationForms::ClinicId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PatientRegistrationForms::Name)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PatientRegistrationForms::Fields)
                                .json_binary()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PatientRegistrationForms::Metadata)
                                .json_binary()
                                .not_null(),
                        ),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(Visits::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Visits::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Visits::PatientId).uuid().not_null())
                        .col(ColumnDef::new(Visits::ClinicId).uuid().not_null())
                        .col(ColumnDef::new(Visits::ProviderId).uuid().not_null())
                        .col(ColumnDef::new(Visits::ProviderName).string().null())
                        .col(
                            ColumnDef::new(Visits::CheckInTimestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Visits::Metadata).json_binary().not_null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(Events::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Events::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Events::PatientId).uuid().not_null())
                        .col(ColumnDef::new(Events::VisitId).uuid().null())
                        .col(ColumnDef::new(Events::FormId).uuid().null())
                        .col(ColumnDef::new(Events::EventType).string().not_null())
                        .col(ColumnDef::new(Events::FormData).json_binary().not_null())
                        .col(ColumnDef::new(Events::Metadata).json_binary().not_null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(EventForms::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(EventForms::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(EventForms::Name).string().not_null())
                        .col(ColumnDef::new(EventForms::Description).text().null())
                        .col(ColumnDef::new(EventForms::Language).string().not_null())
                        .col(
                            ColumnDef::new(EventForms::IsEditable)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(EventForms::IsSnapshotForm)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(EventForms::FormFields).json_binary().not_null())
                        .col(ColumnDef::new(EventForms::Metadata).json_binary().not_null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(Appointments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Appointments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Appointments::ProviderId).uuid().null())
                        .col(ColumnDef::new(Appointments::ClinicId).uuid().not_null())
                        .col(ColumnDef::new(Appointments::PatientId).uuid().not_null())
                        .col(ColumnDef::new(Appointments::UserId).uuid().null())
                        .col(ColumnDef::new(Appointments::CurrentVisitId).uuid().null())
                        .col(ColumnDef::new(Appointments::FulfilledVisitId).uuid().null())
                        .col(
                            ColumnDef::new(Appointments::Timestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Appointments::Duration).integer().null())
                        .col(ColumnDef::new(Appointments::Reason).text().null())
                        .col(ColumnDef::new(Appointments::Notes).text().null())
                        .col(ColumnDef::new(Appointments::Status).string().not_null())
                        .col(ColumnDef::new(Appointments::Metadata).json_binary().not_null()),
                )
                .to_owned(),
            )
            .await?;

        // Sync pull scans filter on last_modified per table.
        for (name, table) in [
            ("idx_patients_last_modified", Patients::Table.into_iden()),
            (
                "idx_patient_attributes_last_modified",
                PatientAttributes::Table.into_iden(),
            ),
            ("idx_visits_last_modified", Visits::Table.into_iden()),
            ("idx_events_last_modified", Events::Table.into_iden()),
            (
                "idx_appointments_last_modified",
                Appointments::Table.into_iden(),
            ),
        ] {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(table)
                        .col(SyncField::LastModified)
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            Appointments::Table.into_iden(),
            EventForms::Table.into_iden(),
            Events::Table.into_iden(),
            Visits::Table.into_iden(),
            PatientRegistrationForms::Table.into_iden(),
            PatientAttributes::Table.into_iden(),
            Patients::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Patients {
    Table,
    Id,
    GivenName,
    Surname,
    DateOfBirth,
    Sex,
    Citizenship,
    Phone,
    PrimaryClinicId,
    GovernmentId,
    ExternalPatientId,
    PhotoUrl,
    Metadata,
}

#[derive(DeriveIden)]
enum PatientAttributes {
    Table,
    Id,
    PatientId,
    AttributeId,
    Attribute,
    StringValue,
    NumberValue,
    BooleanValue,
    DateValue,
    Metadata,
}

#[derive(DeriveIden)]
enum PatientRegistrationForms {
    Table,
    Id,
    ClinicId,
    Name,
    Fields,
    Metadata,
}

#[derive(DeriveIden)]
enum Visits {
    Table,
    Id,
    PatientId,
    ClinicId,
    ProviderId,
    ProviderName,
    CheckInTimestamp,
    Metadata,
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    PatientId,
    VisitId,
    FormId,
    EventType,
    FormData,
    Metadata,
}

#[derive(DeriveIden)]
enum EventForms {
    Table,
    Id,
    Name,
    Description,
    Language,
    IsEditable,
    IsSnapshotForm,
    FormFields,
    Metadata,
}

#[derive(DeriveIden)]
enum Appointments {
    Table,
    Id,
    ProviderId,
    ClinicId,
    PatientId,
    UserId,
    CurrentVisitId,
    FulfilledVisitId,
    Timestamp,
    Duration,
    Reason,
    Notes,
    Status,
    Metadata,
}
