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
                        .table(Clinics::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Clinics::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Clinics::Name).string().not_null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(ClinicDepartments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ClinicDepartments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ClinicDepartments::ClinicId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ClinicDepartments::Name).string().not_null())
                        .col(ColumnDef::new(ClinicDepartments::Description).text().null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_table(
                with_sync_columns(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Users::Name).string().not_null())
                        .col(ColumnDef::new(Users::Email).string().not_null())
                        .col(ColumnDef::new(Users::HashedPassword).string().not_null())
                        .col(ColumnDef::new(Users::Role).string().not_null())
                        .col(ColumnDef::new(Users::ClinicId).uuid().null()),
                )
                .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_email")
                    .table(Users::Table)
                    .col(Users::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserClinicPermissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserClinicPermissions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserClinicPermissions::UserId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserClinicPermissions::ClinicId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserClinicPermissions::CanManageInventory)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(UserClinicPermissions::CanViewReports)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(UserClinicPermissions::CanSync)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(UserClinicPermissions::IsClinicAdmin)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(UserClinicPermissions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UserClinicPermissions::UpdatedAt)
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
                    .name("idx_user_clinic_permissions_user_clinic")
                    .table(UserClinicPermissions::Table)
                    .col(UserClinicPermissions::UserId)
                    .col(UserClinicPermissions::ClinicId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserClinicPermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ClinicDepartments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Clinics::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Clinics {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum ClinicDepartments {
    Table,
    Id,
    ClinicId,
    Name,
    Description,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Email,
    HashedPassword,
    Role,
    ClinicId,
}

#[derive(DeriveIden)]
enum UserClinicPermissions {
    Table,
    Id,
    UserId,
    ClinicId,
    CanManageInventory,
    CanViewReports,
    CanSync,
    IsClinicAdmin,
    CreatedAt,
    UpdatedAt,
}
