// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobOutcomes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobOutcomes::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobOutcomes::JobId).uuid().not_null())
                    .col(ColumnDef::new(JobOutcomes::Status).string().not_null())
                    .col(ColumnDef::new(JobOutcomes::Meta).json().not_null())
                    .col(
                        ColumnDef::new(JobOutcomes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobOutcomes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum JobOutcomes {
    Table,
    Id,
    JobId,
    Status,
    Meta,
    CreatedAt,
}
