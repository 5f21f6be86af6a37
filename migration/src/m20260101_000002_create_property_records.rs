// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 房产记录表迁移
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PropertyRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PropertyRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PropertyRecords::JobId).uuid().not_null())
                    .col(
                        ColumnDef::new(PropertyRecords::ExternalId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PropertyRecords::OwnerName).string())
                    .col(ColumnDef::new(PropertyRecords::Address).string())
                    .col(ColumnDef::new(PropertyRecords::ParcelId).string())
                    .col(ColumnDef::new(PropertyRecords::Raw).json().not_null())
                    .col(
                        ColumnDef::new(PropertyRecords::CreatedAt)
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
                    .name("idx_property_records_job_id")
                    .table(PropertyRecords::Table)
                    .col(PropertyRecords::JobId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PropertyRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PropertyRecords {
    Table,
    Id,
    JobId,
    ExternalId,
    OwnerName,
    Address,
    ParcelId,
    Raw,
    CreatedAt,
}
