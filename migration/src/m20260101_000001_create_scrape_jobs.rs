// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm_migration::prelude::*;

/// 抓取任务表迁移
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ScrapeJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ScrapeJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ScrapeJobs::SearchTerm).string().not_null())
                    .col(ColumnDef::new(ScrapeJobs::Status).string().not_null())
                    .col(
                        ColumnDef::new(ScrapeJobs::Priority)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScrapeJobs::AttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ScrapeJobs::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(ColumnDef::new(ScrapeJobs::RecordCount).big_integer())
                    .col(ColumnDef::new(ScrapeJobs::FailureReason).text())
                    .col(ColumnDef::new(ScrapeJobs::ScheduledAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ScrapeJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ScrapeJobs::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ScrapeJobs::CompletedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ScrapeJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ScrapeJobs::LockToken).uuid())
                    .col(ColumnDef::new(ScrapeJobs::LockExpiresAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // dequeue scans by status then priority
        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_jobs_status_priority")
                    .table(ScrapeJobs::Table)
                    .col(ScrapeJobs::Status)
                    .col(ScrapeJobs::Priority)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_scrape_jobs_search_term")
                    .table(ScrapeJobs::Table)
                    .col(ScrapeJobs::SearchTerm)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ScrapeJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ScrapeJobs {
    Table,
    Id,
    SearchTerm,
    Status,
    Priority,
    AttemptCount,
    MaxRetries,
    RecordCount,
    FailureReason,
    ScheduledAt,
    CreatedAt,
    StartedAt,
    CompletedAt,
    UpdatedAt,
    LockToken,
    LockExpiresAt,
}
