// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{JobStatus, QueueCounts, ScrapeJob};
use crate::domain::models::term::SearchTerm;
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
use crate::infrastructure::database::entities::scrape_job;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::{Expr, LockBehavior, LockType},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// 任务仓库实现
///
/// 基于SeaORM实现的抓取任务数据访问层。出队后的状态更新都是带条件的
/// `UPDATE ... WHERE status = 'active' AND lock_token = ?`，
/// 只有持有租约的工作器能推进任务。
#[derive(Clone)]
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    /// 创建新的任务仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 条件更新未命中时区分“不存在”“已是终态”和“租约已失去”
    async fn rejection(&self, id: Uuid) -> RepositoryError {
        match self.find_by_id(id).await {
            Ok(Some(job)) if job.status.is_terminal() => RepositoryError::InvalidTransition(id),
            Ok(Some(_)) => RepositoryError::LeaseLost(id),
            Ok(None) => RepositoryError::NotFound,
            Err(e) => e,
        }
    }

    async fn distinct_terms(&self, condition: Condition) -> Result<Vec<String>, RepositoryError> {
        let terms: Vec<String> = scrape_job::Entity::find()
            .select_only()
            .column(scrape_job::Column::SearchTerm)
            .distinct()
            .filter(condition)
            .order_by_asc(scrape_job::Column::SearchTerm)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        Ok(terms)
    }
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().into()
}

/// 任务仍在执行且租约属于 `worker_id`
fn leased_to(id: Uuid, worker_id: Uuid) -> Condition {
    Condition::all()
        .add(scrape_job::Column::Id.eq(id))
        .add(scrape_job::Column::Status.eq(JobStatus::Active.to_string()))
        .add(scrape_job::Column::LockToken.eq(worker_id))
}

impl From<scrape_job::Model> for ScrapeJob {
    fn from(model: scrape_job::Model) -> Self {
        Self {
            id: model.id,
            search_term: SearchTerm::from(model.search_term),
            status: model.status.parse().unwrap_or_default(),
            priority: model.priority,
            attempt_count: model.attempt_count,
            max_retries: model.max_retries,
            scheduled_at: model.scheduled_at,
            created_at: model.created_at,
            started_at: model.started_at,
            completed_at: model.completed_at,
            record_count: model.record_count,
            failure_reason: model.failure_reason,
            lock_token: model.lock_token,
            lock_expires_at: model.lock_expires_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<ScrapeJob> for scrape_job::ActiveModel {
    fn from(job: ScrapeJob) -> Self {
        Self {
            id: Set(job.id),
            search_term: Set(job.search_term.into()),
            status: Set(job.status.to_string()),
            priority: Set(job.priority),
            attempt_count: Set(job.attempt_count),
            max_retries: Set(job.max_retries),
            record_count: Set(job.record_count),
            failure_reason: Set(job.failure_reason),
            scheduled_at: Set(job.scheduled_at),
            created_at: Set(job.created_at),
            started_at: Set(job.started_at),
            completed_at: Set(job.completed_at),
            lock_token: Set(job.lock_token),
            lock_expires_at: Set(job.lock_expires_at),
            updated_at: Set(job.updated_at),
        }
    }
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create(&self, job: &ScrapeJob) -> Result<ScrapeJob, RepositoryError> {
        let model: scrape_job::ActiveModel = job.clone().into();
        let inserted = model.insert(self.db.as_ref()).await?;
        Ok(inserted.into())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ScrapeJob>, RepositoryError> {
        let model = scrape_job::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn acquire_next(
        &self,
        worker_id: Uuid,
        lease: chrono::Duration,
    ) -> Result<Option<ScrapeJob>, RepositoryError> {
        let txn = self.db.begin().await?;

        let candidate = scrape_job::Entity::find()
            .filter(scrape_job::Column::Status.eq(JobStatus::Queued.to_string()))
            .filter(
                Condition::any()
                    .add(scrape_job::Column::ScheduledAt.is_null())
                    .add(scrape_job::Column::ScheduledAt.lte(now())),
            )
            .order_by_desc(scrape_job::Column::Priority)
            .order_by_asc(scrape_job::Column::CreatedAt)
            .lock_with_behavior(LockType::Update, LockBehavior::SkipLocked)
            .one(&txn)
            .await?;

        let Some(model) = candidate else {
            txn.commit().await?;
            return Ok(None);
        };

        let id = model.id;
        let job = ScrapeJob::from(model)
            .start(worker_id, lease)
            .map_err(|_| RepositoryError::InvalidTransition(id))?;

        // guarded on status so a racing worker without row locks cannot double-acquire
        let result = scrape_job::Entity::update_many()
            .col_expr(scrape_job::Column::Status, Expr::value(job.status.to_string()))
            .col_expr(scrape_job::Column::AttemptCount, Expr::value(job.attempt_count))
            .col_expr(scrape_job::Column::StartedAt, Expr::value(job.started_at))
            .col_expr(scrape_job::Column::LockToken, Expr::value(job.lock_token))
            .col_expr(scrape_job::Column::LockExpiresAt, Expr::value(job.lock_expires_at))
            .col_expr(scrape_job::Column::UpdatedAt, Expr::value(job.updated_at))
            .filter(scrape_job::Column::Id.eq(id))
            .filter(scrape_job::Column::Status.eq(JobStatus::Queued.to_string()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Some(job))
    }

    async fn record_attempt(
        &self,
        id: Uuid,
        worker_id: Uuid,
        lease_expires_at: DateTime<FixedOffset>,
    ) -> Result<i32, RepositoryError> {
        let result = scrape_job::Entity::update_many()
            .col_expr(
                scrape_job::Column::AttemptCount,
                Expr::col(scrape_job::Column::AttemptCount).add(1),
            )
            .col_expr(
                scrape_job::Column::LockExpiresAt,
                Expr::value(Some(lease_expires_at)),
            )
            .col_expr(scrape_job::Column::UpdatedAt, Expr::value(now()))
            .filter(leased_to(id, worker_id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(self.rejection(id).await);
        }

        let job = self.find_by_id(id).await?.ok_or(RepositoryError::NotFound)?;
        Ok(job.attempt_count)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        worker_id: Uuid,
        record_count: i64,
    ) -> Result<(), RepositoryError> {
        let now = now();
        let result = scrape_job::Entity::update_many()
            .col_expr(
                scrape_job::Column::Status,
                Expr::value(JobStatus::Completed.to_string()),
            )
            .col_expr(scrape_job::Column::RecordCount, Expr::value(Some(record_count)))
            .col_expr(scrape_job::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(scrape_job::Column::LockToken, Expr::value(Option::<Uuid>::None))
            .col_expr(
                scrape_job::Column::LockExpiresAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(scrape_job::Column::UpdatedAt, Expr::value(now))
            .filter(leased_to(id, worker_id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(self.rejection(id).await);
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        worker_id: Uuid,
        scheduled_at: DateTime<FixedOffset>,
        reason: &str,
        refund_attempt: bool,
    ) -> Result<(), RepositoryError> {
        let mut update = scrape_job::Entity::update_many()
            .col_expr(
                scrape_job::Column::Status,
                Expr::value(JobStatus::Queued.to_string()),
            )
            .col_expr(scrape_job::Column::ScheduledAt, Expr::value(Some(scheduled_at)))
            .col_expr(
                scrape_job::Column::FailureReason,
                Expr::value(Some(reason.to_string())),
            )
            .col_expr(
                scrape_job::Column::StartedAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(scrape_job::Column::LockToken, Expr::value(Option::<Uuid>::None))
            .col_expr(
                scrape_job::Column::LockExpiresAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(scrape_job::Column::UpdatedAt, Expr::value(now()));

        if refund_attempt {
            update = update.col_expr(
                scrape_job::Column::AttemptCount,
                Expr::cust("CASE WHEN attempt_count > 0 THEN attempt_count - 1 ELSE 0 END"),
            );
        }

        let result = update
            .filter(leased_to(id, worker_id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(self.rejection(id).await);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        worker_id: Uuid,
        reason: &str,
    ) -> Result<(), RepositoryError> {
        let now = now();
        let result = scrape_job::Entity::update_many()
            .col_expr(
                scrape_job::Column::Status,
                Expr::value(JobStatus::Failed.to_string()),
            )
            .col_expr(
                scrape_job::Column::FailureReason,
                Expr::value(Some(reason.to_string())),
            )
            .col_expr(scrape_job::Column::CompletedAt, Expr::value(Some(now)))
            .col_expr(scrape_job::Column::LockToken, Expr::value(Option::<Uuid>::None))
            .col_expr(
                scrape_job::Column::LockExpiresAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(scrape_job::Column::UpdatedAt, Expr::value(now))
            .filter(leased_to(id, worker_id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(self.rejection(id).await);
        }
        Ok(())
    }

    async fn count_by_status(&self) -> Result<QueueCounts, RepositoryError> {
        let rows: Vec<(String, i64)> = scrape_job::Entity::find()
            .select_only()
            .column(scrape_job::Column::Status)
            .column_as(Expr::col(scrape_job::Column::Id).count(), "count")
            .group_by(scrape_job::Column::Status)
            .into_tuple()
            .all(self.db.as_ref())
            .await?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.parse() {
                Ok(JobStatus::Queued) => counts.queued = count,
                Ok(JobStatus::Active) => counts.active = count,
                Ok(JobStatus::Completed) => counts.completed = count,
                Ok(JobStatus::Failed) => counts.failed = count,
                Err(()) => {}
            }
        }
        Ok(counts)
    }

    async fn failed_terms(&self, limit: u64) -> Result<Vec<String>, RepositoryError> {
        let failed = self
            .distinct_terms(
                Condition::all().add(scrape_job::Column::Status.eq(JobStatus::Failed.to_string())),
            )
            .await?;
        let live: HashSet<String> = self.known_terms().await?.into_iter().collect();

        Ok(failed
            .into_iter()
            .filter(|term| !live.contains(term))
            .take(limit as usize)
            .collect())
    }

    async fn known_terms(&self) -> Result<Vec<String>, RepositoryError> {
        self.distinct_terms(
            Condition::all().add(scrape_job::Column::Status.ne(JobStatus::Failed.to_string())),
        )
        .await
    }

    async fn reset_stuck_jobs(&self) -> Result<u64, RepositoryError> {
        let now = now();
        let result = scrape_job::Entity::update_many()
            .col_expr(
                scrape_job::Column::Status,
                Expr::value(JobStatus::Queued.to_string()),
            )
            .col_expr(scrape_job::Column::LockToken, Expr::value(Option::<Uuid>::None))
            .col_expr(
                scrape_job::Column::LockExpiresAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(scrape_job::Column::UpdatedAt, Expr::value(now))
            .filter(scrape_job::Column::Status.eq(JobStatus::Active.to_string()))
            .filter(scrape_job::Column::LockExpiresAt.lte(now))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }
}
