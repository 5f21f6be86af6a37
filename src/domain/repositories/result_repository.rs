// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::JobStatus;
use crate::domain::models::property::PropertyRecord;
use crate::domain::repositories::job_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 结果仓库特质
///
/// 抓取结果的持久化协作者
#[async_trait]
pub trait ResultRepository: Send + Sync {
    /// 保存任务结果
    ///
    /// 幂等：同一任务的旧记录在同一事务内被替换。返回写入的记录数。
    async fn save_results(
        &self,
        job_id: Uuid,
        records: &[PropertyRecord],
    ) -> Result<u64, RepositoryError>;

    /// 记录任务最终结果
    async fn record_job_outcome(
        &self,
        job_id: Uuid,
        status: JobStatus,
        meta: serde_json::Value,
    ) -> Result<(), RepositoryError>;

    /// 查询任务的已保存记录
    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<PropertyRecord>, RepositoryError>;
}
