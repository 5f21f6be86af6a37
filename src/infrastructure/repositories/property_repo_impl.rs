// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::JobStatus;
use crate::domain::models::property::PropertyRecord;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::domain::repositories::result_repository::ResultRepository;
use crate::infrastructure::database::entities::{job_outcome, property_record};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 房产记录仓库实现
///
/// 写入 `property_records`，并在 `job_outcomes` 中记录任务最终结果
#[derive(Clone)]
pub struct PropertyRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl PropertyRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_active_model(
    job_id: Uuid,
    record: &PropertyRecord,
    created_at: DateTime<FixedOffset>,
) -> property_record::ActiveModel {
    property_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        job_id: Set(job_id),
        external_id: Set(record.external_id.clone()),
        owner_name: Set(record.owner_name.clone()),
        address: Set(record.address.clone()),
        parcel_id: Set(record.parcel_id.clone()),
        raw: Set(record.raw.clone()),
        created_at: Set(created_at),
    }
}

impl From<property_record::Model> for PropertyRecord {
    fn from(model: property_record::Model) -> Self {
        Self {
            external_id: model.external_id,
            owner_name: model.owner_name,
            address: model.address,
            parcel_id: model.parcel_id,
            raw: model.raw,
        }
    }
}

#[async_trait]
impl ResultRepository for PropertyRepositoryImpl {
    async fn save_results(
        &self,
        job_id: Uuid,
        records: &[PropertyRecord],
    ) -> Result<u64, RepositoryError> {
        let txn = self.db.begin().await?;

        let replaced = property_record::Entity::delete_many()
            .filter(property_record::Column::JobId.eq(job_id))
            .exec(&txn)
            .await?
            .rows_affected;

        if !records.is_empty() {
            let now: DateTime<FixedOffset> = Utc::now().into();
            property_record::Entity::insert_many(
                records.iter().map(|r| to_active_model(job_id, r, now)),
            )
            .exec_without_returning(&txn)
            .await?;
        }

        txn.commit().await?;

        if replaced > 0 {
            debug!(job_id = %job_id, replaced, "Replaced previously saved records");
        }
        Ok(records.len() as u64)
    }

    async fn record_job_outcome(
        &self,
        job_id: Uuid,
        status: JobStatus,
        meta: serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let outcome = job_outcome::ActiveModel {
            id: Set(Uuid::new_v4()),
            job_id: Set(job_id),
            status: Set(status.to_string()),
            meta: Set(meta),
            created_at: Set(Utc::now().into()),
        };
        outcome.insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn find_by_job(&self, job_id: Uuid) -> Result<Vec<PropertyRecord>, RepositoryError> {
        let models = property_record::Entity::find()
            .filter(property_record::Column::JobId.eq(job_id))
            .order_by_asc(property_record::Column::ExternalId)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(PropertyRecord::from).collect())
    }
}
