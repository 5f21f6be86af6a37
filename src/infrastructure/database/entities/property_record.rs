// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "property_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_id: Uuid,
    pub external_id: String,
    pub owner_name: Option<String>,
    pub address: Option<String>,
    pub parcel_id: Option<String>,
    pub raw: Json,
    pub created_at: ChronoDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::scrape_job::Entity",
        from = "Column::JobId",
        to = "super::scrape_job::Column::Id"
    )]
    ScrapeJob,
}

impl Related<super::scrape_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScrapeJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
