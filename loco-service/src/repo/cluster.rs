// Copyright 2024-2025 Loco Cloud
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::model::{Cluster, ClusterHealth};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::ClusterId;
use loco_common::repo::RepoError;
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ClusterRecord {
    pub id: i64,
    pub name: String,
    pub region: String,
    pub provider: String,
    pub is_active: bool,
    pub is_default: bool,
    pub endpoint: String,
    pub health_status: String,
    pub last_health_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ClusterRecord> for Cluster {
    type Error = String;

    fn try_from(value: ClusterRecord) -> Result<Self, Self::Error> {
        Ok(Cluster {
            id: ClusterId(value.id),
            name: value.name,
            region: value.region,
            provider: value.provider,
            is_active: value.is_active,
            is_default: value.is_default,
            endpoint: value.endpoint,
            health_status: ClusterHealth::from_str(&value.health_status)?,
            last_health_check: value.last_health_check,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewCluster {
    pub name: String,
    pub region: String,
    pub provider: String,
    pub is_active: bool,
    pub is_default: bool,
    pub endpoint: String,
    pub health_status: ClusterHealth,
}

#[async_trait]
pub trait ClusterRepo: Send + Sync {
    /// Registers or refreshes a fleet member; keyed by cluster name.
    async fn upsert(&self, cluster: &NewCluster) -> Result<(), RepoError>;

    async fn get(&self, id: i64) -> Result<Option<ClusterRecord>, RepoError>;

    /// Active and healthy clusters serving the region: default first, then
    /// oldest. The caller picks the head for placement.
    async fn find_for_region(&self, region: &str) -> Result<Vec<ClusterRecord>, RepoError>;

    async fn list_active_healthy(&self) -> Result<Vec<ClusterRecord>, RepoError>;
}

pub struct DbClusterRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbClusterRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl ClusterRepo for DbClusterRepo<loco_common::db::postgres::PostgresPool> {
    async fn upsert(&self, cluster: &NewCluster) -> Result<(), RepoError> {
        let now = Utc::now();
        let query = sqlx::query(
            r#"
              INSERT INTO clusters
                (name, region, provider, is_active, is_default, endpoint,
                 health_status, last_health_check, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
              ON CONFLICT (name) DO UPDATE
              SET region = $2,
                  provider = $3,
                  is_active = $4,
                  is_default = $5,
                  endpoint = $6,
                  health_status = $7,
                  last_health_check = $8
            "#,
        )
        .bind(cluster.name.as_str())
        .bind(cluster.region.as_str())
        .bind(cluster.provider.as_str())
        .bind(cluster.is_active)
        .bind(cluster.is_default)
        .bind(cluster.endpoint.as_str())
        .bind(cluster.health_status.to_string())
        .bind(now);
        self.db_pool
            .with_rw("cluster", "upsert")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<ClusterRecord>, RepoError> {
        let query =
            sqlx::query_as::<_, ClusterRecord>("SELECT * FROM clusters WHERE id = $1").bind(id);
        self.db_pool
            .with_ro("cluster", "get")
            .fetch_optional_as(query)
            .await
    }

    async fn find_for_region(&self, region: &str) -> Result<Vec<ClusterRecord>, RepoError> {
        let query = sqlx::query_as::<_, ClusterRecord>(
            r#"
              SELECT * FROM clusters
              WHERE region = $1 AND is_active AND health_status = 'healthy'
              ORDER BY is_default DESC, created_at ASC, id ASC
            "#,
        )
        .bind(region);
        self.db_pool
            .with_ro("cluster", "find_for_region")
            .fetch_all_as(query)
            .await
    }

    async fn list_active_healthy(&self) -> Result<Vec<ClusterRecord>, RepoError> {
        let query = sqlx::query_as::<_, ClusterRecord>(
            "SELECT * FROM clusters WHERE is_active AND health_status = 'healthy' ORDER BY region, id",
        );
        self.db_pool
            .with_ro("cluster", "list_active_healthy")
            .fetch_all_as(query)
            .await
    }
}
