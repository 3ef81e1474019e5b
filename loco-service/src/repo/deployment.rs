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

use crate::model::{Deployment, DeploymentStatus};
use crate::spec::codec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::{ClusterId, DeploymentId, ResourceId};
use loco_common::repo::RepoError;
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DeploymentRecord {
    pub id: i64,
    pub resource_id: i64,
    pub cluster_id: i64,
    pub region: String,
    pub replicas: i32,
    pub status: String,
    pub is_active: bool,
    pub message: String,
    pub spec: String,
    pub spec_version: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DeploymentRecord> for Deployment {
    type Error = String;

    fn try_from(value: DeploymentRecord) -> Result<Self, Self::Error> {
        let spec = codec::decode_deployment_spec(&value.spec, value.spec_version)
            .map_err(|err| err.to_string())?;
        Ok(Deployment {
            id: DeploymentId(value.id),
            resource_id: ResourceId(value.resource_id),
            cluster_id: ClusterId(value.cluster_id),
            region: value.region,
            replicas: value.replicas,
            status: DeploymentStatus::from_str(&value.status)?,
            is_active: value.is_active,
            message: value.message,
            spec,
            spec_version: value.spec_version,
            started_at: value.started_at,
            completed_at: value.completed_at,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub resource_id: i64,
    pub cluster_id: i64,
    pub region: String,
    pub replicas: i32,
    pub message: String,
    /// Merged spec with env stripped; the codec has already run.
    pub spec: String,
    pub spec_version: i32,
}

#[async_trait]
pub trait DeploymentRepo: Send + Sync {
    /// The supersession transaction: flips every active deployment of the
    /// same (resource, region) to inactive, then inserts the new row as the
    /// single active one with `status=pending`. Concurrent callers serialize
    /// on the flipped rows, so the last committer wins the active flag.
    async fn create_with_cleanup(
        &self,
        deployment: &NewDeployment,
    ) -> Result<DeploymentRecord, RepoError>;

    async fn get(&self, id: i64) -> Result<Option<DeploymentRecord>, RepoError>;

    async fn list(
        &self,
        resource_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<DeploymentRecord>, RepoError>;

    async fn get_active(
        &self,
        resource_id: i64,
        region: &str,
    ) -> Result<Option<DeploymentRecord>, RepoError>;

    async fn list_active(&self, resource_id: i64) -> Result<Vec<DeploymentRecord>, RepoError>;

    async fn set_inactive(&self, id: i64) -> Result<(), RepoError>;

    /// Reconciliation write surface: status/message updates coming back from
    /// the workload controller. `started_at`/`completed_at` are only ever set
    /// once; later writes keep the first value.
    async fn update_status(
        &self,
        id: i64,
        status: DeploymentStatus,
        message: &str,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepoError>;

    async fn update_message(&self, id: i64, message: &str) -> Result<(), RepoError>;
}

pub struct DbDeploymentRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbDeploymentRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl DeploymentRepo for DbDeploymentRepo<loco_common::db::postgres::PostgresPool> {
    async fn create_with_cleanup(
        &self,
        deployment: &NewDeployment,
    ) -> Result<DeploymentRecord, RepoError> {
        let now = Utc::now();
        let mut tx = self
            .db_pool
            .with_rw("deployment", "create_with_cleanup")
            .begin()
            .await?;

        tx.execute(
            sqlx::query(
                r#"
                  UPDATE deployments
                  SET is_active = FALSE
                  WHERE resource_id = $1 AND region = $2 AND is_active
                "#,
            )
            .bind(deployment.resource_id)
            .bind(deployment.region.as_str()),
        )
        .await?;

        let (id,): (i64,) = tx
            .fetch_one_as(
                sqlx::query_as(
                    r#"
                      INSERT INTO deployments
                        (resource_id, cluster_id, region, replicas, status, is_active,
                         message, spec, spec_version, created_at)
                      VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, $9)
                      RETURNING id
                    "#,
                )
                .bind(deployment.resource_id)
                .bind(deployment.cluster_id)
                .bind(deployment.region.as_str())
                .bind(deployment.replicas)
                .bind(DeploymentStatus::Pending.to_string())
                .bind(deployment.message.as_str())
                .bind(deployment.spec.as_str())
                .bind(deployment.spec_version)
                .bind(now),
            )
            .await?;

        tx.commit().await?;

        Ok(DeploymentRecord {
            id,
            resource_id: deployment.resource_id,
            cluster_id: deployment.cluster_id,
            region: deployment.region.clone(),
            replicas: deployment.replicas,
            status: DeploymentStatus::Pending.to_string(),
            is_active: true,
            message: deployment.message.clone(),
            spec: deployment.spec.clone(),
            spec_version: deployment.spec_version,
            started_at: None,
            completed_at: None,
            created_at: now,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<DeploymentRecord>, RepoError> {
        let query = sqlx::query_as::<_, DeploymentRecord>("SELECT * FROM deployments WHERE id = $1")
            .bind(id);
        self.db_pool
            .with_ro("deployment", "get")
            .fetch_optional_as(query)
            .await
    }

    async fn list(
        &self,
        resource_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<DeploymentRecord>, RepoError> {
        let query = sqlx::query_as::<_, DeploymentRecord>(
            r#"
              SELECT * FROM deployments
              WHERE resource_id = $1
                AND ($2 IS NULL
                     OR (created_at, id) <
                        (SELECT created_at, id FROM deployments WHERE id = $2))
              ORDER BY created_at DESC, id DESC
              LIMIT $3
            "#,
        )
        .bind(resource_id)
        .bind(cursor)
        .bind(limit);
        self.db_pool
            .with_ro("deployment", "list")
            .fetch_all_as(query)
            .await
    }

    async fn get_active(
        &self,
        resource_id: i64,
        region: &str,
    ) -> Result<Option<DeploymentRecord>, RepoError> {
        let query = sqlx::query_as::<_, DeploymentRecord>(
            "SELECT * FROM deployments WHERE resource_id = $1 AND region = $2 AND is_active",
        )
        .bind(resource_id)
        .bind(region);
        self.db_pool
            .with_ro("deployment", "get_active")
            .fetch_optional_as(query)
            .await
    }

    async fn list_active(&self, resource_id: i64) -> Result<Vec<DeploymentRecord>, RepoError> {
        let query = sqlx::query_as::<_, DeploymentRecord>(
            "SELECT * FROM deployments WHERE resource_id = $1 AND is_active ORDER BY region",
        )
        .bind(resource_id);
        self.db_pool
            .with_ro("deployment", "list_active")
            .fetch_all_as(query)
            .await
    }

    async fn set_inactive(&self, id: i64) -> Result<(), RepoError> {
        let query =
            sqlx::query("UPDATE deployments SET is_active = FALSE WHERE id = $1").bind(id);
        self.db_pool
            .with_rw("deployment", "set_inactive")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        id: i64,
        status: DeploymentStatus,
        message: &str,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepoError> {
        let query = sqlx::query(
            r#"
              UPDATE deployments
              SET status = $2,
                  message = $3,
                  started_at = COALESCE(started_at, $4),
                  completed_at = COALESCE(completed_at, $5)
              WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(message)
        .bind(started_at)
        .bind(completed_at);
        self.db_pool
            .with_rw("deployment", "update_status")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn update_message(&self, id: i64, message: &str) -> Result<(), RepoError> {
        let query = sqlx::query("UPDATE deployments SET message = $2 WHERE id = $1")
            .bind(id)
            .bind(message);
        self.db_pool
            .with_rw("deployment", "update_message")
            .execute(query)
            .await?;
        Ok(())
    }
}
