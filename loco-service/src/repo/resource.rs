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

use crate::model::{RegionStatus, Resource, ResourceRegion, ResourceStatus, ResourceType};
use crate::repo::domain::NewResourceDomain;
use crate::spec::codec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::{ResourceId, WorkspaceId};
use loco_common::repo::RepoError;
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ResourceRecord {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub resource_type: String,
    pub description: String,
    pub status: String,
    pub spec: String,
    pub spec_version: i32,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ResourceRecord> for Resource {
    type Error = String;

    fn try_from(value: ResourceRecord) -> Result<Self, Self::Error> {
        let resource_type = ResourceType::from_str(&value.resource_type)?;
        let spec = codec::decode_resource_spec(&value.spec, value.spec_version, resource_type)
            .map_err(|err| err.to_string())?;
        Ok(Resource {
            id: ResourceId(value.id),
            workspace_id: WorkspaceId(value.workspace_id),
            name: value.name,
            resource_type,
            description: value.description,
            status: ResourceStatus::from_str(&value.status)?,
            spec,
            spec_version: value.spec_version,
            created_at: value.created_at,
        })
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ResourceRegionRecord {
    pub id: i64,
    pub resource_id: i64,
    pub region: String,
    pub is_primary: bool,
    pub status: String,
}

impl TryFrom<ResourceRegionRecord> for ResourceRegion {
    type Error = String;

    fn try_from(value: ResourceRegionRecord) -> Result<Self, Self::Error> {
        Ok(ResourceRegion {
            id: value.id,
            resource_id: ResourceId(value.resource_id),
            region: value.region,
            is_primary: value.is_primary,
            status: RegionStatus::from_str(&value.status)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewResource {
    pub workspace_id: i64,
    pub name: String,
    pub resource_type: ResourceType,
    pub description: String,
    pub spec: String,
    pub spec_version: i32,
    /// Region name and primary flag; validation has already ensured exactly
    /// one primary.
    pub regions: Vec<(String, bool)>,
    pub domain: NewResourceDomain,
}

#[async_trait]
pub trait ResourceRepo: Send + Sync {
    /// Inserts the resource with `status=unavailable`, one region row per
    /// declared region and the initial primary domain, in one transaction.
    async fn create(&self, resource: &NewResource) -> Result<ResourceRecord, RepoError>;

    async fn get(&self, id: i64) -> Result<Option<ResourceRecord>, RepoError>;

    async fn get_by_name(
        &self,
        workspace_id: i64,
        name: &str,
    ) -> Result<Option<ResourceRecord>, RepoError>;

    async fn list(
        &self,
        workspace_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<ResourceRecord>, RepoError>;

    async fn update_name(&self, id: i64, name: &str) -> Result<(), RepoError>;

    async fn update_status(&self, id: i64, status: ResourceStatus) -> Result<(), RepoError>;

    async fn delete(&self, id: i64) -> Result<(), RepoError>;

    async fn list_regions(&self, id: i64) -> Result<Vec<ResourceRegionRecord>, RepoError>;
}

pub struct DbResourceRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbResourceRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl ResourceRepo for DbResourceRepo<loco_common::db::postgres::PostgresPool> {
    async fn create(&self, resource: &NewResource) -> Result<ResourceRecord, RepoError> {
        let now = Utc::now();
        let mut tx = self.db_pool.with_rw("resource", "create").begin().await?;

        let (id,): (i64,) = tx
            .fetch_one_as(
                sqlx::query_as(
                    r#"
                      INSERT INTO resources
                        (workspace_id, name, resource_type, description, status,
                         spec, spec_version, created_at)
                      VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                      RETURNING id
                    "#,
                )
                .bind(resource.workspace_id)
                .bind(resource.name.as_str())
                .bind(resource.resource_type.to_string())
                .bind(resource.description.as_str())
                .bind(ResourceStatus::Unavailable.to_string())
                .bind(resource.spec.as_str())
                .bind(resource.spec_version)
                .bind(now),
            )
            .await?;

        for (region, is_primary) in &resource.regions {
            tx.execute(
                sqlx::query(
                    r#"
                      INSERT INTO resource_regions
                        (resource_id, region, is_primary, status, created_at)
                      VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(id)
                .bind(region.as_str())
                .bind(is_primary)
                .bind(RegionStatus::Desired.to_string())
                .bind(now),
            )
            .await?;
        }

        tx.execute(
            sqlx::query(
                r#"
                  INSERT INTO resource_domains
                    (resource_id, domain, domain_source, subdomain_label,
                     platform_domain_id, is_primary, created_at)
                  VALUES ($1, $2, $3, $4, $5, TRUE, $6)
                "#,
            )
            .bind(id)
            .bind(resource.domain.domain.as_str())
            .bind(resource.domain.domain_source.to_string())
            .bind(resource.domain.subdomain_label.as_deref())
            .bind(resource.domain.platform_domain_id)
            .bind(now),
        )
        .await?;

        tx.commit().await?;

        Ok(ResourceRecord {
            id,
            workspace_id: resource.workspace_id,
            name: resource.name.clone(),
            resource_type: resource.resource_type.to_string(),
            description: resource.description.clone(),
            status: ResourceStatus::Unavailable.to_string(),
            spec: resource.spec.clone(),
            spec_version: resource.spec_version,
            created_at: now,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<ResourceRecord>, RepoError> {
        let query =
            sqlx::query_as::<_, ResourceRecord>("SELECT * FROM resources WHERE id = $1").bind(id);
        self.db_pool
            .with_ro("resource", "get")
            .fetch_optional_as(query)
            .await
    }

    async fn get_by_name(
        &self,
        workspace_id: i64,
        name: &str,
    ) -> Result<Option<ResourceRecord>, RepoError> {
        let query = sqlx::query_as::<_, ResourceRecord>(
            "SELECT * FROM resources WHERE workspace_id = $1 AND name = $2",
        )
        .bind(workspace_id)
        .bind(name);
        self.db_pool
            .with_ro("resource", "get_by_name")
            .fetch_optional_as(query)
            .await
    }

    async fn list(
        &self,
        workspace_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<ResourceRecord>, RepoError> {
        let query = sqlx::query_as::<_, ResourceRecord>(
            r#"
              SELECT * FROM resources
              WHERE workspace_id = $1
                AND ($2 IS NULL
                     OR (created_at, id) <
                        (SELECT created_at, id FROM resources WHERE id = $2))
              ORDER BY created_at DESC, id DESC
              LIMIT $3
            "#,
        )
        .bind(workspace_id)
        .bind(cursor)
        .bind(limit);
        self.db_pool
            .with_ro("resource", "list")
            .fetch_all_as(query)
            .await
    }

    async fn update_name(&self, id: i64, name: &str) -> Result<(), RepoError> {
        let query = sqlx::query("UPDATE resources SET name = $2 WHERE id = $1")
            .bind(id)
            .bind(name);
        self.db_pool
            .with_rw("resource", "update_name")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn update_status(&self, id: i64, status: ResourceStatus) -> Result<(), RepoError> {
        let query = sqlx::query("UPDATE resources SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.to_string());
        self.db_pool
            .with_rw("resource", "update_status")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        let mut tx = self.db_pool.with_rw("resource", "delete").begin().await?;
        tx.execute(sqlx::query("DELETE FROM deployments WHERE resource_id = $1").bind(id))
            .await?;
        tx.execute(sqlx::query("DELETE FROM resource_regions WHERE resource_id = $1").bind(id))
            .await?;
        tx.execute(sqlx::query("DELETE FROM resource_domains WHERE resource_id = $1").bind(id))
            .await?;
        tx.execute(
            sqlx::query("DELETE FROM user_scopes WHERE entity_type = 'resource' AND entity_id = $1")
                .bind(id),
        )
        .await?;
        tx.execute(
            sqlx::query("DELETE FROM tokens WHERE entity_type = 'resource' AND entity_id = $1")
                .bind(id),
        )
        .await?;
        tx.execute(sqlx::query("DELETE FROM resources WHERE id = $1").bind(id))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_regions(&self, id: i64) -> Result<Vec<ResourceRegionRecord>, RepoError> {
        let query = sqlx::query_as::<_, ResourceRegionRecord>(
            "SELECT id, resource_id, region, is_primary, status FROM resource_regions WHERE resource_id = $1 ORDER BY id",
        )
        .bind(id);
        self.db_pool
            .with_ro("resource", "list_regions")
            .fetch_all_as(query)
            .await
    }
}
