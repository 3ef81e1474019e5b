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

use crate::model::{DomainSource, PlatformDomain, ResourceDomain};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::{DomainId, PlatformDomainId, ResourceId};
use loco_common::repo::RepoError;
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct PlatformDomainRecord {
    pub id: i64,
    pub domain: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PlatformDomainRecord> for PlatformDomain {
    fn from(value: PlatformDomainRecord) -> Self {
        PlatformDomain {
            id: PlatformDomainId(value.id),
            domain: value.domain,
            is_active: value.is_active,
            created_at: value.created_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ResourceDomainRecord {
    pub id: i64,
    pub resource_id: i64,
    pub domain: String,
    pub domain_source: String,
    pub subdomain_label: Option<String>,
    pub platform_domain_id: Option<i64>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ResourceDomainRecord> for ResourceDomain {
    type Error = String;

    fn try_from(value: ResourceDomainRecord) -> Result<Self, Self::Error> {
        Ok(ResourceDomain {
            id: DomainId(value.id),
            resource_id: ResourceId(value.resource_id),
            domain: value.domain,
            source: DomainSource::from_str(&value.domain_source)?,
            subdomain_label: value.subdomain_label,
            platform_domain_id: value.platform_domain_id.map(PlatformDomainId),
            is_primary: value.is_primary,
            created_at: value.created_at,
        })
    }
}

/// Fully resolved domain row to insert; the service layer synthesizes the
/// hostname for platform provided domains before this reaches the store.
#[derive(Debug, Clone)]
pub struct NewResourceDomain {
    pub domain: String,
    pub domain_source: DomainSource,
    pub subdomain_label: Option<String>,
    pub platform_domain_id: Option<i64>,
    pub is_primary: bool,
}

#[async_trait]
pub trait DomainRepo: Send + Sync {
    async fn create_platform_domain(
        &self,
        domain: &str,
    ) -> Result<PlatformDomainRecord, RepoError>;

    async fn get_platform_domain(
        &self,
        id: i64,
    ) -> Result<Option<PlatformDomainRecord>, RepoError>;

    async fn list_platform_domains(
        &self,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<PlatformDomainRecord>, RepoError>;

    async fn set_platform_domain_active(&self, id: i64, is_active: bool)
        -> Result<(), RepoError>;

    async fn add_resource_domain(
        &self,
        resource_id: i64,
        domain: &NewResourceDomain,
    ) -> Result<ResourceDomainRecord, RepoError>;

    async fn get_resource_domain(
        &self,
        id: i64,
    ) -> Result<Option<ResourceDomainRecord>, RepoError>;

    async fn list_resource_domains(
        &self,
        resource_id: i64,
    ) -> Result<Vec<ResourceDomainRecord>, RepoError>;

    async fn get_primary_resource_domain(
        &self,
        resource_id: i64,
    ) -> Result<Option<ResourceDomainRecord>, RepoError>;

    async fn count_resource_domains(&self, resource_id: i64) -> Result<i64, RepoError>;

    async fn domain_exists(&self, domain: &str) -> Result<bool, RepoError>;

    async fn update_resource_domain_hostname(
        &self,
        id: i64,
        hostname: &str,
    ) -> Result<(), RepoError>;

    /// Flips the primary flag to the given domain in a single statement; the
    /// exactly-one-primary invariant holds at every commit point.
    async fn set_primary_resource_domain(
        &self,
        resource_id: i64,
        domain_id: i64,
    ) -> Result<(), RepoError>;

    async fn remove_resource_domain(&self, id: i64) -> Result<(), RepoError>;
}

pub struct DbDomainRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbDomainRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl DomainRepo for DbDomainRepo<loco_common::db::postgres::PostgresPool> {
    async fn create_platform_domain(
        &self,
        domain: &str,
    ) -> Result<PlatformDomainRecord, RepoError> {
        let now = Utc::now();
        let (id,): (i64,) = self
            .db_pool
            .with_rw("domain", "create_platform_domain")
            .fetch_one_as(
                sqlx::query_as(
                    r#"
                      INSERT INTO platform_domains (domain, is_active, created_at)
                      VALUES ($1, TRUE, $2)
                      RETURNING id
                    "#,
                )
                .bind(domain)
                .bind(now),
            )
            .await?;
        Ok(PlatformDomainRecord {
            id,
            domain: domain.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    async fn get_platform_domain(
        &self,
        id: i64,
    ) -> Result<Option<PlatformDomainRecord>, RepoError> {
        let query = sqlx::query_as::<_, PlatformDomainRecord>(
            "SELECT * FROM platform_domains WHERE id = $1",
        )
        .bind(id);
        self.db_pool
            .with_ro("domain", "get_platform_domain")
            .fetch_optional_as(query)
            .await
    }

    async fn list_platform_domains(
        &self,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<PlatformDomainRecord>, RepoError> {
        let query = sqlx::query_as::<_, PlatformDomainRecord>(
            r#"
              SELECT * FROM platform_domains
              WHERE $1 IS NULL
                 OR (created_at, id) <
                    (SELECT created_at, id FROM platform_domains WHERE id = $1)
              ORDER BY created_at DESC, id DESC
              LIMIT $2
            "#,
        )
        .bind(cursor)
        .bind(limit);
        self.db_pool
            .with_ro("domain", "list_platform_domains")
            .fetch_all_as(query)
            .await
    }

    async fn set_platform_domain_active(
        &self,
        id: i64,
        is_active: bool,
    ) -> Result<(), RepoError> {
        let query = sqlx::query("UPDATE platform_domains SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(is_active);
        self.db_pool
            .with_rw("domain", "set_platform_domain_active")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn add_resource_domain(
        &self,
        resource_id: i64,
        domain: &NewResourceDomain,
    ) -> Result<ResourceDomainRecord, RepoError> {
        let now = Utc::now();
        let (id,): (i64,) = self
            .db_pool
            .with_rw("domain", "add_resource_domain")
            .fetch_one_as(
                sqlx::query_as(
                    r#"
                      INSERT INTO resource_domains
                        (resource_id, domain, domain_source, subdomain_label,
                         platform_domain_id, is_primary, created_at)
                      VALUES ($1, $2, $3, $4, $5, $6, $7)
                      RETURNING id
                    "#,
                )
                .bind(resource_id)
                .bind(domain.domain.as_str())
                .bind(domain.domain_source.to_string())
                .bind(domain.subdomain_label.as_deref())
                .bind(domain.platform_domain_id)
                .bind(domain.is_primary)
                .bind(now),
            )
            .await?;
        Ok(ResourceDomainRecord {
            id,
            resource_id,
            domain: domain.domain.clone(),
            domain_source: domain.domain_source.to_string(),
            subdomain_label: domain.subdomain_label.clone(),
            platform_domain_id: domain.platform_domain_id,
            is_primary: domain.is_primary,
            created_at: now,
        })
    }

    async fn get_resource_domain(
        &self,
        id: i64,
    ) -> Result<Option<ResourceDomainRecord>, RepoError> {
        let query = sqlx::query_as::<_, ResourceDomainRecord>(
            "SELECT * FROM resource_domains WHERE id = $1",
        )
        .bind(id);
        self.db_pool
            .with_ro("domain", "get_resource_domain")
            .fetch_optional_as(query)
            .await
    }

    async fn list_resource_domains(
        &self,
        resource_id: i64,
    ) -> Result<Vec<ResourceDomainRecord>, RepoError> {
        let query = sqlx::query_as::<_, ResourceDomainRecord>(
            "SELECT * FROM resource_domains WHERE resource_id = $1 ORDER BY id",
        )
        .bind(resource_id);
        self.db_pool
            .with_ro("domain", "list_resource_domains")
            .fetch_all_as(query)
            .await
    }

    async fn get_primary_resource_domain(
        &self,
        resource_id: i64,
    ) -> Result<Option<ResourceDomainRecord>, RepoError> {
        let query = sqlx::query_as::<_, ResourceDomainRecord>(
            "SELECT * FROM resource_domains WHERE resource_id = $1 AND is_primary",
        )
        .bind(resource_id);
        self.db_pool
            .with_ro("domain", "get_primary_resource_domain")
            .fetch_optional_as(query)
            .await
    }

    async fn count_resource_domains(&self, resource_id: i64) -> Result<i64, RepoError> {
        let query = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM resource_domains WHERE resource_id = $1",
        )
        .bind(resource_id);
        let (count,) = self
            .db_pool
            .with_ro("domain", "count_resource_domains")
            .fetch_one_as(query)
            .await?;
        Ok(count)
    }

    async fn domain_exists(&self, domain: &str) -> Result<bool, RepoError> {
        let query = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM resource_domains WHERE domain = $1",
        )
        .bind(domain);
        let (count,) = self
            .db_pool
            .with_ro("domain", "domain_exists")
            .fetch_one_as(query)
            .await?;
        Ok(count > 0)
    }

    async fn update_resource_domain_hostname(
        &self,
        id: i64,
        hostname: &str,
    ) -> Result<(), RepoError> {
        let query = sqlx::query("UPDATE resource_domains SET domain = $2 WHERE id = $1")
            .bind(id)
            .bind(hostname);
        self.db_pool
            .with_rw("domain", "update_resource_domain_hostname")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn set_primary_resource_domain(
        &self,
        resource_id: i64,
        domain_id: i64,
    ) -> Result<(), RepoError> {
        let query = sqlx::query(
            "UPDATE resource_domains SET is_primary = (id = $2) WHERE resource_id = $1",
        )
        .bind(resource_id)
        .bind(domain_id);
        self.db_pool
            .with_rw("domain", "set_primary_resource_domain")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn remove_resource_domain(&self, id: i64) -> Result<(), RepoError> {
        let query = sqlx::query("DELETE FROM resource_domains WHERE id = $1").bind(id);
        self.db_pool
            .with_rw("domain", "remove_resource_domain")
            .execute(query)
            .await?;
        Ok(())
    }
}
