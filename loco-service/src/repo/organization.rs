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

use crate::model::Organization;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::auth::{Entity, EntityScope};
use loco_common::model::{OrgId, UserId};
use loco_common::repo::RepoError;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct OrganizationRecord {
    pub id: i64,
    pub name: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl From<OrganizationRecord> for Organization {
    fn from(value: OrganizationRecord) -> Self {
        Organization {
            id: OrgId(value.id),
            name: value.name,
            created_by: UserId(value.created_by),
            created_at: value.created_at,
        }
    }
}

#[async_trait]
pub trait OrganizationRepo: Send + Sync {
    /// Inserts the organization, the creator's membership and the creator's
    /// owner scope set, in one transaction.
    async fn create(&self, name: &str, created_by: i64)
        -> Result<OrganizationRecord, RepoError>;

    async fn get(&self, id: i64) -> Result<Option<OrganizationRecord>, RepoError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<OrganizationRecord>, RepoError>;

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<OrganizationRecord>, RepoError>;

    async fn update_name(&self, id: i64, name: &str) -> Result<(), RepoError>;

    async fn delete(&self, id: i64) -> Result<(), RepoError>;

    async fn count_workspaces(&self, id: i64) -> Result<i64, RepoError>;

    /// Resources anywhere under the organization's workspaces.
    async fn count_resources(&self, id: i64) -> Result<i64, RepoError>;

    async fn count_owned_by_user(&self, user_id: i64) -> Result<i64, RepoError>;
}

pub struct DbOrganizationRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbOrganizationRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl OrganizationRepo for DbOrganizationRepo<loco_common::db::postgres::PostgresPool> {
    async fn create(
        &self,
        name: &str,
        created_by: i64,
    ) -> Result<OrganizationRecord, RepoError> {
        let now = Utc::now();
        let mut tx = self.db_pool.with_rw("organization", "create").begin().await?;

        let (id,): (i64,) = tx
            .fetch_one_as(
                sqlx::query_as(
                    r#"
                      INSERT INTO organizations (name, created_by, created_at)
                      VALUES ($1, $2, $3)
                      RETURNING id
                    "#,
                )
                .bind(name)
                .bind(created_by)
                .bind(now),
            )
            .await?;

        tx.execute(
            sqlx::query(
                r#"
                  INSERT INTO organization_members (organization_id, user_id, created_at)
                  VALUES ($1, $2, $3)
                "#,
            )
            .bind(id)
            .bind(created_by)
            .bind(now),
        )
        .await?;

        for scope in EntityScope::owner_set(Entity::organization(id)) {
            tx.execute(
                sqlx::query(
                    r#"
                      INSERT INTO user_scopes (user_id, entity_type, entity_id, scope, created_at)
                      VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(created_by)
                .bind(scope.entity.entity_type.to_string())
                .bind(scope.entity.entity_id)
                .bind(scope.level.to_string())
                .bind(now),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(OrganizationRecord {
            id,
            name: name.to_string(),
            created_by,
            created_at: now,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<OrganizationRecord>, RepoError> {
        let query = sqlx::query_as::<_, OrganizationRecord>(
            "SELECT * FROM organizations WHERE id = $1",
        )
        .bind(id);
        self.db_pool
            .with_ro("organization", "get")
            .fetch_optional_as(query)
            .await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<OrganizationRecord>, RepoError> {
        let query = sqlx::query_as::<_, OrganizationRecord>(
            "SELECT * FROM organizations WHERE name = $1",
        )
        .bind(name);
        self.db_pool
            .with_ro("organization", "get_by_name")
            .fetch_optional_as(query)
            .await
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<OrganizationRecord>, RepoError> {
        let query = sqlx::query_as::<_, OrganizationRecord>(
            r#"
              SELECT o.id, o.name, o.created_by, o.created_at
              FROM organizations o
              JOIN organization_members m ON m.organization_id = o.id
              WHERE m.user_id = $1
                AND ($2 IS NULL
                     OR (o.created_at, o.id) <
                        (SELECT created_at, id FROM organizations WHERE id = $2))
              ORDER BY o.created_at DESC, o.id DESC
              LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(cursor)
        .bind(limit);
        self.db_pool
            .with_ro("organization", "list_for_user")
            .fetch_all_as(query)
            .await
    }

    async fn update_name(&self, id: i64, name: &str) -> Result<(), RepoError> {
        let query = sqlx::query("UPDATE organizations SET name = $2 WHERE id = $1")
            .bind(id)
            .bind(name);
        self.db_pool
            .with_rw("organization", "update_name")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        let mut tx = self.db_pool.with_rw("organization", "delete").begin().await?;
        tx.execute(
            sqlx::query("DELETE FROM organization_members WHERE organization_id = $1").bind(id),
        )
        .await?;
        tx.execute(
            sqlx::query(
                "DELETE FROM user_scopes WHERE entity_type = 'organization' AND entity_id = $1",
            )
            .bind(id),
        )
        .await?;
        tx.execute(
            sqlx::query("DELETE FROM tokens WHERE entity_type = 'organization' AND entity_id = $1")
                .bind(id),
        )
        .await?;
        tx.execute(sqlx::query("DELETE FROM organizations WHERE id = $1").bind(id))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn count_workspaces(&self, id: i64) -> Result<i64, RepoError> {
        let query = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM workspaces WHERE organization_id = $1",
        )
        .bind(id);
        let (count,) = self
            .db_pool
            .with_ro("organization", "count_workspaces")
            .fetch_one_as(query)
            .await?;
        Ok(count)
    }

    async fn count_resources(&self, id: i64) -> Result<i64, RepoError> {
        let query = sqlx::query_as::<_, (i64,)>(
            r#"
              SELECT COUNT(*)
              FROM resources r
              JOIN workspaces w ON r.workspace_id = w.id
              WHERE w.organization_id = $1
            "#,
        )
        .bind(id);
        let (count,) = self
            .db_pool
            .with_ro("organization", "count_resources")
            .fetch_one_as(query)
            .await?;
        Ok(count)
    }

    async fn count_owned_by_user(&self, user_id: i64) -> Result<i64, RepoError> {
        let query = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM organizations WHERE created_by = $1",
        )
        .bind(user_id);
        let (count,) = self
            .db_pool
            .with_ro("organization", "count_owned_by_user")
            .fetch_one_as(query)
            .await?;
        Ok(count)
    }
}
