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

use crate::model::{Workspace, WorkspaceMember, WorkspaceRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::auth::{Entity, EntityScope};
use loco_common::model::{OrgId, UserId, WorkspaceId};
use loco_common::repo::RepoError;
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct WorkspaceRecord {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub description: String,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl From<WorkspaceRecord> for Workspace {
    fn from(value: WorkspaceRecord) -> Self {
        Workspace {
            id: WorkspaceId(value.id),
            organization_id: OrgId(value.organization_id),
            name: value.name,
            description: value.description,
            created_by: UserId(value.created_by),
            created_at: value.created_at,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct WorkspaceMemberRecord {
    pub workspace_id: i64,
    pub user_id: i64,
    pub role: String,
}

impl TryFrom<WorkspaceMemberRecord> for WorkspaceMember {
    type Error = String;

    fn try_from(value: WorkspaceMemberRecord) -> Result<Self, Self::Error> {
        Ok(WorkspaceMember {
            workspace_id: WorkspaceId(value.workspace_id),
            user_id: UserId(value.user_id),
            role: WorkspaceRole::from_str(&value.role)?,
        })
    }
}

#[async_trait]
pub trait WorkspaceRepo: Send + Sync {
    /// Inserts the workspace, the creator's (legacy) admin membership and the
    /// creator's owner scope set, in one transaction.
    async fn create(
        &self,
        organization_id: i64,
        name: &str,
        description: &str,
        created_by: i64,
    ) -> Result<WorkspaceRecord, RepoError>;

    async fn get(&self, id: i64) -> Result<Option<WorkspaceRecord>, RepoError>;

    async fn get_by_name(
        &self,
        organization_id: i64,
        name: &str,
    ) -> Result<Option<WorkspaceRecord>, RepoError>;

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<WorkspaceRecord>, RepoError>;

    async fn list_for_organization(
        &self,
        organization_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<WorkspaceRecord>, RepoError>;

    async fn update(&self, id: i64, name: &str, description: &str) -> Result<(), RepoError>;

    async fn delete(&self, id: i64) -> Result<(), RepoError>;

    async fn list_members(&self, id: i64) -> Result<Vec<WorkspaceMemberRecord>, RepoError>;

    async fn count_memberships(&self, user_id: i64) -> Result<i64, RepoError>;

    async fn count_resources(&self, id: i64) -> Result<i64, RepoError>;
}

pub struct DbWorkspaceRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbWorkspaceRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl WorkspaceRepo for DbWorkspaceRepo<loco_common::db::postgres::PostgresPool> {
    async fn create(
        &self,
        organization_id: i64,
        name: &str,
        description: &str,
        created_by: i64,
    ) -> Result<WorkspaceRecord, RepoError> {
        let now = Utc::now();
        let mut tx = self.db_pool.with_rw("workspace", "create").begin().await?;

        let (id,): (i64,) = tx
            .fetch_one_as(
                sqlx::query_as(
                    r#"
                      INSERT INTO workspaces
                        (organization_id, name, description, created_by, created_at)
                      VALUES ($1, $2, $3, $4, $5)
                      RETURNING id
                    "#,
                )
                .bind(organization_id)
                .bind(name)
                .bind(description)
                .bind(created_by)
                .bind(now),
            )
            .await?;

        tx.execute(
            sqlx::query(
                r#"
                  INSERT INTO workspace_members (workspace_id, user_id, role, created_at)
                  VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id)
            .bind(created_by)
            .bind(WorkspaceRole::Admin.to_string())
            .bind(now),
        )
        .await?;

        for scope in EntityScope::owner_set(Entity::workspace(id)) {
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

        Ok(WorkspaceRecord {
            id,
            organization_id,
            name: name.to_string(),
            description: description.to_string(),
            created_by,
            created_at: now,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<WorkspaceRecord>, RepoError> {
        let query =
            sqlx::query_as::<_, WorkspaceRecord>("SELECT * FROM workspaces WHERE id = $1").bind(id);
        self.db_pool
            .with_ro("workspace", "get")
            .fetch_optional_as(query)
            .await
    }

    async fn get_by_name(
        &self,
        organization_id: i64,
        name: &str,
    ) -> Result<Option<WorkspaceRecord>, RepoError> {
        let query = sqlx::query_as::<_, WorkspaceRecord>(
            "SELECT * FROM workspaces WHERE organization_id = $1 AND name = $2",
        )
        .bind(organization_id)
        .bind(name);
        self.db_pool
            .with_ro("workspace", "get_by_name")
            .fetch_optional_as(query)
            .await
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<WorkspaceRecord>, RepoError> {
        let query = sqlx::query_as::<_, WorkspaceRecord>(
            r#"
              SELECT w.id, w.organization_id, w.name, w.description, w.created_by, w.created_at
              FROM workspaces w
              JOIN workspace_members m ON m.workspace_id = w.id
              WHERE m.user_id = $1
                AND ($2 IS NULL
                     OR (w.created_at, w.id) <
                        (SELECT created_at, id FROM workspaces WHERE id = $2))
              ORDER BY w.created_at DESC, w.id DESC
              LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(cursor)
        .bind(limit);
        self.db_pool
            .with_ro("workspace", "list_for_user")
            .fetch_all_as(query)
            .await
    }

    async fn list_for_organization(
        &self,
        organization_id: i64,
        limit: i64,
        cursor: Option<i64>,
    ) -> Result<Vec<WorkspaceRecord>, RepoError> {
        let query = sqlx::query_as::<_, WorkspaceRecord>(
            r#"
              SELECT * FROM workspaces
              WHERE organization_id = $1
                AND ($2 IS NULL
                     OR (created_at, id) <
                        (SELECT created_at, id FROM workspaces WHERE id = $2))
              ORDER BY created_at DESC, id DESC
              LIMIT $3
            "#,
        )
        .bind(organization_id)
        .bind(cursor)
        .bind(limit);
        self.db_pool
            .with_ro("workspace", "list_for_organization")
            .fetch_all_as(query)
            .await
    }

    async fn update(&self, id: i64, name: &str, description: &str) -> Result<(), RepoError> {
        let query =
            sqlx::query("UPDATE workspaces SET name = $2, description = $3 WHERE id = $1")
                .bind(id)
                .bind(name)
                .bind(description);
        self.db_pool
            .with_rw("workspace", "update")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        let mut tx = self.db_pool.with_rw("workspace", "delete").begin().await?;
        tx.execute(sqlx::query("DELETE FROM workspace_members WHERE workspace_id = $1").bind(id))
            .await?;
        tx.execute(
            sqlx::query(
                "DELETE FROM user_scopes WHERE entity_type = 'workspace' AND entity_id = $1",
            )
            .bind(id),
        )
        .await?;
        tx.execute(
            sqlx::query("DELETE FROM tokens WHERE entity_type = 'workspace' AND entity_id = $1")
                .bind(id),
        )
        .await?;
        tx.execute(sqlx::query("DELETE FROM workspaces WHERE id = $1").bind(id))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_members(&self, id: i64) -> Result<Vec<WorkspaceMemberRecord>, RepoError> {
        let query = sqlx::query_as::<_, WorkspaceMemberRecord>(
            "SELECT workspace_id, user_id, role FROM workspace_members WHERE workspace_id = $1",
        )
        .bind(id);
        self.db_pool
            .with_ro("workspace", "list_members")
            .fetch_all_as(query)
            .await
    }

    async fn count_memberships(&self, user_id: i64) -> Result<i64, RepoError> {
        let query = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM workspace_members WHERE user_id = $1",
        )
        .bind(user_id);
        let (count,) = self
            .db_pool
            .with_ro("workspace", "count_memberships")
            .fetch_one_as(query)
            .await?;
        Ok(count)
    }

    async fn count_resources(&self, id: i64) -> Result<i64, RepoError> {
        let query =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM resources WHERE workspace_id = $1")
                .bind(id);
        let (count,) = self
            .db_pool
            .with_ro("workspace", "count_resources")
            .fetch_one_as(query)
            .await?;
        Ok(count)
    }
}
