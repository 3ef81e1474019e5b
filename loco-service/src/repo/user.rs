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

use crate::model::User;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::auth::{Entity, EntityScope};
use loco_common::model::UserId;
use loco_common::repo::RepoError;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        User {
            id: UserId(value.id),
            external_id: value.external_id,
            email: value.email,
            name: value.name,
            avatar: value.avatar,
            created_at: value.created_at,
        }
    }
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Inserts the user and grants it the owner scope set on itself, in one
    /// transaction.
    async fn create(
        &self,
        external_id: &str,
        email: &str,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<UserRecord, RepoError>;

    async fn get(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn get_by_external_id(&self, external_id: &str)
        -> Result<Option<UserRecord>, RepoError>;

    async fn list(&self, limit: i64, cursor: Option<i64>) -> Result<Vec<UserRecord>, RepoError>;

    async fn update_avatar(&self, id: i64, avatar: Option<&str>) -> Result<(), RepoError>;

    /// Removes the user row, its held scopes, scopes granted on it and its
    /// tokens. Business preconditions (no owned orgs, no memberships) are
    /// checked by the service layer.
    async fn delete(&self, id: i64) -> Result<(), RepoError>;
}

pub struct DbUserRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbUserRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl UserRepo for DbUserRepo<loco_common::db::postgres::PostgresPool> {
    async fn create(
        &self,
        external_id: &str,
        email: &str,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<UserRecord, RepoError> {
        let now = Utc::now();
        let mut tx = self.db_pool.with_rw("user", "create").begin().await?;

        let (id,): (i64,) = tx
            .fetch_one_as(
                sqlx::query_as(
                    r#"
                      INSERT INTO users (external_id, email, name, avatar, created_at)
                      VALUES ($1, $2, $3, $4, $5)
                      RETURNING id
                    "#,
                )
                .bind(external_id)
                .bind(email)
                .bind(name)
                .bind(avatar)
                .bind(now),
            )
            .await?;

        for scope in EntityScope::owner_set(Entity::user(id)) {
            tx.execute(
                sqlx::query(
                    r#"
                      INSERT INTO user_scopes (user_id, entity_type, entity_id, scope, created_at)
                      VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(id)
                .bind(scope.entity.entity_type.to_string())
                .bind(scope.entity.entity_id)
                .bind(scope.level.to_string())
                .bind(now),
            )
            .await?;
        }

        tx.commit().await?;

        Ok(UserRecord {
            id,
            external_id: external_id.to_string(),
            email: email.to_string(),
            name: name.to_string(),
            avatar: avatar.map(|avatar| avatar.to_string()),
            created_at: now,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let query = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1").bind(id);
        self.db_pool
            .with_ro("user", "get")
            .fetch_optional_as(query)
            .await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let query =
            sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = $1").bind(email);
        self.db_pool
            .with_ro("user", "get_by_email")
            .fetch_optional_as(query)
            .await
    }

    async fn get_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let query = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE external_id = $1")
            .bind(external_id);
        self.db_pool
            .with_ro("user", "get_by_external_id")
            .fetch_optional_as(query)
            .await
    }

    async fn list(&self, limit: i64, cursor: Option<i64>) -> Result<Vec<UserRecord>, RepoError> {
        let query = sqlx::query_as::<_, UserRecord>(
            r#"
              SELECT * FROM users
              WHERE $1 IS NULL
                 OR (created_at, id) < (SELECT created_at, id FROM users WHERE id = $1)
              ORDER BY created_at DESC, id DESC
              LIMIT $2
            "#,
        )
        .bind(cursor)
        .bind(limit);
        self.db_pool
            .with_ro("user", "list")
            .fetch_all_as(query)
            .await
    }

    async fn update_avatar(&self, id: i64, avatar: Option<&str>) -> Result<(), RepoError> {
        let query = sqlx::query("UPDATE users SET avatar = $2 WHERE id = $1")
            .bind(id)
            .bind(avatar);
        self.db_pool
            .with_rw("user", "update_avatar")
            .execute(query)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        let mut tx = self.db_pool.with_rw("user", "delete").begin().await?;
        tx.execute(sqlx::query("DELETE FROM user_scopes WHERE user_id = $1").bind(id))
            .await?;
        tx.execute(
            sqlx::query("DELETE FROM user_scopes WHERE entity_type = 'user' AND entity_id = $1")
                .bind(id),
        )
        .await?;
        tx.execute(
            sqlx::query("DELETE FROM tokens WHERE entity_type = 'user' AND entity_id = $1")
                .bind(id),
        )
        .await?;
        tx.execute(sqlx::query("DELETE FROM users WHERE id = $1").bind(id))
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
