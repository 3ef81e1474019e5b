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

use async_trait::async_trait;
use chrono::Utc;
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::auth::{Entity, EntityScope, EntityType, ScopeLevel};
use loco_common::repo::RepoError;
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct UserScopeRecord {
    pub user_id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub scope: String,
}

impl TryFrom<UserScopeRecord> for EntityScope {
    type Error = String;

    fn try_from(value: UserScopeRecord) -> Result<Self, Self::Error> {
        Ok(EntityScope {
            entity: Entity::new(EntityType::from_str(&value.entity_type)?, value.entity_id),
            level: ScopeLevel::from_str(&value.scope)?,
        })
    }
}

#[async_trait]
pub trait ScopeRepo: Send + Sync {
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<UserScopeRecord>, RepoError>;

    /// Idempotent single grant.
    async fn grant(&self, user_id: i64, scope: &EntityScope) -> Result<(), RepoError>;

    /// Applies the grant and revoke lists in one transaction.
    async fn update_roles(
        &self,
        user_id: i64,
        grant: &[EntityScope],
        revoke: &[EntityScope],
    ) -> Result<(), RepoError>;
}

pub struct DbScopeRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbScopeRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl ScopeRepo for DbScopeRepo<loco_common::db::postgres::PostgresPool> {
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<UserScopeRecord>, RepoError> {
        let query = sqlx::query_as::<_, UserScopeRecord>(
            "SELECT user_id, entity_type, entity_id, scope FROM user_scopes WHERE user_id = $1",
        )
        .bind(user_id);
        self.db_pool
            .with_ro("scope", "list_for_user")
            .fetch_all_as(query)
            .await
    }

    async fn grant(&self, user_id: i64, scope: &EntityScope) -> Result<(), RepoError> {
        let query = sqlx::query(
            r#"
              INSERT INTO user_scopes (user_id, entity_type, entity_id, scope, created_at)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (user_id, entity_type, entity_id, scope) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(scope.entity.entity_type.to_string())
        .bind(scope.entity.entity_id)
        .bind(scope.level.to_string())
        .bind(Utc::now());
        self.db_pool.with_rw("scope", "grant").execute(query).await?;
        Ok(())
    }

    async fn update_roles(
        &self,
        user_id: i64,
        grant: &[EntityScope],
        revoke: &[EntityScope],
    ) -> Result<(), RepoError> {
        let now = Utc::now();
        let mut tx = self.db_pool.with_rw("scope", "update_roles").begin().await?;
        for scope in grant {
            tx.execute(
                sqlx::query(
                    r#"
                      INSERT INTO user_scopes (user_id, entity_type, entity_id, scope, created_at)
                      VALUES ($1, $2, $3, $4, $5)
                      ON CONFLICT (user_id, entity_type, entity_id, scope) DO NOTHING
                    "#,
                )
                .bind(user_id)
                .bind(scope.entity.entity_type.to_string())
                .bind(scope.entity.entity_id)
                .bind(scope.level.to_string())
                .bind(now),
            )
            .await?;
        }
        for scope in revoke {
            tx.execute(
                sqlx::query(
                    r#"
                      DELETE FROM user_scopes
                      WHERE user_id = $1 AND entity_type = $2 AND entity_id = $3 AND scope = $4
                    "#,
                )
                .bind(user_id)
                .bind(scope.entity.entity_type.to_string())
                .bind(scope.entity.entity_id)
                .bind(scope.level.to_string()),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
