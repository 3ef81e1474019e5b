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

use crate::model::Token;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conditional_trait_gen::trait_gen;
use loco_common::db::Pool;
use loco_common::model::auth::{Entity, EntityScope, EntityType};
use loco_common::model::TokenId;
use loco_common::repo::RepoError;
use std::str::FromStr;

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct TokenRecord {
    pub id: i64,
    pub name: String,
    pub secret: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub scopes: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TokenRecord> for Token {
    type Error = String;

    fn try_from(value: TokenRecord) -> Result<Self, Self::Error> {
        let entity_type = EntityType::from_str(&value.entity_type)?;
        let scopes: Vec<EntityScope> = serde_json::from_str(&value.scopes)
            .map_err(|err| format!("Invalid token scopes: {err}"))?;
        Ok(Token {
            id: TokenId(value.id),
            name: value.name,
            entity: Entity::new(entity_type, value.entity_id),
            scopes,
            expires_at: value.expires_at,
            created_at: value.created_at,
        })
    }
}

#[async_trait]
pub trait TokenRepo: Send + Sync {
    async fn create(
        &self,
        name: &str,
        secret: &str,
        entity: &Entity,
        scopes: &[EntityScope],
        expires_at: &DateTime<Utc>,
    ) -> Result<TokenRecord, RepoError>;

    async fn get(&self, id: i64) -> Result<Option<TokenRecord>, RepoError>;

    /// Looks the token up by its secret, filtering out expired rows.
    async fn get_by_secret_valid(
        &self,
        secret: &str,
        now: &DateTime<Utc>,
    ) -> Result<Option<TokenRecord>, RepoError>;

    async fn list_for_entity(&self, entity: &Entity) -> Result<Vec<TokenRecord>, RepoError>;

    async fn delete(&self, id: i64) -> Result<bool, RepoError>;

    async fn delete_by_secret(&self, secret: &str) -> Result<bool, RepoError>;

    async fn delete_expired(&self, now: &DateTime<Utc>) -> Result<u64, RepoError>;
}

pub struct DbTokenRepo<DB: Pool> {
    db_pool: DB,
}

impl<DB: Pool> DbTokenRepo<DB> {
    pub fn new(db_pool: DB) -> Self {
        Self { db_pool }
    }
}

#[trait_gen(loco_common::db::postgres::PostgresPool -> loco_common::db::postgres::PostgresPool, loco_common::db::sqlite::SqlitePool)]
#[async_trait]
impl TokenRepo for DbTokenRepo<loco_common::db::postgres::PostgresPool> {
    async fn create(
        &self,
        name: &str,
        secret: &str,
        entity: &Entity,
        scopes: &[EntityScope],
        expires_at: &DateTime<Utc>,
    ) -> Result<TokenRecord, RepoError> {
        let now = Utc::now();
        let scopes_json = serde_json::to_string(scopes)
            .map_err(|err| RepoError::Internal(format!("Failed to serialize scopes: {err}")))?;
        let (id,): (i64,) = self
            .db_pool
            .with_rw("token", "create")
            .fetch_one_as(
                sqlx::query_as(
                    r#"
                      INSERT INTO tokens
                        (name, secret, entity_type, entity_id, scopes, expires_at, created_at)
                      VALUES ($1, $2, $3, $4, $5, $6, $7)
                      RETURNING id
                    "#,
                )
                .bind(name)
                .bind(secret)
                .bind(entity.entity_type.to_string())
                .bind(entity.entity_id)
                .bind(scopes_json.as_str())
                .bind(expires_at)
                .bind(now),
            )
            .await?;
        Ok(TokenRecord {
            id,
            name: name.to_string(),
            secret: secret.to_string(),
            entity_type: entity.entity_type.to_string(),
            entity_id: entity.entity_id,
            scopes: scopes_json,
            expires_at: *expires_at,
            created_at: now,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<TokenRecord>, RepoError> {
        let query =
            sqlx::query_as::<_, TokenRecord>("SELECT * FROM tokens WHERE id = $1").bind(id);
        self.db_pool
            .with_ro("token", "get")
            .fetch_optional_as(query)
            .await
    }

    async fn get_by_secret_valid(
        &self,
        secret: &str,
        now: &DateTime<Utc>,
    ) -> Result<Option<TokenRecord>, RepoError> {
        let query = sqlx::query_as::<_, TokenRecord>(
            "SELECT * FROM tokens WHERE secret = $1 AND expires_at > $2",
        )
        .bind(secret)
        .bind(now);
        self.db_pool
            .with_ro("token", "get_by_secret_valid")
            .fetch_optional_as(query)
            .await
    }

    async fn list_for_entity(&self, entity: &Entity) -> Result<Vec<TokenRecord>, RepoError> {
        let query = sqlx::query_as::<_, TokenRecord>(
            "SELECT * FROM tokens WHERE entity_type = $1 AND entity_id = $2 ORDER BY created_at DESC, id DESC",
        )
        .bind(entity.entity_type.to_string())
        .bind(entity.entity_id);
        self.db_pool
            .with_ro("token", "list_for_entity")
            .fetch_all_as(query)
            .await
    }

    async fn delete(&self, id: i64) -> Result<bool, RepoError> {
        let query = sqlx::query("DELETE FROM tokens WHERE id = $1").bind(id);
        let result = self.db_pool.with_rw("token", "delete").execute(query).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_secret(&self, secret: &str) -> Result<bool, RepoError> {
        let query = sqlx::query("DELETE FROM tokens WHERE secret = $1").bind(secret);
        let result = self
            .db_pool
            .with_rw("token", "delete_by_secret")
            .execute(query)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: &DateTime<Utc>) -> Result<u64, RepoError> {
        let query = sqlx::query("DELETE FROM tokens WHERE expires_at <= $1").bind(now);
        let result = self
            .db_pool
            .with_rw("token", "delete_expired")
            .execute(query)
            .await?;
        Ok(result.rows_affected())
    }
}
