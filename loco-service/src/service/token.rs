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

use crate::auth::TokenAuthorisation;
use crate::config::TokensConfig;
use crate::model::{Token, UnsafeToken};
use crate::repo::scope::ScopeRepo;
use crate::repo::token::TokenRepo;
use crate::service::auth::{AuthService, AuthServiceError};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use loco_common::model::auth::{Entity, EntityScope, ScopeLevel, TokenSecret};
use loco_common::model::{TokenId, UserId};
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TokenServiceError {
    #[error("Token not found")]
    UnknownToken,
    #[error("Insufficient permissions for the requested scopes")]
    InsufficientPermissions,
    #[error("A token with this name already exists for the entity")]
    AlreadyExists,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthServiceError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for TokenServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::UniqueViolation(_) => TokenServiceError::AlreadyExists,
            RepoError::Internal(error) => TokenServiceError::Internal(error),
        }
    }
}

impl SafeDisplay for TokenServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            TokenServiceError::UnknownToken => self.to_string(),
            TokenServiceError::InsufficientPermissions => self.to_string(),
            TokenServiceError::AlreadyExists => self.to_string(),
            TokenServiceError::Validation(_) => self.to_string(),
            TokenServiceError::Auth(inner) => inner.to_safe_string(),
            TokenServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

/// The vending side of the TVM: issuing, listing and revoking opaque bearer
/// tokens. Secrets are random strings persisted with their scope list and
/// expiry; revocation is a row delete and takes effect immediately.
#[async_trait]
pub trait TokenService: Send + Sync {
    /// `Issue`: a named token over a subset of the issuer's scopes. The
    /// requested duration is clamped to the configured maximum.
    async fn create(
        &self,
        name: &str,
        entity: &Entity,
        scopes: &[EntityScope],
        duration: Duration,
        auth: &TokenAuthorisation,
    ) -> Result<UnsafeToken, TokenServiceError>;

    async fn get(
        &self,
        id: TokenId,
        auth: &TokenAuthorisation,
    ) -> Result<Token, TokenServiceError>;

    async fn list(
        &self,
        entity: &Entity,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<Token>, TokenServiceError>;

    async fn revoke(
        &self,
        id: TokenId,
        auth: &TokenAuthorisation,
    ) -> Result<(), TokenServiceError>;

    /// Self-revocation by secret; the logout path.
    async fn revoke_secret(&self, secret: &TokenSecret) -> Result<(), TokenServiceError>;

    /// The `Exchange` tail: an opaque login token carrying the user's full
    /// scope set at issue time, with the configured login TTL.
    async fn issue_login_token(&self, user_id: UserId) -> Result<UnsafeToken, TokenServiceError>;

    /// Startup seeding: a long-lived token with a preconfigured secret.
    /// Idempotent when the secret is already present.
    async fn create_known_secret(
        &self,
        user_id: UserId,
        secret: &TokenSecret,
        name: &str,
    ) -> Result<(), TokenServiceError>;

    async fn delete_expired(&self) -> Result<u64, TokenServiceError>;
}

pub struct TokenServiceDefault {
    token_repo: Arc<dyn TokenRepo>,
    scope_repo: Arc<dyn ScopeRepo>,
    auth_service: Arc<dyn AuthService>,
    config: TokensConfig,
}

impl TokenServiceDefault {
    pub fn new(
        token_repo: Arc<dyn TokenRepo>,
        scope_repo: Arc<dyn ScopeRepo>,
        auth_service: Arc<dyn AuthService>,
        config: TokensConfig,
    ) -> Self {
        Self {
            token_repo,
            scope_repo,
            auth_service,
            config,
        }
    }

    fn generate_secret() -> TokenSecret {
        let mut bytes = [0u8; 24];
        rand::rng().fill(&mut bytes);
        TokenSecret::new(format!("loco_{}", hex::encode(bytes)))
    }

    /// Read access to a token requires read on the token's target entity;
    /// revocation requires write.
    async fn check_entity_access(
        &self,
        entity: &Entity,
        level: ScopeLevel,
        auth: &TokenAuthorisation,
    ) -> Result<(), TokenServiceError> {
        let required = EntityScope {
            entity: *entity,
            level,
        };
        if self
            .auth_service
            .verify_with_given_entity_scopes(auth.scopes(), &required)
            .await?
        {
            Ok(())
        } else {
            Err(TokenServiceError::Auth(AuthServiceError::AccessDenied))
        }
    }
}

#[async_trait]
impl TokenService for TokenServiceDefault {
    async fn create(
        &self,
        name: &str,
        entity: &Entity,
        scopes: &[EntityScope],
        duration: Duration,
        auth: &TokenAuthorisation,
    ) -> Result<UnsafeToken, TokenServiceError> {
        if name.is_empty() {
            return Err(TokenServiceError::Validation(
                "Token name must not be empty".to_string(),
            ));
        }
        if scopes.is_empty() {
            return Err(TokenServiceError::Validation(
                "A token needs at least one scope".to_string(),
            ));
        }

        for scope in scopes {
            let held = self
                .auth_service
                .verify_with_given_entity_scopes(auth.scopes(), scope)
                .await?;
            if !held {
                return Err(TokenServiceError::InsufficientPermissions);
            }
        }

        let duration = duration.min(self.config.max_token_duration);
        let expires_at = Utc::now()
            + ChronoDuration::from_std(duration)
                .map_err(|err| TokenServiceError::Internal(err.to_string()))?;

        let secret = Self::generate_secret();
        let record = self
            .token_repo
            .create(name, &secret.value, entity, scopes, &expires_at)
            .await?;
        let token = record
            .try_into()
            .map_err(TokenServiceError::Internal)?;
        Ok(UnsafeToken::new(token, secret))
    }

    async fn get(
        &self,
        id: TokenId,
        auth: &TokenAuthorisation,
    ) -> Result<Token, TokenServiceError> {
        let record = self
            .token_repo
            .get(id.0)
            .await?
            .ok_or(TokenServiceError::UnknownToken)?;
        let token: Token = record.try_into().map_err(TokenServiceError::Internal)?;
        self.check_entity_access(&token.entity, ScopeLevel::Read, auth)
            .await?;
        Ok(token)
    }

    async fn list(
        &self,
        entity: &Entity,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<Token>, TokenServiceError> {
        self.check_entity_access(entity, ScopeLevel::Read, auth)
            .await?;
        let records = self.token_repo.list_for_entity(entity).await?;
        records
            .into_iter()
            .map(|record| record.try_into().map_err(TokenServiceError::Internal))
            .collect()
    }

    async fn revoke(
        &self,
        id: TokenId,
        auth: &TokenAuthorisation,
    ) -> Result<(), TokenServiceError> {
        let record = self
            .token_repo
            .get(id.0)
            .await?
            .ok_or(TokenServiceError::UnknownToken)?;
        let token: Token = record.try_into().map_err(TokenServiceError::Internal)?;
        self.check_entity_access(&token.entity, ScopeLevel::Write, auth)
            .await?;
        self.token_repo.delete(id.0).await?;
        Ok(())
    }

    async fn revoke_secret(&self, secret: &TokenSecret) -> Result<(), TokenServiceError> {
        self.token_repo.delete_by_secret(&secret.value).await?;
        Ok(())
    }

    async fn issue_login_token(&self, user_id: UserId) -> Result<UnsafeToken, TokenServiceError> {
        let scopes: Vec<EntityScope> = self
            .scope_repo
            .list_for_user(user_id.0)
            .await?
            .into_iter()
            .map(|record| record.try_into().map_err(TokenServiceError::Internal))
            .collect::<Result<_, _>>()?;

        let mut suffix = [0u8; 4];
        rand::rng().fill(&mut suffix);
        let name = format!("login-{}", hex::encode(suffix));

        let expires_at = Utc::now()
            + ChronoDuration::from_std(self.config.login_token_ttl)
                .map_err(|err| TokenServiceError::Internal(err.to_string()))?;
        let secret = Self::generate_secret();
        let record = self
            .token_repo
            .create(
                &name,
                &secret.value,
                &Entity::user(user_id.0),
                &scopes,
                &expires_at,
            )
            .await?;
        let token = record
            .try_into()
            .map_err(TokenServiceError::Internal)?;
        Ok(UnsafeToken::new(token, secret))
    }

    async fn create_known_secret(
        &self,
        user_id: UserId,
        secret: &TokenSecret,
        name: &str,
    ) -> Result<(), TokenServiceError> {
        let scopes: Vec<EntityScope> = self
            .scope_repo
            .list_for_user(user_id.0)
            .await?
            .into_iter()
            .map(|record| record.try_into().map_err(TokenServiceError::Internal))
            .collect::<Result<_, _>>()?;
        let expires_at = Utc::now() + ChronoDuration::days(10 * 365);
        match self
            .token_repo
            .create(
                name,
                &secret.value,
                &Entity::user(user_id.0),
                &scopes,
                &expires_at,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(RepoError::UniqueViolation(_)) => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    async fn delete_expired(&self) -> Result<u64, TokenServiceError> {
        Ok(self.token_repo.delete_expired(&Utc::now()).await?)
    }
}
