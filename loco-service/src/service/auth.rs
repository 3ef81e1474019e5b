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
use crate::repo::resource::ResourceRepo;
use crate::repo::token::TokenRepo;
use crate::repo::workspace::WorkspaceRepo;
use async_trait::async_trait;
use chrono::Utc;
use loco_common::model::auth::{Action, Entity, EntityScope, EntityType};
use loco_common::model::auth::TokenSecret;
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Permission denied")]
    AccessDenied,
    #[error(transparent)]
    InternalRepoError(#[from] RepoError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SafeDisplay for AuthServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            // Policy denials never reveal which sub-condition failed; the
            // full context goes to the server log instead.
            AuthServiceError::InvalidToken => self.to_string(),
            AuthServiceError::AccessDenied => self.to_string(),
            AuthServiceError::InternalRepoError(inner) => inner.to_safe_string(),
            AuthServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

/// The Token-Vending Authorization Machine's policy side: token
/// verification and action-to-scope policy checks over the entity
/// hierarchy `system > organization > workspace > resource`.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// `Verify`: loads the unexpired token row behind the opaque secret and
    /// returns the bearer entity with its token scopes.
    async fn authorization(
        &self,
        secret: &TokenSecret,
    ) -> Result<TokenAuthorisation, AuthServiceError>;

    /// Resolves the action through the static action table and checks the
    /// bearer's scopes against the required scope.
    async fn authorize(
        &self,
        auth: &TokenAuthorisation,
        action: Action,
        entity_id: i64,
    ) -> Result<(), AuthServiceError>;

    /// The hot-path policy check: does any held scope satisfy the required
    /// one under level ordering and hierarchy inclusion?
    async fn verify_with_given_entity_scopes(
        &self,
        held: &[EntityScope],
        required: &EntityScope,
    ) -> Result<bool, AuthServiceError>;
}

pub struct AuthServiceDefault {
    token_repo: Arc<dyn TokenRepo>,
    workspace_repo: Arc<dyn WorkspaceRepo>,
    resource_repo: Arc<dyn ResourceRepo>,
}

impl AuthServiceDefault {
    pub fn new(
        token_repo: Arc<dyn TokenRepo>,
        workspace_repo: Arc<dyn WorkspaceRepo>,
        resource_repo: Arc<dyn ResourceRepo>,
    ) -> Self {
        Self {
            token_repo,
            workspace_repo,
            resource_repo,
        }
    }

    /// One ancestry hop. Results are cached per authorization call so a
    /// check over many held scopes costs at most one lookup per entity.
    async fn parent_of(
        &self,
        entity: &Entity,
        cache: &mut HashMap<Entity, Option<Entity>>,
    ) -> Result<Option<Entity>, AuthServiceError> {
        if let Some(parent) = cache.get(entity) {
            return Ok(*parent);
        }
        let parent = match entity.entity_type {
            EntityType::Resource => self
                .resource_repo
                .get(entity.entity_id)
                .await?
                .map(|resource| Entity::workspace(resource.workspace_id)),
            EntityType::Workspace => self
                .workspace_repo
                .get(entity.entity_id)
                .await?
                .map(|workspace| Entity::organization(workspace.organization_id)),
            EntityType::Organization => Some(Entity::system()),
            EntityType::System | EntityType::User => None,
        };
        cache.insert(*entity, parent);
        Ok(parent)
    }

    async fn satisfies(
        &self,
        held: &EntityScope,
        required: &EntityScope,
        cache: &mut HashMap<Entity, Option<Entity>>,
    ) -> Result<bool, AuthServiceError> {
        if !held.level.covers(required.level) {
            return Ok(false);
        }
        if held.entity == required.entity {
            return Ok(true);
        }
        // System scopes satisfy anything of lower or equal level.
        if held.entity.entity_type == EntityType::System {
            return Ok(true);
        }
        // Otherwise the held entity must be a strict ancestor of the
        // required one, and the links must hold in the database.
        let mut current = required.entity;
        while let Some(parent) = self.parent_of(&current, cache).await? {
            if parent == held.entity {
                return Ok(true);
            }
            current = parent;
        }
        Ok(false)
    }
}

#[async_trait]
impl AuthService for AuthServiceDefault {
    async fn authorization(
        &self,
        secret: &TokenSecret,
    ) -> Result<TokenAuthorisation, AuthServiceError> {
        let now = Utc::now();
        let record = self
            .token_repo
            .get_by_secret_valid(&secret.value, &now)
            .await?
            .ok_or(AuthServiceError::InvalidToken)?;
        let token = record
            .try_into()
            .map_err(AuthServiceError::Internal)?;
        Ok(TokenAuthorisation::new(token))
    }

    async fn authorize(
        &self,
        auth: &TokenAuthorisation,
        action: Action,
        entity_id: i64,
    ) -> Result<(), AuthServiceError> {
        let required = action.requires(entity_id);
        if self
            .verify_with_given_entity_scopes(auth.scopes(), &required)
            .await?
        {
            Ok(())
        } else {
            warn!(
                bearer = %auth.entity(),
                %action,
                %required,
                "authorization denied"
            );
            Err(AuthServiceError::AccessDenied)
        }
    }

    async fn verify_with_given_entity_scopes(
        &self,
        held: &[EntityScope],
        required: &EntityScope,
    ) -> Result<bool, AuthServiceError> {
        let mut cache = HashMap::new();
        for scope in held {
            if self.satisfies(scope, required, &mut cache).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
