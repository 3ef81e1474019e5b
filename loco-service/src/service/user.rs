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
use crate::model::User;
use crate::repo::organization::OrganizationRepo;
use crate::repo::scope::ScopeRepo;
use crate::repo::user::UserRepo;
use crate::repo::workspace::WorkspaceRepo;
use crate::service::auth::{AuthService, AuthServiceError};
use async_trait::async_trait;
use loco_common::model::auth::{Action, EntityScope};
use loco_common::model::UserId;
use loco_common::paging;
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("User not found")]
    NotFound,
    #[error("A user with this email or external id already exists")]
    AlreadyExists,
    #[error("User still owns organizations or holds workspace memberships")]
    DeleteBlocked,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthServiceError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for UserServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::UniqueViolation(_) => UserServiceError::AlreadyExists,
            RepoError::Internal(error) => UserServiceError::Internal(error),
        }
    }
}

impl SafeDisplay for UserServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            UserServiceError::NotFound => self.to_string(),
            UserServiceError::AlreadyExists => self.to_string(),
            UserServiceError::DeleteBlocked => self.to_string(),
            UserServiceError::Validation(_) => self.to_string(),
            UserServiceError::Auth(inner) => inner.to_safe_string(),
            UserServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

#[async_trait]
pub trait UserService: Send + Sync {
    /// System-gated provisioning; regular users are only created through the
    /// OAuth exchange.
    async fn create(
        &self,
        external_id: &str,
        email: &str,
        name: &str,
        avatar: Option<&str>,
        auth: &TokenAuthorisation,
    ) -> Result<User, UserServiceError>;

    async fn get(&self, id: UserId, auth: &TokenAuthorisation)
        -> Result<User, UserServiceError>;

    /// Fleet-operator lookup; also used by startup account seeding.
    async fn find_by_email(
        &self,
        email: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Option<User>, UserServiceError>;

    async fn who_am_i(&self, auth: &TokenAuthorisation) -> Result<User, UserServiceError>;

    async fn update_avatar(
        &self,
        id: UserId,
        avatar: Option<&str>,
        auth: &TokenAuthorisation,
    ) -> Result<User, UserServiceError>;

    async fn list(
        &self,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<User>, String), UserServiceError>;

    async fn delete(&self, id: UserId, auth: &TokenAuthorisation)
        -> Result<(), UserServiceError>;

    async fn update_roles(
        &self,
        user_id: UserId,
        grant: &[EntityScope],
        revoke: &[EntityScope],
        auth: &TokenAuthorisation,
    ) -> Result<(), UserServiceError>;
}

pub struct UserServiceDefault {
    user_repo: Arc<dyn UserRepo>,
    organization_repo: Arc<dyn OrganizationRepo>,
    workspace_repo: Arc<dyn WorkspaceRepo>,
    scope_repo: Arc<dyn ScopeRepo>,
    auth_service: Arc<dyn AuthService>,
}

impl UserServiceDefault {
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        organization_repo: Arc<dyn OrganizationRepo>,
        workspace_repo: Arc<dyn WorkspaceRepo>,
        scope_repo: Arc<dyn ScopeRepo>,
        auth_service: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            user_repo,
            organization_repo,
            workspace_repo,
            scope_repo,
            auth_service,
        }
    }
}

#[async_trait]
impl UserService for UserServiceDefault {
    async fn create(
        &self,
        external_id: &str,
        email: &str,
        name: &str,
        avatar: Option<&str>,
        auth: &TokenAuthorisation,
    ) -> Result<User, UserServiceError> {
        self.auth_service
            .authorize(auth, Action::CreateUser, 0)
            .await?;
        if email.is_empty() || external_id.is_empty() {
            return Err(UserServiceError::Validation(
                "email and external id are required".to_string(),
            ));
        }
        let record = self
            .user_repo
            .create(external_id, email, name, avatar)
            .await?;
        Ok(record.into())
    }

    async fn get(
        &self,
        id: UserId,
        auth: &TokenAuthorisation,
    ) -> Result<User, UserServiceError> {
        self.auth_service
            .authorize(auth, Action::GetUser, id.0)
            .await?;
        let record = self
            .user_repo
            .get(id.0)
            .await?
            .ok_or(UserServiceError::NotFound)?;
        Ok(record.into())
    }

    async fn find_by_email(
        &self,
        email: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Option<User>, UserServiceError> {
        self.auth_service
            .authorize(auth, Action::ListUsers, 0)
            .await?;
        Ok(self.user_repo.get_by_email(email).await?.map(Into::into))
    }

    async fn who_am_i(&self, auth: &TokenAuthorisation) -> Result<User, UserServiceError> {
        let user_id = auth.user_id().ok_or(UserServiceError::NotFound)?;
        let record = self
            .user_repo
            .get(user_id.0)
            .await?
            .ok_or(UserServiceError::NotFound)?;
        Ok(record.into())
    }

    async fn update_avatar(
        &self,
        id: UserId,
        avatar: Option<&str>,
        auth: &TokenAuthorisation,
    ) -> Result<User, UserServiceError> {
        self.auth_service
            .authorize(auth, Action::UpdateUser, id.0)
            .await?;
        self.user_repo
            .get(id.0)
            .await?
            .ok_or(UserServiceError::NotFound)?;
        self.user_repo.update_avatar(id.0, avatar).await?;
        let record = self
            .user_repo
            .get(id.0)
            .await?
            .ok_or(UserServiceError::NotFound)?;
        Ok(record.into())
    }

    async fn list(
        &self,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<User>, String), UserServiceError> {
        self.auth_service
            .authorize(auth, Action::ListUsers, 0)
            .await?;
        let limit = paging::effective_page_size(page_size);
        let cursor =
            paging::decode_page_token(page_token).map_err(UserServiceError::Validation)?;
        let records = self.user_repo.list(limit, cursor).await?;
        let next = paging::next_page_token(&records, limit, |record| record.id);
        Ok((records.into_iter().map(Into::into).collect(), next))
    }

    async fn delete(
        &self,
        id: UserId,
        auth: &TokenAuthorisation,
    ) -> Result<(), UserServiceError> {
        self.auth_service
            .authorize(auth, Action::DeleteUser, id.0)
            .await?;
        self.user_repo
            .get(id.0)
            .await?
            .ok_or(UserServiceError::NotFound)?;
        let owned = self.organization_repo.count_owned_by_user(id.0).await?;
        let memberships = self.workspace_repo.count_memberships(id.0).await?;
        if owned > 0 || memberships > 0 {
            return Err(UserServiceError::DeleteBlocked);
        }
        self.user_repo.delete(id.0).await?;
        Ok(())
    }

    async fn update_roles(
        &self,
        user_id: UserId,
        grant: &[EntityScope],
        revoke: &[EntityScope],
        auth: &TokenAuthorisation,
    ) -> Result<(), UserServiceError> {
        self.auth_service
            .authorize(auth, Action::UpdateRoles, 0)
            .await?;
        self.user_repo
            .get(user_id.0)
            .await?
            .ok_or(UserServiceError::NotFound)?;
        self.scope_repo
            .update_roles(user_id.0, grant, revoke)
            .await?;
        Ok(())
    }
}
