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
use crate::model::{Organization, Workspace};
use crate::repo::organization::OrganizationRepo;
use crate::repo::workspace::WorkspaceRepo;
use crate::service::auth::{AuthService, AuthServiceError};
use async_trait::async_trait;
use loco_common::model::auth::Action;
use loco_common::model::OrgId;
use loco_common::paging;
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum OrganizationServiceError {
    #[error("Organization not found")]
    NotFound,
    #[error("An organization with this name already exists")]
    AlreadyExists,
    #[error("Organization still contains resources")]
    DeleteBlocked,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthServiceError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for OrganizationServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::UniqueViolation(_) => OrganizationServiceError::AlreadyExists,
            RepoError::Internal(error) => OrganizationServiceError::Internal(error),
        }
    }
}

impl SafeDisplay for OrganizationServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            OrganizationServiceError::NotFound => self.to_string(),
            OrganizationServiceError::AlreadyExists => self.to_string(),
            OrganizationServiceError::DeleteBlocked => self.to_string(),
            OrganizationServiceError::Validation(_) => self.to_string(),
            OrganizationServiceError::Auth(inner) => inner.to_safe_string(),
            OrganizationServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

#[async_trait]
pub trait OrganizationService: Send + Sync {
    async fn create(
        &self,
        name: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Organization, OrganizationServiceError>;

    async fn get(
        &self,
        id: OrgId,
        auth: &TokenAuthorisation,
    ) -> Result<Organization, OrganizationServiceError>;

    async fn list_for_user(
        &self,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Organization>, String), OrganizationServiceError>;

    async fn list_workspaces(
        &self,
        id: OrgId,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Workspace>, String), OrganizationServiceError>;

    async fn update(
        &self,
        id: OrgId,
        name: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Organization, OrganizationServiceError>;

    /// Blocked while any workspace under the organization holds resources;
    /// empty workspaces are removed along with the organization.
    async fn delete(
        &self,
        id: OrgId,
        auth: &TokenAuthorisation,
    ) -> Result<(), OrganizationServiceError>;
}

pub struct OrganizationServiceDefault {
    organization_repo: Arc<dyn OrganizationRepo>,
    workspace_repo: Arc<dyn WorkspaceRepo>,
    auth_service: Arc<dyn AuthService>,
}

impl OrganizationServiceDefault {
    pub fn new(
        organization_repo: Arc<dyn OrganizationRepo>,
        workspace_repo: Arc<dyn WorkspaceRepo>,
        auth_service: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            organization_repo,
            workspace_repo,
            auth_service,
        }
    }
}

#[async_trait]
impl OrganizationService for OrganizationServiceDefault {
    async fn create(
        &self,
        name: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Organization, OrganizationServiceError> {
        let user_id = auth
            .user_id()
            .ok_or(OrganizationServiceError::Auth(AuthServiceError::AccessDenied))?;
        self.auth_service
            .authorize(auth, Action::CreateOrganization, user_id.0)
            .await?;
        if name.is_empty() {
            return Err(OrganizationServiceError::Validation(
                "Organization name must not be empty".to_string(),
            ));
        }
        let record = self.organization_repo.create(name, user_id.0).await?;
        Ok(record.into())
    }

    async fn get(
        &self,
        id: OrgId,
        auth: &TokenAuthorisation,
    ) -> Result<Organization, OrganizationServiceError> {
        self.auth_service
            .authorize(auth, Action::GetOrganization, id.0)
            .await?;
        let record = self
            .organization_repo
            .get(id.0)
            .await?
            .ok_or(OrganizationServiceError::NotFound)?;
        Ok(record.into())
    }

    async fn list_for_user(
        &self,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Organization>, String), OrganizationServiceError> {
        let user_id = auth
            .user_id()
            .ok_or(OrganizationServiceError::Auth(AuthServiceError::AccessDenied))?;
        let limit = paging::effective_page_size(page_size);
        let cursor = paging::decode_page_token(page_token)
            .map_err(OrganizationServiceError::Validation)?;
        let records = self
            .organization_repo
            .list_for_user(user_id.0, limit, cursor)
            .await?;
        let next = paging::next_page_token(&records, limit, |record| record.id);
        Ok((records.into_iter().map(Into::into).collect(), next))
    }

    async fn list_workspaces(
        &self,
        id: OrgId,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Workspace>, String), OrganizationServiceError> {
        self.auth_service
            .authorize(auth, Action::ListOrganizationWorkspaces, id.0)
            .await?;
        let limit = paging::effective_page_size(page_size);
        let cursor = paging::decode_page_token(page_token)
            .map_err(OrganizationServiceError::Validation)?;
        let records = self
            .workspace_repo
            .list_for_organization(id.0, limit, cursor)
            .await?;
        let next = paging::next_page_token(&records, limit, |record| record.id);
        Ok((records.into_iter().map(Into::into).collect(), next))
    }

    async fn update(
        &self,
        id: OrgId,
        name: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Organization, OrganizationServiceError> {
        self.auth_service
            .authorize(auth, Action::UpdateOrganization, id.0)
            .await?;
        if name.is_empty() {
            return Err(OrganizationServiceError::Validation(
                "Organization name must not be empty".to_string(),
            ));
        }
        self.organization_repo
            .get(id.0)
            .await?
            .ok_or(OrganizationServiceError::NotFound)?;
        self.organization_repo.update_name(id.0, name).await?;
        let record = self
            .organization_repo
            .get(id.0)
            .await?
            .ok_or(OrganizationServiceError::NotFound)?;
        Ok(record.into())
    }

    async fn delete(
        &self,
        id: OrgId,
        auth: &TokenAuthorisation,
    ) -> Result<(), OrganizationServiceError> {
        self.auth_service
            .authorize(auth, Action::DeleteOrganization, id.0)
            .await?;
        self.organization_repo
            .get(id.0)
            .await?
            .ok_or(OrganizationServiceError::NotFound)?;
        if self.organization_repo.count_resources(id.0).await? > 0 {
            return Err(OrganizationServiceError::DeleteBlocked);
        }
        // Resource-free workspaces go with their organization.
        loop {
            let workspaces = self
                .workspace_repo
                .list_for_organization(id.0, paging::MAX_PAGE_SIZE, None)
                .await?;
            if workspaces.is_empty() {
                break;
            }
            for workspace in workspaces {
                self.workspace_repo.delete(workspace.id).await?;
            }
        }
        self.organization_repo.delete(id.0).await?;
        Ok(())
    }
}
