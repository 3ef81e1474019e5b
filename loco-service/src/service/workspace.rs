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
use crate::model::{Workspace, WorkspaceMember};
use crate::repo::organization::OrganizationRepo;
use crate::repo::workspace::WorkspaceRepo;
use crate::service::auth::{AuthService, AuthServiceError};
use crate::validation;
use async_trait::async_trait;
use loco_common::model::auth::Action;
use loco_common::model::{OrgId, WorkspaceId};
use loco_common::paging;
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceServiceError {
    #[error("Workspace not found")]
    NotFound,
    #[error("Organization not found")]
    OrganizationNotFound,
    #[error("A workspace with this name already exists in the organization")]
    AlreadyExists,
    #[error("Workspace still contains resources")]
    DeleteBlocked,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthServiceError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for WorkspaceServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::UniqueViolation(_) => WorkspaceServiceError::AlreadyExists,
            RepoError::Internal(error) => WorkspaceServiceError::Internal(error),
        }
    }
}

impl SafeDisplay for WorkspaceServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            WorkspaceServiceError::NotFound => self.to_string(),
            WorkspaceServiceError::OrganizationNotFound => self.to_string(),
            WorkspaceServiceError::AlreadyExists => self.to_string(),
            WorkspaceServiceError::DeleteBlocked => self.to_string(),
            WorkspaceServiceError::Validation(_) => self.to_string(),
            WorkspaceServiceError::Auth(inner) => inner.to_safe_string(),
            WorkspaceServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

#[async_trait]
pub trait WorkspaceService: Send + Sync {
    async fn create(
        &self,
        organization_id: OrgId,
        name: &str,
        description: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Workspace, WorkspaceServiceError>;

    async fn get(
        &self,
        id: WorkspaceId,
        auth: &TokenAuthorisation,
    ) -> Result<Workspace, WorkspaceServiceError>;

    async fn list_for_user(
        &self,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Workspace>, String), WorkspaceServiceError>;

    async fn list_for_organization(
        &self,
        organization_id: OrgId,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Workspace>, String), WorkspaceServiceError>;

    async fn update(
        &self,
        id: WorkspaceId,
        name: &str,
        description: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Workspace, WorkspaceServiceError>;

    async fn delete(
        &self,
        id: WorkspaceId,
        auth: &TokenAuthorisation,
    ) -> Result<(), WorkspaceServiceError>;

    async fn list_members(
        &self,
        id: WorkspaceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<WorkspaceMember>, WorkspaceServiceError>;
}

pub struct WorkspaceServiceDefault {
    workspace_repo: Arc<dyn WorkspaceRepo>,
    organization_repo: Arc<dyn OrganizationRepo>,
    auth_service: Arc<dyn AuthService>,
}

impl WorkspaceServiceDefault {
    pub fn new(
        workspace_repo: Arc<dyn WorkspaceRepo>,
        organization_repo: Arc<dyn OrganizationRepo>,
        auth_service: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            workspace_repo,
            organization_repo,
            auth_service,
        }
    }
}

#[async_trait]
impl WorkspaceService for WorkspaceServiceDefault {
    async fn create(
        &self,
        organization_id: OrgId,
        name: &str,
        description: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Workspace, WorkspaceServiceError> {
        self.organization_repo
            .get(organization_id.0)
            .await?
            .ok_or(WorkspaceServiceError::OrganizationNotFound)?;
        self.auth_service
            .authorize(auth, Action::CreateWorkspace, organization_id.0)
            .await?;
        if !validation::is_valid_dns_label(name) {
            return Err(WorkspaceServiceError::Validation(format!(
                "Workspace name must be a DNS-safe label, got {name:?}"
            )));
        }
        let created_by = auth
            .user_id()
            .ok_or(WorkspaceServiceError::Auth(AuthServiceError::AccessDenied))?;
        let record = self
            .workspace_repo
            .create(organization_id.0, name, description, created_by.0)
            .await?;
        Ok(record.into())
    }

    async fn get(
        &self,
        id: WorkspaceId,
        auth: &TokenAuthorisation,
    ) -> Result<Workspace, WorkspaceServiceError> {
        self.auth_service
            .authorize(auth, Action::GetWorkspace, id.0)
            .await?;
        let record = self
            .workspace_repo
            .get(id.0)
            .await?
            .ok_or(WorkspaceServiceError::NotFound)?;
        Ok(record.into())
    }

    async fn list_for_user(
        &self,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Workspace>, String), WorkspaceServiceError> {
        let user_id = auth
            .user_id()
            .ok_or(WorkspaceServiceError::Auth(AuthServiceError::AccessDenied))?;
        let limit = paging::effective_page_size(page_size);
        let cursor =
            paging::decode_page_token(page_token).map_err(WorkspaceServiceError::Validation)?;
        let records = self
            .workspace_repo
            .list_for_user(user_id.0, limit, cursor)
            .await?;
        let next = paging::next_page_token(&records, limit, |record| record.id);
        Ok((records.into_iter().map(Into::into).collect(), next))
    }

    async fn list_for_organization(
        &self,
        organization_id: OrgId,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Workspace>, String), WorkspaceServiceError> {
        self.auth_service
            .authorize(auth, Action::ListOrganizationWorkspaces, organization_id.0)
            .await?;
        let limit = paging::effective_page_size(page_size);
        let cursor =
            paging::decode_page_token(page_token).map_err(WorkspaceServiceError::Validation)?;
        let records = self
            .workspace_repo
            .list_for_organization(organization_id.0, limit, cursor)
            .await?;
        let next = paging::next_page_token(&records, limit, |record| record.id);
        Ok((records.into_iter().map(Into::into).collect(), next))
    }

    async fn update(
        &self,
        id: WorkspaceId,
        name: &str,
        description: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Workspace, WorkspaceServiceError> {
        self.auth_service
            .authorize(auth, Action::UpdateWorkspace, id.0)
            .await?;
        if !validation::is_valid_dns_label(name) {
            return Err(WorkspaceServiceError::Validation(format!(
                "Workspace name must be a DNS-safe label, got {name:?}"
            )));
        }
        self.workspace_repo
            .get(id.0)
            .await?
            .ok_or(WorkspaceServiceError::NotFound)?;
        self.workspace_repo.update(id.0, name, description).await?;
        let record = self
            .workspace_repo
            .get(id.0)
            .await?
            .ok_or(WorkspaceServiceError::NotFound)?;
        Ok(record.into())
    }

    async fn delete(
        &self,
        id: WorkspaceId,
        auth: &TokenAuthorisation,
    ) -> Result<(), WorkspaceServiceError> {
        self.auth_service
            .authorize(auth, Action::DeleteWorkspace, id.0)
            .await?;
        self.workspace_repo
            .get(id.0)
            .await?
            .ok_or(WorkspaceServiceError::NotFound)?;
        if self.workspace_repo.count_resources(id.0).await? > 0 {
            return Err(WorkspaceServiceError::DeleteBlocked);
        }
        self.workspace_repo.delete(id.0).await?;
        Ok(())
    }

    async fn list_members(
        &self,
        id: WorkspaceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<WorkspaceMember>, WorkspaceServiceError> {
        self.auth_service
            .authorize(auth, Action::ListWorkspaceMembers, id.0)
            .await?;
        self.workspace_repo
            .get(id.0)
            .await?
            .ok_or(WorkspaceServiceError::NotFound)?;
        let records = self.workspace_repo.list_members(id.0).await?;
        records
            .into_iter()
            .map(|record| record.try_into().map_err(WorkspaceServiceError::Internal))
            .collect()
    }
}
