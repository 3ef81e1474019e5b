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
use crate::model::{DomainInput, DomainSource, PlatformDomain, ResourceDomain};
use crate::repo::domain::{DomainRepo, NewResourceDomain};
use crate::repo::resource::ResourceRepo;
use crate::service::auth::{AuthService, AuthServiceError};
use crate::validation;
use async_trait::async_trait;
use loco_common::model::auth::Action;
use loco_common::model::{DomainId, PlatformDomainId, ResourceId};
use loco_common::paging;
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum DomainServiceError {
    #[error("Domain not found")]
    NotFound,
    #[error("Resource not found")]
    ResourceNotFound,
    #[error("Platform domain not found or inactive")]
    PlatformDomainUnavailable,
    #[error("Domain is already in use")]
    AlreadyExists,
    #[error("The primary domain cannot be removed")]
    CannotRemovePrimary,
    #[error("The only domain of a resource cannot be removed")]
    CannotRemoveLastDomain,
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthServiceError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for DomainServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::UniqueViolation(_) => DomainServiceError::AlreadyExists,
            RepoError::Internal(error) => DomainServiceError::Internal(error),
        }
    }
}

impl SafeDisplay for DomainServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            DomainServiceError::Auth(inner) => inner.to_safe_string(),
            DomainServiceError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait DomainService: Send + Sync {
    /// Resolves a domain input into a row to insert: synthesizes the
    /// hostname for platform provided domains, validates user provided
    /// hostnames, and checks global availability.
    async fn resolve_input(
        &self,
        input: &DomainInput,
        is_primary: bool,
    ) -> Result<NewResourceDomain, DomainServiceError>;

    async fn create_platform_domain(
        &self,
        domain: &str,
        auth: &TokenAuthorisation,
    ) -> Result<PlatformDomain, DomainServiceError>;

    async fn list_platform_domains(
        &self,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<PlatformDomain>, String), DomainServiceError>;

    async fn set_platform_domain_active(
        &self,
        id: PlatformDomainId,
        is_active: bool,
        auth: &TokenAuthorisation,
    ) -> Result<PlatformDomain, DomainServiceError>;

    async fn add_resource_domain(
        &self,
        resource_id: ResourceId,
        input: &DomainInput,
        auth: &TokenAuthorisation,
    ) -> Result<ResourceDomain, DomainServiceError>;

    /// Rename a user provided domain; platform provided hostnames are
    /// derived and immutable.
    async fn update_resource_domain(
        &self,
        domain_id: DomainId,
        hostname: &str,
        auth: &TokenAuthorisation,
    ) -> Result<ResourceDomain, DomainServiceError>;

    async fn set_primary(
        &self,
        resource_id: ResourceId,
        domain_id: DomainId,
        auth: &TokenAuthorisation,
    ) -> Result<(), DomainServiceError>;

    async fn remove(
        &self,
        domain_id: DomainId,
        auth: &TokenAuthorisation,
    ) -> Result<(), DomainServiceError>;

    async fn check_availability(&self, domain: &str) -> Result<bool, DomainServiceError>;

    async fn list_resource_domains(
        &self,
        resource_id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<ResourceDomain>, DomainServiceError>;
}

pub struct DomainServiceDefault {
    domain_repo: Arc<dyn DomainRepo>,
    resource_repo: Arc<dyn ResourceRepo>,
    auth_service: Arc<dyn AuthService>,
}

impl DomainServiceDefault {
    pub fn new(
        domain_repo: Arc<dyn DomainRepo>,
        resource_repo: Arc<dyn ResourceRepo>,
        auth_service: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            domain_repo,
            resource_repo,
            auth_service,
        }
    }

    async fn load_domain(
        &self,
        domain_id: DomainId,
    ) -> Result<ResourceDomain, DomainServiceError> {
        let record = self
            .domain_repo
            .get_resource_domain(domain_id.0)
            .await?
            .ok_or(DomainServiceError::NotFound)?;
        record.try_into().map_err(DomainServiceError::Internal)
    }
}

#[async_trait]
impl DomainService for DomainServiceDefault {
    async fn resolve_input(
        &self,
        input: &DomainInput,
        is_primary: bool,
    ) -> Result<NewResourceDomain, DomainServiceError> {
        let resolved = match input {
            DomainInput::PlatformProvided {
                subdomain_label,
                platform_domain_id,
            } => {
                if !validation::is_valid_dns_label(subdomain_label) {
                    return Err(DomainServiceError::Validation(format!(
                        "Subdomain must be a DNS-safe label, got {subdomain_label:?}"
                    )));
                }
                let platform_domain = self
                    .domain_repo
                    .get_platform_domain(platform_domain_id.0)
                    .await?
                    .filter(|record| record.is_active)
                    .ok_or(DomainServiceError::PlatformDomainUnavailable)?;
                NewResourceDomain {
                    domain: format!("{subdomain_label}.{}", platform_domain.domain),
                    domain_source: DomainSource::PlatformProvided,
                    subdomain_label: Some(subdomain_label.clone()),
                    platform_domain_id: Some(platform_domain.id),
                    is_primary,
                }
            }
            DomainInput::UserProvided { hostname } => {
                if !validation::is_valid_hostname(hostname) {
                    return Err(DomainServiceError::Validation(format!(
                        "Invalid hostname {hostname:?}"
                    )));
                }
                NewResourceDomain {
                    domain: hostname.clone(),
                    domain_source: DomainSource::UserProvided,
                    subdomain_label: None,
                    platform_domain_id: None,
                    is_primary,
                }
            }
        };
        if self.domain_repo.domain_exists(&resolved.domain).await? {
            return Err(DomainServiceError::AlreadyExists);
        }
        Ok(resolved)
    }

    async fn create_platform_domain(
        &self,
        domain: &str,
        auth: &TokenAuthorisation,
    ) -> Result<PlatformDomain, DomainServiceError> {
        self.auth_service
            .authorize(auth, Action::ManagePlatformDomains, 0)
            .await?;
        if !validation::is_valid_hostname(domain) {
            return Err(DomainServiceError::Validation(format!(
                "Invalid domain {domain:?}"
            )));
        }
        let record = self.domain_repo.create_platform_domain(domain).await?;
        Ok(record.into())
    }

    async fn list_platform_domains(
        &self,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<PlatformDomain>, String), DomainServiceError> {
        self.auth_service
            .authorize(auth, Action::ListPlatformDomains, 0)
            .await?;
        let limit = paging::effective_page_size(page_size);
        let cursor =
            paging::decode_page_token(page_token).map_err(DomainServiceError::Validation)?;
        let records = self.domain_repo.list_platform_domains(limit, cursor).await?;
        let next = paging::next_page_token(&records, limit, |record| record.id);
        Ok((records.into_iter().map(Into::into).collect(), next))
    }

    async fn set_platform_domain_active(
        &self,
        id: PlatformDomainId,
        is_active: bool,
        auth: &TokenAuthorisation,
    ) -> Result<PlatformDomain, DomainServiceError> {
        self.auth_service
            .authorize(auth, Action::ManagePlatformDomains, 0)
            .await?;
        self.domain_repo
            .get_platform_domain(id.0)
            .await?
            .ok_or(DomainServiceError::NotFound)?;
        self.domain_repo
            .set_platform_domain_active(id.0, is_active)
            .await?;
        let record = self
            .domain_repo
            .get_platform_domain(id.0)
            .await?
            .ok_or(DomainServiceError::NotFound)?;
        Ok(record.into())
    }

    async fn add_resource_domain(
        &self,
        resource_id: ResourceId,
        input: &DomainInput,
        auth: &TokenAuthorisation,
    ) -> Result<ResourceDomain, DomainServiceError> {
        self.resource_repo
            .get(resource_id.0)
            .await?
            .ok_or(DomainServiceError::ResourceNotFound)?;
        self.auth_service
            .authorize(auth, Action::ManageResourceDomains, resource_id.0)
            .await?;
        let resolved = self.resolve_input(input, false).await?;
        let record = self
            .domain_repo
            .add_resource_domain(resource_id.0, &resolved)
            .await?;
        record.try_into().map_err(DomainServiceError::Internal)
    }

    async fn update_resource_domain(
        &self,
        domain_id: DomainId,
        hostname: &str,
        auth: &TokenAuthorisation,
    ) -> Result<ResourceDomain, DomainServiceError> {
        let domain = self.load_domain(domain_id).await?;
        self.auth_service
            .authorize(auth, Action::ManageResourceDomains, domain.resource_id.0)
            .await?;
        if domain.source != DomainSource::UserProvided {
            return Err(DomainServiceError::Validation(
                "Platform provided domains cannot be renamed".to_string(),
            ));
        }
        if !validation::is_valid_hostname(hostname) {
            return Err(DomainServiceError::Validation(format!(
                "Invalid hostname {hostname:?}"
            )));
        }
        if hostname != domain.domain && self.domain_repo.domain_exists(hostname).await? {
            return Err(DomainServiceError::AlreadyExists);
        }
        self.domain_repo
            .update_resource_domain_hostname(domain_id.0, hostname)
            .await?;
        self.load_domain(domain_id).await
    }

    async fn set_primary(
        &self,
        resource_id: ResourceId,
        domain_id: DomainId,
        auth: &TokenAuthorisation,
    ) -> Result<(), DomainServiceError> {
        self.auth_service
            .authorize(auth, Action::ManageResourceDomains, resource_id.0)
            .await?;
        let domain = self.load_domain(domain_id).await?;
        if domain.resource_id != resource_id {
            return Err(DomainServiceError::NotFound);
        }
        self.domain_repo
            .set_primary_resource_domain(resource_id.0, domain_id.0)
            .await?;
        Ok(())
    }

    async fn remove(
        &self,
        domain_id: DomainId,
        auth: &TokenAuthorisation,
    ) -> Result<(), DomainServiceError> {
        let domain = self.load_domain(domain_id).await?;
        self.auth_service
            .authorize(auth, Action::ManageResourceDomains, domain.resource_id.0)
            .await?;
        if domain.is_primary {
            return Err(DomainServiceError::CannotRemovePrimary);
        }
        if self
            .domain_repo
            .count_resource_domains(domain.resource_id.0)
            .await?
            <= 1
        {
            return Err(DomainServiceError::CannotRemoveLastDomain);
        }
        self.domain_repo.remove_resource_domain(domain_id.0).await?;
        Ok(())
    }

    async fn check_availability(&self, domain: &str) -> Result<bool, DomainServiceError> {
        if !validation::is_valid_hostname(domain) {
            return Ok(false);
        }
        Ok(!self.domain_repo.domain_exists(domain).await?)
    }

    async fn list_resource_domains(
        &self,
        resource_id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<ResourceDomain>, DomainServiceError> {
        self.resource_repo
            .get(resource_id.0)
            .await?
            .ok_or(DomainServiceError::ResourceNotFound)?;
        self.auth_service
            .authorize(auth, Action::ListResourceDomains, resource_id.0)
            .await?;
        let records = self.domain_repo.list_resource_domains(resource_id.0).await?;
        records
            .into_iter()
            .map(|record| record.try_into().map_err(DomainServiceError::Internal))
            .collect()
    }
}
