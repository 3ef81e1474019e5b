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
use crate::k8s::application::{ApplicationClient, ApplicationClientError, PodLogLine, WorkloadEvent};
use crate::k8s::{application_name, resource_namespace};
use crate::model::{
    DeploymentStatus, DomainInput, RegionInfo, Resource, ResourceRegion, ResourceStatus,
    ResourceType,
};
use crate::repo::deployment::DeploymentRepo;
use crate::repo::resource::{NewResource, ResourceRepo};
use crate::repo::workspace::WorkspaceRepo;
use crate::service::auth::{AuthService, AuthServiceError};
use crate::service::cluster::{ClusterService, ClusterServiceError};
use crate::service::deployment::{DeploymentService, DeploymentServiceError};
use crate::service::domain::{DomainService, DomainServiceError};
use crate::spec::codec::{self, SpecCodecError};
use crate::spec::{DeploymentTypeSpec, ResourceTypeSpec, ServiceDeploymentSpec};
use crate::validation;
use async_trait::async_trait;
use loco_common::model::auth::Action;
use loco_common::model::{DeploymentId, ResourceId, WorkspaceId};
use loco_common::paging;
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ResourceServiceError {
    #[error("Resource not found")]
    NotFound,
    #[error("Workspace not found")]
    WorkspaceNotFound,
    #[error("A resource with this name already exists in the workspace")]
    AlreadyExists,
    #[error("No active deployment in region {0}")]
    NoActiveDeployment(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthServiceError),
    #[error(transparent)]
    Domain(#[from] DomainServiceError),
    #[error(transparent)]
    Codec(#[from] SpecCodecError),
    #[error(transparent)]
    Deployment(Box<DeploymentServiceError>),
    #[error("Cluster API failure: {0}")]
    ClusterApi(#[from] ApplicationClientError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for ResourceServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::UniqueViolation(_) => ResourceServiceError::AlreadyExists,
            RepoError::Internal(error) => ResourceServiceError::Internal(error),
        }
    }
}

impl From<DeploymentServiceError> for ResourceServiceError {
    fn from(value: DeploymentServiceError) -> Self {
        ResourceServiceError::Deployment(Box::new(value))
    }
}

impl From<ClusterServiceError> for ResourceServiceError {
    fn from(value: ClusterServiceError) -> Self {
        ResourceServiceError::Internal(value.to_string())
    }
}

impl SafeDisplay for ResourceServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            ResourceServiceError::NotFound => self.to_string(),
            ResourceServiceError::WorkspaceNotFound => self.to_string(),
            ResourceServiceError::AlreadyExists => self.to_string(),
            ResourceServiceError::NoActiveDeployment(_) => self.to_string(),
            ResourceServiceError::Validation(_) => self.to_string(),
            ResourceServiceError::Auth(inner) => inner.to_safe_string(),
            ResourceServiceError::Domain(inner) => inner.to_safe_string(),
            ResourceServiceError::Codec(inner) => inner.to_safe_string(),
            ResourceServiceError::Deployment(inner) => inner.to_safe_string(),
            ResourceServiceError::ClusterApi(inner) => inner.to_safe_string(),
            ResourceServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

#[async_trait]
pub trait ResourceService: Send + Sync {
    async fn create(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        resource_type: ResourceType,
        description: &str,
        spec: ResourceTypeSpec,
        domain: DomainInput,
        auth: &TokenAuthorisation,
    ) -> Result<Resource, ResourceServiceError>;

    async fn get(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Resource, ResourceServiceError>;

    async fn get_by_name(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Resource, ResourceServiceError>;

    async fn list(
        &self,
        workspace_id: WorkspaceId,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Resource>, String), ResourceServiceError>;

    /// Renames only; the durable spec changes through deployments.
    async fn update_name(
        &self,
        id: ResourceId,
        name: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Resource, ResourceServiceError>;

    async fn delete(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<(), ResourceServiceError>;

    /// Aggregates live deployment state per region instead of trusting the
    /// stored status column; the column is refreshed on the way out.
    async fn get_status(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<(ResourceStatus, Vec<(String, ResourceStatus)>), ResourceServiceError>;

    async fn list_declared_regions(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<ResourceRegion>, ResourceServiceError>;

    /// Distinct regions across the active healthy fleet.
    async fn list_regions(&self) -> Result<Vec<RegionInfo>, ResourceServiceError>;

    async fn stream_logs(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<PodLogLine>, ResourceServiceError>;

    async fn get_events(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<WorkloadEvent>, ResourceServiceError>;

    /// Rebuilds a fresh deployment per targeted region from the last active
    /// one, with the overridden compute shape.
    #[allow(clippy::too_many_arguments)]
    async fn scale(
        &self,
        id: ResourceId,
        region: Option<&str>,
        cpu: Option<&str>,
        memory: Option<&str>,
        min_replicas: Option<i32>,
        max_replicas: Option<i32>,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<DeploymentId>, ResourceServiceError>;

    /// Same machinery as `scale`, replacing the environment wholesale.
    async fn update_env(
        &self,
        id: ResourceId,
        region: Option<&str>,
        env: BTreeMap<String, String>,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<DeploymentId>, ResourceServiceError>;
}

pub struct ResourceServiceDefault {
    resource_repo: Arc<dyn ResourceRepo>,
    workspace_repo: Arc<dyn WorkspaceRepo>,
    deployment_repo: Arc<dyn DeploymentRepo>,
    domain_service: Arc<dyn DomainService>,
    cluster_service: Arc<dyn ClusterService>,
    deployment_service: Arc<dyn DeploymentService>,
    application_client: Arc<dyn ApplicationClient>,
    auth_service: Arc<dyn AuthService>,
}

impl ResourceServiceDefault {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resource_repo: Arc<dyn ResourceRepo>,
        workspace_repo: Arc<dyn WorkspaceRepo>,
        deployment_repo: Arc<dyn DeploymentRepo>,
        domain_service: Arc<dyn DomainService>,
        cluster_service: Arc<dyn ClusterService>,
        deployment_service: Arc<dyn DeploymentService>,
        application_client: Arc<dyn ApplicationClient>,
        auth_service: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            resource_repo,
            workspace_repo,
            deployment_repo,
            domain_service,
            cluster_service,
            deployment_service,
            application_client,
            auth_service,
        }
    }

    async fn load(&self, id: ResourceId) -> Result<Resource, ResourceServiceError> {
        let record = self
            .resource_repo
            .get(id.0)
            .await?
            .ok_or(ResourceServiceError::NotFound)?;
        record.try_into().map_err(ResourceServiceError::Internal)
    }

    /// Validates the declared regions and returns them with exactly one
    /// primary flag set.
    fn validated_regions(
        spec: &ResourceTypeSpec,
    ) -> Result<Vec<(String, bool)>, ResourceServiceError> {
        let service = match spec {
            ResourceTypeSpec::Service(service) => service,
            other => {
                return Err(ResourceServiceError::Validation(format!(
                    "{} resources are not supported yet",
                    other.resource_type()
                )))
            }
        };
        if service.regions.is_empty() {
            return Err(ResourceServiceError::Validation(
                "A service needs at least one region".to_string(),
            ));
        }
        let primaries = service
            .regions
            .values()
            .filter(|target| target.primary)
            .count();
        let mut regions: Vec<(String, bool)> = service
            .regions
            .iter()
            .map(|(region, target)| (region.clone(), target.primary))
            .collect();
        match primaries {
            1 => {}
            0 if regions.len() == 1 => regions[0].1 = true,
            _ => {
                return Err(ResourceServiceError::Validation(
                    "Exactly one region must be marked primary".to_string(),
                ))
            }
        }
        Ok(regions)
    }

    fn region_status(deployment_status: DeploymentStatus) -> ResourceStatus {
        match deployment_status {
            DeploymentStatus::Pending | DeploymentStatus::Deploying => ResourceStatus::Deploying,
            DeploymentStatus::Running | DeploymentStatus::Succeeded => ResourceStatus::Healthy,
            DeploymentStatus::Failed => ResourceStatus::Degraded,
            DeploymentStatus::Canceled => ResourceStatus::Unavailable,
        }
    }

    /// Regions to roll for scale/update_env: the requested one, or every
    /// region with an active deployment.
    async fn target_regions(
        &self,
        id: ResourceId,
        region: Option<&str>,
    ) -> Result<Vec<String>, ResourceServiceError> {
        match region {
            Some(region) if !region.is_empty() => {
                self.deployment_repo
                    .get_active(id.0, region)
                    .await?
                    .ok_or_else(|| ResourceServiceError::NoActiveDeployment(region.to_string()))?;
                Ok(vec![region.to_string()])
            }
            _ => {
                let active = self.deployment_repo.list_active(id.0).await?;
                Ok(active.into_iter().map(|record| record.region).collect())
            }
        }
    }

    async fn redeploy_with(
        &self,
        id: ResourceId,
        regions: Vec<String>,
        mutate: impl Fn(&mut ServiceDeploymentSpec) + Send + Sync,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<DeploymentId>, ResourceServiceError> {
        let mut created = Vec::with_capacity(regions.len());
        for region in regions {
            let record = self
                .deployment_repo
                .get_active(id.0, &region)
                .await?
                .ok_or_else(|| ResourceServiceError::NoActiveDeployment(region.clone()))?;
            let spec = codec::decode_deployment_spec(&record.spec, record.spec_version)?;
            let DeploymentTypeSpec::Service(mut service) = spec;
            mutate(&mut service);
            let deployment_id = self
                .deployment_service
                .create(
                    id,
                    &region,
                    Some(DeploymentTypeSpec::Service(service)),
                    auth,
                )
                .await?;
            created.push(deployment_id);
        }
        Ok(created)
    }
}

#[async_trait]
impl ResourceService for ResourceServiceDefault {
    async fn create(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        resource_type: ResourceType,
        description: &str,
        spec: ResourceTypeSpec,
        domain: DomainInput,
        auth: &TokenAuthorisation,
    ) -> Result<Resource, ResourceServiceError> {
        self.workspace_repo
            .get(workspace_id.0)
            .await?
            .ok_or(ResourceServiceError::WorkspaceNotFound)?;
        self.auth_service
            .authorize(auth, Action::CreateResource, workspace_id.0)
            .await?;

        if !validation::is_valid_dns_label(name) {
            return Err(ResourceServiceError::Validation(format!(
                "Resource name must be a DNS-safe label, got {name:?}"
            )));
        }
        if spec.resource_type() != resource_type {
            return Err(ResourceServiceError::Validation(format!(
                "Spec is for a {} resource but the resource type is {}",
                spec.resource_type(),
                resource_type
            )));
        }
        let regions = Self::validated_regions(&spec)?;
        let resolved_domain = self.domain_service.resolve_input(&domain, true).await?;

        let (spec_json, spec_version) = codec::encode_resource_spec(&spec)?;
        let record = self
            .resource_repo
            .create(&NewResource {
                workspace_id: workspace_id.0,
                name: name.to_string(),
                resource_type,
                description: description.to_string(),
                spec: spec_json,
                spec_version,
                regions,
                domain: resolved_domain,
            })
            .await?;
        record.try_into().map_err(ResourceServiceError::Internal)
    }

    async fn get(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Resource, ResourceServiceError> {
        let resource = self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::GetResource, id.0)
            .await?;
        Ok(resource)
    }

    async fn get_by_name(
        &self,
        workspace_id: WorkspaceId,
        name: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Resource, ResourceServiceError> {
        let record = self
            .resource_repo
            .get_by_name(workspace_id.0, name)
            .await?
            .ok_or(ResourceServiceError::NotFound)?;
        self.auth_service
            .authorize(auth, Action::GetResource, record.id)
            .await?;
        record.try_into().map_err(ResourceServiceError::Internal)
    }

    async fn list(
        &self,
        workspace_id: WorkspaceId,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Resource>, String), ResourceServiceError> {
        self.workspace_repo
            .get(workspace_id.0)
            .await?
            .ok_or(ResourceServiceError::WorkspaceNotFound)?;
        self.auth_service
            .authorize(auth, Action::ListResources, workspace_id.0)
            .await?;
        let limit = paging::effective_page_size(page_size);
        let cursor =
            paging::decode_page_token(page_token).map_err(ResourceServiceError::Validation)?;
        let records = self.resource_repo.list(workspace_id.0, limit, cursor).await?;
        let next = paging::next_page_token(&records, limit, |record| record.id);
        let resources = records
            .into_iter()
            .map(|record| record.try_into().map_err(ResourceServiceError::Internal))
            .collect::<Result<Vec<Resource>, _>>()?;
        Ok((resources, next))
    }

    async fn update_name(
        &self,
        id: ResourceId,
        name: &str,
        auth: &TokenAuthorisation,
    ) -> Result<Resource, ResourceServiceError> {
        self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::UpdateResource, id.0)
            .await?;
        if !validation::is_valid_dns_label(name) {
            return Err(ResourceServiceError::Validation(format!(
                "Resource name must be a DNS-safe label, got {name:?}"
            )));
        }
        self.resource_repo.update_name(id.0, name).await?;
        self.load(id).await
    }

    async fn delete(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<(), ResourceServiceError> {
        self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::DeleteResource, id.0)
            .await?;
        self.application_client
            .delete(&application_name(id))
            .await?;
        self.resource_repo.delete(id.0).await?;
        Ok(())
    }

    async fn get_status(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<(ResourceStatus, Vec<(String, ResourceStatus)>), ResourceServiceError> {
        let resource = self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::GetResource, id.0)
            .await?;

        if resource.status == ResourceStatus::Suspended {
            return Ok((ResourceStatus::Suspended, Vec::new()));
        }

        let regions = self.resource_repo.list_regions(id.0).await?;
        let active = self.deployment_repo.list_active(id.0).await?;
        let mut by_region: BTreeMap<String, ResourceStatus> = regions
            .into_iter()
            .map(|record| (record.region, ResourceStatus::Unavailable))
            .collect();
        for record in active {
            let status = DeploymentStatus::from_str(&record.status)
                .map_err(ResourceServiceError::Internal)?;
            by_region.insert(record.region, Self::region_status(status));
        }

        let statuses: Vec<ResourceStatus> = by_region.values().copied().collect();
        let overall = if statuses.iter().any(|s| *s == ResourceStatus::Degraded) {
            ResourceStatus::Degraded
        } else if statuses.iter().any(|s| *s == ResourceStatus::Deploying) {
            ResourceStatus::Deploying
        } else if !statuses.is_empty()
            && statuses.iter().all(|s| *s == ResourceStatus::Healthy)
        {
            ResourceStatus::Healthy
        } else {
            ResourceStatus::Unavailable
        };

        if overall != resource.status {
            self.resource_repo.update_status(id.0, overall).await?;
        }

        Ok((overall, by_region.into_iter().collect()))
    }

    async fn list_declared_regions(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<ResourceRegion>, ResourceServiceError> {
        self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::GetResource, id.0)
            .await?;
        let records = self.resource_repo.list_regions(id.0).await?;
        records
            .into_iter()
            .map(|record| record.try_into().map_err(ResourceServiceError::Internal))
            .collect()
    }

    async fn list_regions(&self) -> Result<Vec<RegionInfo>, ResourceServiceError> {
        Ok(self.cluster_service.list_regions().await?)
    }

    async fn stream_logs(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<PodLogLine>, ResourceServiceError> {
        let resource = self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::StreamResourceLogs, id.0)
            .await?;
        let namespace = resource_namespace(resource.workspace_id, id);
        Ok(self.application_client.pod_logs(&namespace).await?)
    }

    async fn get_events(
        &self,
        id: ResourceId,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<WorkloadEvent>, ResourceServiceError> {
        let resource = self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::GetResourceEvents, id.0)
            .await?;
        let namespace = resource_namespace(resource.workspace_id, id);
        Ok(self.application_client.list_events(&namespace).await?)
    }

    async fn scale(
        &self,
        id: ResourceId,
        region: Option<&str>,
        cpu: Option<&str>,
        memory: Option<&str>,
        min_replicas: Option<i32>,
        max_replicas: Option<i32>,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<DeploymentId>, ResourceServiceError> {
        self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::ScaleResource, id.0)
            .await?;
        for replicas in [min_replicas, max_replicas].into_iter().flatten() {
            if replicas < 1 {
                return Err(ResourceServiceError::Validation(
                    "Replica counts must be at least 1".to_string(),
                ));
            }
        }
        let regions = self.target_regions(id, region).await?;
        let cpu = cpu.map(str::to_string);
        let memory = memory.map(str::to_string);
        self.redeploy_with(
            id,
            regions,
            move |service| {
                if let Some(cpu) = &cpu {
                    service.cpu = Some(cpu.clone());
                }
                if let Some(memory) = &memory {
                    service.memory = Some(memory.clone());
                }
                if let Some(min_replicas) = min_replicas {
                    service.min_replicas = Some(min_replicas);
                }
                if let Some(max_replicas) = max_replicas {
                    service.max_replicas = Some(max_replicas);
                }
            },
            auth,
        )
        .await
    }

    async fn update_env(
        &self,
        id: ResourceId,
        region: Option<&str>,
        env: BTreeMap<String, String>,
        auth: &TokenAuthorisation,
    ) -> Result<Vec<DeploymentId>, ResourceServiceError> {
        self.load(id).await?;
        self.auth_service
            .authorize(auth, Action::UpdateResourceEnv, id.0)
            .await?;
        let regions = self.target_regions(id, region).await?;
        self.redeploy_with(
            id,
            regions,
            move |service| {
                service.env = Some(env.clone());
            },
            auth,
        )
        .await
    }
}
