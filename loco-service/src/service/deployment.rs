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
use crate::k8s::application::{apply, ApplicationClient, ApplicationClientError};
use crate::k8s::application_name;
use crate::model::{Deployment, DeploymentStatus, Resource};
use crate::repo::deployment::{DeploymentRepo, NewDeployment};
use crate::repo::domain::DomainRepo;
use crate::repo::resource::ResourceRepo;
use crate::service::auth::{AuthService, AuthServiceError};
use crate::service::cluster::{ClusterService, ClusterServiceError};
use crate::spec::codec::{self, SpecCodecError};
use crate::spec::merge::{self, MergeError};
use crate::spec::project::project_service;
use crate::spec::{DeploymentTypeSpec, ServiceDeploymentSpec};
use crate::validation;
use async_trait::async_trait;
use chrono::Utc;
use loco_common::model::auth::Action;
use loco_common::model::{DeploymentId, ResourceId};
use loco_common::paging;
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

/// How often the watch stream re-reads the deployment row.
const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum DeploymentServiceError {
    #[error("Deployment not found")]
    NotFound,
    #[error("Resource not found")]
    ResourceNotFound,
    #[error("No active healthy cluster serves region {0}")]
    NoClusterForRegion(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthServiceError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Codec(#[from] SpecCodecError),
    #[error("Cluster API failure: {0}")]
    ClusterApi(#[from] ApplicationClientError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RepoError> for DeploymentServiceError {
    fn from(value: RepoError) -> Self {
        DeploymentServiceError::Internal(value.to_string())
    }
}

impl From<ClusterServiceError> for DeploymentServiceError {
    fn from(value: ClusterServiceError) -> Self {
        match value {
            ClusterServiceError::NoClusterForRegion(region) => {
                DeploymentServiceError::NoClusterForRegion(region)
            }
            other => DeploymentServiceError::Internal(other.to_string()),
        }
    }
}

impl SafeDisplay for DeploymentServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            DeploymentServiceError::NotFound => self.to_string(),
            DeploymentServiceError::ResourceNotFound => self.to_string(),
            DeploymentServiceError::NoClusterForRegion(_) => self.to_string(),
            DeploymentServiceError::Validation(_) => self.to_string(),
            DeploymentServiceError::Auth(inner) => inner.to_safe_string(),
            DeploymentServiceError::Merge(inner) => inner.to_safe_string(),
            DeploymentServiceError::Codec(inner) => inner.to_safe_string(),
            DeploymentServiceError::ClusterApi(inner) => inner.to_safe_string(),
            DeploymentServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

/// One emitted watch event. Status is monotone over the stream; intermediate
/// statuses may be skipped when a poll observes a more advanced state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub deployment_id: DeploymentId,
    pub status: DeploymentStatus,
    pub message: String,
    pub timestamp: chrono::DateTime<Utc>,
}

#[async_trait]
pub trait DeploymentService: Send + Sync {
    /// The canonical write path: validate, pick a cluster, merge the specs,
    /// run the supersession transaction, then apply the workload CRD.
    async fn create(
        &self,
        resource_id: ResourceId,
        region: &str,
        override_spec: Option<DeploymentTypeSpec>,
        auth: &TokenAuthorisation,
    ) -> Result<DeploymentId, DeploymentServiceError>;

    async fn get(
        &self,
        id: DeploymentId,
        auth: &TokenAuthorisation,
    ) -> Result<Deployment, DeploymentServiceError>;

    async fn list(
        &self,
        resource_id: ResourceId,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Deployment>, String), DeploymentServiceError>;

    async fn delete(
        &self,
        id: DeploymentId,
        auth: &TokenAuthorisation,
    ) -> Result<(), DeploymentServiceError>;

    /// Status polling stream: emits on every observed status change and
    /// closes after a terminal status. Dropping the receiver cancels the
    /// poll loop.
    async fn watch(
        &self,
        id: DeploymentId,
        auth: &TokenAuthorisation,
    ) -> Result<ReceiverStream<WatchEvent>, DeploymentServiceError>;

    /// Reconciliation write surface: the workload controller's observed
    /// state coming back into the row. Also drives `started_at` and
    /// `completed_at`.
    async fn mark_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        message: &str,
    ) -> Result<(), DeploymentServiceError>;
}

pub struct DeploymentServiceDefault {
    deployment_repo: Arc<dyn DeploymentRepo>,
    resource_repo: Arc<dyn ResourceRepo>,
    domain_repo: Arc<dyn DomainRepo>,
    cluster_service: Arc<dyn ClusterService>,
    application_client: Arc<dyn ApplicationClient>,
    auth_service: Arc<dyn AuthService>,
}

impl DeploymentServiceDefault {
    pub fn new(
        deployment_repo: Arc<dyn DeploymentRepo>,
        resource_repo: Arc<dyn ResourceRepo>,
        domain_repo: Arc<dyn DomainRepo>,
        cluster_service: Arc<dyn ClusterService>,
        application_client: Arc<dyn ApplicationClient>,
        auth_service: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            deployment_repo,
            resource_repo,
            domain_repo,
            cluster_service,
            application_client,
            auth_service,
        }
    }

    async fn load_resource(
        &self,
        resource_id: ResourceId,
    ) -> Result<Resource, DeploymentServiceError> {
        let record = self
            .resource_repo
            .get(resource_id.0)
            .await?
            .ok_or(DeploymentServiceError::ResourceNotFound)?;
        record.try_into().map_err(DeploymentServiceError::Internal)
    }

    fn validate_override(
        override_spec: &DeploymentTypeSpec,
    ) -> Result<(), DeploymentServiceError> {
        let DeploymentTypeSpec::Service(service) = override_spec;
        if !service.image.is_empty() && !validation::is_valid_image(&service.image) {
            return Err(DeploymentServiceError::Validation(format!(
                "Invalid image reference {:?}",
                service.image
            )));
        }
        for replicas in [service.min_replicas, service.max_replicas]
            .into_iter()
            .flatten()
        {
            if replicas < 1 {
                return Err(DeploymentServiceError::Validation(
                    "Replica counts must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn primary_hostname(
        &self,
        resource_id: ResourceId,
    ) -> Result<String, DeploymentServiceError> {
        Ok(self
            .domain_repo
            .get_primary_resource_domain(resource_id.0)
            .await?
            .map(|record| record.domain)
            .unwrap_or_default())
    }

    fn merged_to_persisted(
        merged: &ServiceDeploymentSpec,
    ) -> Result<(String, i32), DeploymentServiceError> {
        let stripped =
            DeploymentTypeSpec::Service(merged.clone()).stripped_for_persistence();
        Ok(codec::encode_deployment_spec(&stripped)?)
    }
}

#[async_trait]
impl DeploymentService for DeploymentServiceDefault {
    async fn create(
        &self,
        resource_id: ResourceId,
        region: &str,
        override_spec: Option<DeploymentTypeSpec>,
        auth: &TokenAuthorisation,
    ) -> Result<DeploymentId, DeploymentServiceError> {
        let resource = self.load_resource(resource_id).await?;
        self.auth_service
            .authorize(auth, Action::CreateDeployment, resource_id.0)
            .await?;

        let service_spec = resource.spec.as_service().ok_or_else(|| {
            DeploymentServiceError::Validation(format!(
                "Deployments are not supported for {} resources",
                resource.resource_type
            ))
        })?;
        if service_spec.port < 1 {
            return Err(DeploymentServiceError::Validation(
                "Service port must be at least 1".to_string(),
            ));
        }
        if let Some(override_spec) = &override_spec {
            Self::validate_override(override_spec)?;
        }
        if region.is_empty() {
            return Err(DeploymentServiceError::Validation(
                "A target region is required".to_string(),
            ));
        }

        let cluster = self.cluster_service.select_for_region(region).await?;

        let merged = merge::merge(&resource.spec, override_spec.as_ref(), region)?;
        if !validation::is_valid_image(&merged.image) {
            return Err(DeploymentServiceError::Validation(format!(
                "Invalid image reference {:?}",
                merged.image
            )));
        }

        let (spec_json, spec_version) = Self::merged_to_persisted(&merged)?;
        let record = self
            .deployment_repo
            .create_with_cleanup(&NewDeployment {
                resource_id: resource_id.0,
                cluster_id: cluster.id.0,
                region: region.to_string(),
                replicas: merged.min_replicas.unwrap_or(1),
                message: "Scheduling deployment".to_string(),
                spec: spec_json,
                spec_version,
            })
            .await?;
        let deployment_id = DeploymentId(record.id);

        info!(
            %deployment_id,
            %resource_id,
            region,
            cluster = %cluster.name,
            "created deployment"
        );

        // The CRD apply is deliberately outside the transaction. On failure
        // the row stays pending with an error message; reconciliation or a
        // retried create drives it from there.
        let hostname = self.primary_hostname(resource_id).await?;
        let application = project_service(
            resource_id,
            resource.workspace_id,
            region,
            &merged,
            service_spec,
            &hostname,
        );
        if let Err(apply_error) = apply(self.application_client.as_ref(), application).await {
            error!(%deployment_id, "failed to apply workload object: {apply_error}");
            self.deployment_repo
                .update_message(
                    record.id,
                    &format!("Failed to apply workload: {}", apply_error.to_safe_string()),
                )
                .await?;
            return Err(apply_error.into());
        }

        Ok(deployment_id)
    }

    async fn get(
        &self,
        id: DeploymentId,
        auth: &TokenAuthorisation,
    ) -> Result<Deployment, DeploymentServiceError> {
        let record = self
            .deployment_repo
            .get(id.0)
            .await?
            .ok_or(DeploymentServiceError::NotFound)?;
        self.auth_service
            .authorize(auth, Action::GetDeployment, record.resource_id)
            .await?;
        record.try_into().map_err(DeploymentServiceError::Internal)
    }

    async fn list(
        &self,
        resource_id: ResourceId,
        page_size: i32,
        page_token: &str,
        auth: &TokenAuthorisation,
    ) -> Result<(Vec<Deployment>, String), DeploymentServiceError> {
        self.load_resource(resource_id).await?;
        self.auth_service
            .authorize(auth, Action::ListDeployments, resource_id.0)
            .await?;
        let limit = paging::effective_page_size(page_size);
        let cursor =
            paging::decode_page_token(page_token).map_err(DeploymentServiceError::Validation)?;
        let records = self
            .deployment_repo
            .list(resource_id.0, limit, cursor)
            .await?;
        let next = paging::next_page_token(&records, limit, |record| record.id);
        let deployments = records
            .into_iter()
            .map(|record| record.try_into().map_err(DeploymentServiceError::Internal))
            .collect::<Result<Vec<Deployment>, _>>()?;
        Ok((deployments, next))
    }

    async fn delete(
        &self,
        id: DeploymentId,
        auth: &TokenAuthorisation,
    ) -> Result<(), DeploymentServiceError> {
        let record = self
            .deployment_repo
            .get(id.0)
            .await?
            .ok_or(DeploymentServiceError::NotFound)?;
        self.auth_service
            .authorize(auth, Action::DeleteDeployment, record.resource_id)
            .await?;
        if record.is_active {
            self.application_client
                .delete(&application_name(ResourceId(record.resource_id)))
                .await?;
        }
        self.deployment_repo.set_inactive(id.0).await?;
        Ok(())
    }

    async fn watch(
        &self,
        id: DeploymentId,
        auth: &TokenAuthorisation,
    ) -> Result<ReceiverStream<WatchEvent>, DeploymentServiceError> {
        let record = self
            .deployment_repo
            .get(id.0)
            .await?
            .ok_or(DeploymentServiceError::NotFound)?;
        self.auth_service
            .authorize(auth, Action::WatchDeployment, record.resource_id)
            .await?;

        let (tx, rx) = mpsc::channel(16);
        let deployment_repo = self.deployment_repo.clone();
        tokio::spawn(async move {
            let mut last_status: Option<DeploymentStatus> = None;
            let mut ticker = tokio::time::interval(WATCH_POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let record = match deployment_repo.get(id.0).await {
                    Ok(Some(record)) => record,
                    Ok(None) => break,
                    Err(err) => {
                        error!(deployment_id = %id, "watch poll failed: {err}");
                        break;
                    }
                };
                let status = match record.status.parse::<DeploymentStatus>() {
                    Ok(status) => status,
                    Err(err) => {
                        error!(deployment_id = %id, "watch poll failed: {err}");
                        break;
                    }
                };
                if last_status != Some(status) {
                    let event = WatchEvent {
                        deployment_id: id,
                        status,
                        message: record.message,
                        timestamp: Utc::now(),
                    };
                    // A slow client applies backpressure here; a dropped
                    // receiver ends the loop.
                    if tx.send(event).await.is_err() {
                        break;
                    }
                    last_status = Some(status);
                    if status.is_terminal() {
                        break;
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    async fn mark_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
        message: &str,
    ) -> Result<(), DeploymentServiceError> {
        self.deployment_repo
            .get(id.0)
            .await?
            .ok_or(DeploymentServiceError::NotFound)?;
        let now = Utc::now();
        let started_at = matches!(
            status,
            DeploymentStatus::Deploying | DeploymentStatus::Running
        )
        .then_some(now);
        let completed_at = status.is_terminal().then_some(now);
        self.deployment_repo
            .update_status(id.0, status, message, started_at, completed_at)
            .await?;
        Ok(())
    }
}
