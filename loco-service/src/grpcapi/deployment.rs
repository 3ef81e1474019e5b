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
use crate::grpcapi::{error_kind, get_authorisation_token};
use crate::service::auth::AuthService;
use crate::service::deployment::{DeploymentService, DeploymentServiceError};
use crate::spec::DeploymentTypeSpec;
use crate::spec::merge::MergeError;
use futures::{Stream, StreamExt};
use loco_api_grpc::proto::loco::deployment::v1::deployment_service_server::DeploymentService as DeploymentServiceGrpc;
use loco_api_grpc::proto::loco::deployment::v1::{
    CreateDeploymentRequest, CreateDeploymentResponse, DeleteDeploymentRequest,
    DeleteDeploymentResponse, GetDeploymentRequest, GetDeploymentResponse,
    ListDeploymentsRequest, ListDeploymentsResponse, WatchDeploymentRequest,
    WatchDeploymentResponse,
};
use loco_api_grpc::proto::loco::deployment::v1 as deployment_proto;
use loco_common::model::{DeploymentId, ResourceId};
use loco_common::recorded_grpc_request;
use loco_common::SafeDisplay;
use std::pin::Pin;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

impl From<DeploymentServiceError> for Status {
    fn from(value: DeploymentServiceError) -> Self {
        let message = value.to_safe_string();
        match value {
            DeploymentServiceError::NotFound => Status::not_found(message),
            DeploymentServiceError::ResourceNotFound => Status::not_found(message),
            DeploymentServiceError::NoClusterForRegion(_) => Status::not_found(message),
            DeploymentServiceError::Validation(_) => Status::invalid_argument(message),
            DeploymentServiceError::Auth(inner) => inner.into(),
            DeploymentServiceError::Merge(MergeError::UnknownRegion(_)) => {
                Status::invalid_argument(message)
            }
            DeploymentServiceError::Merge(_) => Status::invalid_argument(message),
            DeploymentServiceError::Codec(_) => Status::invalid_argument(message),
            DeploymentServiceError::ClusterApi(_) => Status::internal(message),
            DeploymentServiceError::Internal(_) => Status::internal(message),
        }
    }
}

pub struct DeploymentGrpcApi {
    pub auth_service: Arc<dyn AuthService>,
    pub deployment_service: Arc<dyn DeploymentService>,
}

impl DeploymentGrpcApi {
    async fn auth(&self, metadata: &MetadataMap) -> Result<TokenAuthorisation, Status> {
        match get_authorisation_token(metadata) {
            Some(secret) => self
                .auth_service
                .authorization(&secret)
                .await
                .map_err(Into::into),
            None => Err(Status::unauthenticated("Missing token")),
        }
    }

    async fn create(
        &self,
        request: CreateDeploymentRequest,
        metadata: &MetadataMap,
    ) -> Result<CreateDeploymentResponse, Status> {
        let auth = self.auth(metadata).await?;
        let override_spec = request
            .spec
            .map(DeploymentTypeSpec::try_from)
            .transpose()
            .map_err(Status::invalid_argument)?;
        let deployment_id = self
            .deployment_service
            .create(
                ResourceId(request.resource_id),
                &request.region,
                override_spec,
                &auth,
            )
            .await?;
        Ok(CreateDeploymentResponse {
            deployment_id: deployment_id.0,
        })
    }

    async fn get(
        &self,
        request: GetDeploymentRequest,
        metadata: &MetadataMap,
    ) -> Result<GetDeploymentResponse, Status> {
        let auth = self.auth(metadata).await?;
        let deployment = self
            .deployment_service
            .get(DeploymentId(request.deployment_id), &auth)
            .await?;
        Ok(GetDeploymentResponse {
            deployment: Some(deployment.into()),
        })
    }

    async fn list(
        &self,
        request: ListDeploymentsRequest,
        metadata: &MetadataMap,
    ) -> Result<ListDeploymentsResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (deployments, next_page_token) = self
            .deployment_service
            .list(
                ResourceId(request.resource_id),
                request.page_size,
                &request.page_token,
                &auth,
            )
            .await?;
        Ok(ListDeploymentsResponse {
            deployments: deployments.into_iter().map(Into::into).collect(),
            next_page_token,
        })
    }

    async fn delete(
        &self,
        request: DeleteDeploymentRequest,
        metadata: &MetadataMap,
    ) -> Result<DeleteDeploymentResponse, Status> {
        let auth = self.auth(metadata).await?;
        self.deployment_service
            .delete(DeploymentId(request.deployment_id), &auth)
            .await?;
        Ok(DeleteDeploymentResponse {})
    }
}

#[tonic::async_trait]
impl DeploymentServiceGrpc for DeploymentGrpcApi {
    type WatchDeploymentStream =
        Pin<Box<dyn Stream<Item = Result<WatchDeploymentResponse, Status>> + Send + 'static>>;

    async fn create_deployment(
        &self,
        request: Request<CreateDeploymentRequest>,
    ) -> Result<Response<CreateDeploymentResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!(
            "create_deployment",
            resource_id = r.resource_id,
            region = %r.region
        );
        match self.create(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_deployment(
        &self,
        request: Request<GetDeploymentRequest>,
    ) -> Result<Response<GetDeploymentResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("get_deployment", deployment_id = r.deployment_id);
        match self.get(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_deployments(
        &self,
        request: Request<ListDeploymentsRequest>,
    ) -> Result<Response<ListDeploymentsResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("list_deployments", resource_id = r.resource_id);
        match self.list(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn delete_deployment(
        &self,
        request: Request<DeleteDeploymentRequest>,
    ) -> Result<Response<DeleteDeploymentResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record =
            recorded_grpc_request!("delete_deployment", deployment_id = r.deployment_id);
        match self.delete(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn watch_deployment(
        &self,
        request: Request<WatchDeploymentRequest>,
    ) -> Result<Response<Self::WatchDeploymentStream>, Status> {
        let (m, _, r) = request.into_parts();
        let record =
            recorded_grpc_request!("watch_deployment", deployment_id = r.deployment_id);
        let auth = match self.auth(&m).instrument(record.span.clone()).await {
            Ok(auth) => auth,
            Err(status) => {
                let kind = error_kind(&status);
                return Err(record.fail(status, kind));
            }
        };
        match self
            .deployment_service
            .watch(DeploymentId(r.deployment_id), &auth)
            .instrument(record.span.clone())
            .await
        {
            Ok(events) => {
                let stream = events.map(|event| {
                    Ok(WatchDeploymentResponse {
                        deployment_id: event.deployment_id.0,
                        status: deployment_proto::DeploymentStatus::from(event.status) as i32,
                        message: event.message,
                        timestamp: event.timestamp.to_rfc3339(),
                    })
                });
                Ok(record.succeed(Response::new(
                    Box::pin(stream) as Self::WatchDeploymentStream
                )))
            }
            Err(err) => {
                let status = Status::from(err);
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }
}
