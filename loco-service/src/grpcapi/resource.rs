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
use crate::model::{DomainInput, ResourceType};
use crate::service::auth::AuthService;
use crate::service::resource::{ResourceService, ResourceServiceError};
use crate::spec::ResourceTypeSpec;
use futures::Stream;
use loco_api_grpc::proto::loco::resource::v1::resource_service_server::ResourceService as ResourceServiceGrpc;
use loco_api_grpc::proto::loco::resource::v1::{
    CreateResourceRequest, CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    GetEventsRequest, GetEventsResponse, GetResourceByNameRequest, GetResourceByNameResponse,
    GetResourceRequest, GetResourceResponse, GetResourceStatusRequest, GetResourceStatusResponse,
    ListRegionsRequest, ListRegionsResponse, ListResourcesRequest, ListResourcesResponse,
    RegionStatusEntry, ResourceEvent, ScaleResourceRequest, ScaleResourceResponse,
    StreamLogsRequest, StreamLogsResponse, UpdateResourceEnvRequest, UpdateResourceEnvResponse,
    UpdateResourceRequest, UpdateResourceResponse,
};
use loco_api_grpc::proto::loco::resource::v1 as resource_proto;
use loco_common::model::{ResourceId, WorkspaceId};
use loco_common::recorded_grpc_request;
use loco_common::SafeDisplay;
use std::pin::Pin;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

impl From<ResourceServiceError> for Status {
    fn from(value: ResourceServiceError) -> Self {
        let message = value.to_safe_string();
        match value {
            ResourceServiceError::NotFound => Status::not_found(message),
            ResourceServiceError::WorkspaceNotFound => Status::not_found(message),
            ResourceServiceError::AlreadyExists => Status::already_exists(message),
            ResourceServiceError::NoActiveDeployment(_) => Status::not_found(message),
            ResourceServiceError::Validation(_) => Status::invalid_argument(message),
            ResourceServiceError::Auth(inner) => inner.into(),
            ResourceServiceError::Domain(inner) => inner.into(),
            ResourceServiceError::Codec(_) => Status::invalid_argument(message),
            ResourceServiceError::Deployment(inner) => (*inner).into(),
            ResourceServiceError::ClusterApi(_) => Status::internal(message),
            ResourceServiceError::Internal(_) => Status::internal(message),
        }
    }
}

pub struct ResourceGrpcApi {
    pub auth_service: Arc<dyn AuthService>,
    pub resource_service: Arc<dyn ResourceService>,
}

impl ResourceGrpcApi {
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
        request: CreateResourceRequest,
        metadata: &MetadataMap,
    ) -> Result<CreateResourceResponse, Status> {
        let auth = self.auth(metadata).await?;
        let resource_type: ResourceType = resource_proto::ResourceType::try_from(
            request.resource_type,
        )
        .map_err(|_| Status::invalid_argument("Invalid resource type"))?
        .try_into()
        .map_err(Status::invalid_argument)?;
        let spec: ResourceTypeSpec = request
            .spec
            .ok_or_else(|| Status::invalid_argument("Missing spec"))?
            .try_into()
            .map_err(Status::invalid_argument)?;
        let domain: DomainInput = request
            .domain
            .ok_or_else(|| Status::invalid_argument("Missing domain"))?
            .try_into()
            .map_err(Status::invalid_argument)?;
        let resource = self
            .resource_service
            .create(
                WorkspaceId(request.workspace_id),
                &request.name,
                resource_type,
                &request.description,
                spec,
                domain,
                &auth,
            )
            .await?;
        Ok(CreateResourceResponse {
            resource: Some(resource.into()),
        })
    }

    async fn get(
        &self,
        request: GetResourceRequest,
        metadata: &MetadataMap,
    ) -> Result<GetResourceResponse, Status> {
        let auth = self.auth(metadata).await?;
        let resource = self
            .resource_service
            .get(ResourceId(request.resource_id), &auth)
            .await?;
        Ok(GetResourceResponse {
            resource: Some(resource.into()),
        })
    }

    async fn get_by_name(
        &self,
        request: GetResourceByNameRequest,
        metadata: &MetadataMap,
    ) -> Result<GetResourceByNameResponse, Status> {
        let auth = self.auth(metadata).await?;
        let resource = self
            .resource_service
            .get_by_name(WorkspaceId(request.workspace_id), &request.name, &auth)
            .await?;
        Ok(GetResourceByNameResponse {
            resource: Some(resource.into()),
        })
    }

    async fn list(
        &self,
        request: ListResourcesRequest,
        metadata: &MetadataMap,
    ) -> Result<ListResourcesResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (resources, next_page_token) = self
            .resource_service
            .list(
                WorkspaceId(request.workspace_id),
                request.page_size,
                &request.page_token,
                &auth,
            )
            .await?;
        Ok(ListResourcesResponse {
            resources: resources.into_iter().map(Into::into).collect(),
            next_page_token,
        })
    }

    async fn update(
        &self,
        request: UpdateResourceRequest,
        metadata: &MetadataMap,
    ) -> Result<UpdateResourceResponse, Status> {
        let auth = self.auth(metadata).await?;
        let resource = self
            .resource_service
            .update_name(ResourceId(request.resource_id), &request.name, &auth)
            .await?;
        Ok(UpdateResourceResponse {
            resource: Some(resource.into()),
        })
    }

    async fn delete(
        &self,
        request: DeleteResourceRequest,
        metadata: &MetadataMap,
    ) -> Result<DeleteResourceResponse, Status> {
        let auth = self.auth(metadata).await?;
        self.resource_service
            .delete(ResourceId(request.resource_id), &auth)
            .await?;
        Ok(DeleteResourceResponse {})
    }

    async fn get_status(
        &self,
        request: GetResourceStatusRequest,
        metadata: &MetadataMap,
    ) -> Result<GetResourceStatusResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (status, regions) = self
            .resource_service
            .get_status(ResourceId(request.resource_id), &auth)
            .await?;
        Ok(GetResourceStatusResponse {
            status: resource_proto::ResourceStatus::from(status) as i32,
            regions: regions
                .into_iter()
                .map(|(region, status)| RegionStatusEntry {
                    region,
                    status: resource_proto::ResourceStatus::from(status) as i32,
                })
                .collect(),
        })
    }

    async fn list_regions(
        &self,
        metadata: &MetadataMap,
    ) -> Result<ListRegionsResponse, Status> {
        self.auth(metadata).await?;
        let regions = self.resource_service.list_regions().await?;
        Ok(ListRegionsResponse {
            regions: regions.into_iter().map(Into::into).collect(),
        })
    }

    async fn get_events(
        &self,
        request: GetEventsRequest,
        metadata: &MetadataMap,
    ) -> Result<GetEventsResponse, Status> {
        let auth = self.auth(metadata).await?;
        let events = self
            .resource_service
            .get_events(ResourceId(request.resource_id), &auth)
            .await?;
        Ok(GetEventsResponse {
            events: events
                .into_iter()
                .map(|event| ResourceEvent {
                    reason: event.reason,
                    message: event.message,
                    event_type: event.event_type,
                    timestamp: event
                        .timestamp
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_default(),
                })
                .collect(),
        })
    }

    async fn scale(
        &self,
        request: ScaleResourceRequest,
        metadata: &MetadataMap,
    ) -> Result<ScaleResourceResponse, Status> {
        let auth = self.auth(metadata).await?;
        let region = (!request.region.is_empty()).then_some(request.region.as_str());
        let cpu = (!request.cpu.is_empty()).then_some(request.cpu.as_str());
        let memory = (!request.memory.is_empty()).then_some(request.memory.as_str());
        let min_replicas = (request.min_replicas != 0).then_some(request.min_replicas);
        let max_replicas = (request.max_replicas != 0).then_some(request.max_replicas);
        let deployment_ids = self
            .resource_service
            .scale(
                ResourceId(request.resource_id),
                region,
                cpu,
                memory,
                min_replicas,
                max_replicas,
                &auth,
            )
            .await?;
        Ok(ScaleResourceResponse {
            deployment_ids: deployment_ids.into_iter().map(|id| id.0).collect(),
        })
    }

    async fn update_env(
        &self,
        request: UpdateResourceEnvRequest,
        metadata: &MetadataMap,
    ) -> Result<UpdateResourceEnvResponse, Status> {
        let auth = self.auth(metadata).await?;
        let region = (!request.region.is_empty()).then_some(request.region.as_str());
        let deployment_ids = self
            .resource_service
            .update_env(
                ResourceId(request.resource_id),
                region,
                request.env.into_iter().collect(),
                &auth,
            )
            .await?;
        Ok(UpdateResourceEnvResponse {
            deployment_ids: deployment_ids.into_iter().map(|id| id.0).collect(),
        })
    }
}

#[tonic::async_trait]
impl ResourceServiceGrpc for ResourceGrpcApi {
    type StreamLogsStream =
        Pin<Box<dyn Stream<Item = Result<StreamLogsResponse, Status>> + Send + 'static>>;

    async fn create_resource(
        &self,
        request: Request<CreateResourceRequest>,
    ) -> Result<Response<CreateResourceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!(
            "create_resource",
            workspace_id = r.workspace_id,
            name = %r.name
        );
        match self.create(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_resource(
        &self,
        request: Request<GetResourceRequest>,
    ) -> Result<Response<GetResourceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("get_resource", resource_id = r.resource_id);
        match self.get(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_resource_by_name(
        &self,
        request: Request<GetResourceByNameRequest>,
    ) -> Result<Response<GetResourceByNameResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!(
            "get_resource_by_name",
            workspace_id = r.workspace_id,
            name = %r.name
        );
        match self.get_by_name(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_resources(
        &self,
        request: Request<ListResourcesRequest>,
    ) -> Result<Response<ListResourcesResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("list_resources", workspace_id = r.workspace_id);
        match self.list(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn update_resource(
        &self,
        request: Request<UpdateResourceRequest>,
    ) -> Result<Response<UpdateResourceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("update_resource", resource_id = r.resource_id);
        match self.update(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn delete_resource(
        &self,
        request: Request<DeleteResourceRequest>,
    ) -> Result<Response<DeleteResourceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("delete_resource", resource_id = r.resource_id);
        match self.delete(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_resource_status(
        &self,
        request: Request<GetResourceStatusRequest>,
    ) -> Result<Response<GetResourceStatusResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("get_resource_status", resource_id = r.resource_id);
        match self.get_status(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_regions(
        &self,
        request: Request<ListRegionsRequest>,
    ) -> Result<Response<ListRegionsResponse>, Status> {
        let (m, _, _) = request.into_parts();
        let record = recorded_grpc_request!("list_regions");
        match self.list_regions(&m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn stream_logs(
        &self,
        request: Request<StreamLogsRequest>,
    ) -> Result<Response<Self::StreamLogsStream>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("stream_logs", resource_id = r.resource_id);
        let auth = match self.auth(&m).instrument(record.span.clone()).await {
            Ok(auth) => auth,
            Err(status) => {
                let kind = error_kind(&status);
                return Err(record.fail(status, kind));
            }
        };
        match self
            .resource_service
            .stream_logs(ResourceId(r.resource_id), &auth)
            .instrument(record.span.clone())
            .await
        {
            Ok(lines) => {
                let stream = tokio_stream::iter(lines.into_iter().map(|line| {
                    Ok(StreamLogsResponse {
                        pod: line.pod,
                        line: line.line,
                    })
                }));
                Ok(record.succeed(Response::new(
                    Box::pin(stream) as Self::StreamLogsStream
                )))
            }
            Err(err) => {
                let status = Status::from(err);
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_events(
        &self,
        request: Request<GetEventsRequest>,
    ) -> Result<Response<GetEventsResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("get_events", resource_id = r.resource_id);
        match self.get_events(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn scale_resource(
        &self,
        request: Request<ScaleResourceRequest>,
    ) -> Result<Response<ScaleResourceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("scale_resource", resource_id = r.resource_id);
        match self.scale(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn update_resource_env(
        &self,
        request: Request<UpdateResourceEnvRequest>,
    ) -> Result<Response<UpdateResourceEnvResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("update_resource_env", resource_id = r.resource_id);
        match self.update_env(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }
}
