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
use crate::model::DomainInput;
use crate::service::auth::AuthService;
use crate::service::domain::{DomainService, DomainServiceError};
use loco_api_grpc::proto::loco::domain::v1::domain_service_server::DomainService as DomainServiceGrpc;
use loco_api_grpc::proto::loco::domain::v1::{
    AddResourceDomainRequest, AddResourceDomainResponse, CheckDomainAvailabilityRequest,
    CheckDomainAvailabilityResponse, CreatePlatformDomainRequest, CreatePlatformDomainResponse,
    ListPlatformDomainsRequest, ListPlatformDomainsResponse, ListResourceDomainsRequest,
    ListResourceDomainsResponse, RemoveResourceDomainRequest, RemoveResourceDomainResponse,
    SetPlatformDomainActiveRequest, SetPlatformDomainActiveResponse,
    SetPrimaryResourceDomainRequest, SetPrimaryResourceDomainResponse,
    UpdateResourceDomainRequest, UpdateResourceDomainResponse,
};
use loco_common::model::{DomainId, PlatformDomainId, ResourceId};
use loco_common::recorded_grpc_request;
use loco_common::SafeDisplay;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

impl From<DomainServiceError> for Status {
    fn from(value: DomainServiceError) -> Self {
        let message = value.to_safe_string();
        match value {
            DomainServiceError::NotFound => Status::not_found(message),
            DomainServiceError::ResourceNotFound => Status::not_found(message),
            DomainServiceError::PlatformDomainUnavailable => Status::invalid_argument(message),
            DomainServiceError::AlreadyExists => Status::already_exists(message),
            DomainServiceError::CannotRemovePrimary => Status::failed_precondition(message),
            DomainServiceError::CannotRemoveLastDomain => Status::failed_precondition(message),
            DomainServiceError::Validation(_) => Status::invalid_argument(message),
            DomainServiceError::Auth(inner) => inner.into(),
            DomainServiceError::Internal(_) => Status::internal(message),
        }
    }
}

pub struct DomainGrpcApi {
    pub auth_service: Arc<dyn AuthService>,
    pub domain_service: Arc<dyn DomainService>,
}

impl DomainGrpcApi {
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

    async fn create_platform_domain(
        &self,
        request: CreatePlatformDomainRequest,
        metadata: &MetadataMap,
    ) -> Result<CreatePlatformDomainResponse, Status> {
        let auth = self.auth(metadata).await?;
        let platform_domain = self
            .domain_service
            .create_platform_domain(&request.domain, &auth)
            .await?;
        Ok(CreatePlatformDomainResponse {
            platform_domain: Some(platform_domain.into()),
        })
    }

    async fn list_platform_domains(
        &self,
        request: ListPlatformDomainsRequest,
        metadata: &MetadataMap,
    ) -> Result<ListPlatformDomainsResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (platform_domains, next_page_token) = self
            .domain_service
            .list_platform_domains(request.page_size, &request.page_token, &auth)
            .await?;
        Ok(ListPlatformDomainsResponse {
            platform_domains: platform_domains.into_iter().map(Into::into).collect(),
            next_page_token,
        })
    }

    async fn set_platform_domain_active(
        &self,
        request: SetPlatformDomainActiveRequest,
        metadata: &MetadataMap,
    ) -> Result<SetPlatformDomainActiveResponse, Status> {
        let auth = self.auth(metadata).await?;
        let platform_domain = self
            .domain_service
            .set_platform_domain_active(
                PlatformDomainId(request.platform_domain_id),
                request.is_active,
                &auth,
            )
            .await?;
        Ok(SetPlatformDomainActiveResponse {
            platform_domain: Some(platform_domain.into()),
        })
    }

    async fn add_resource_domain(
        &self,
        request: AddResourceDomainRequest,
        metadata: &MetadataMap,
    ) -> Result<AddResourceDomainResponse, Status> {
        let auth = self.auth(metadata).await?;
        let input: DomainInput = request
            .domain
            .ok_or_else(|| Status::invalid_argument("Missing domain"))?
            .try_into()
            .map_err(Status::invalid_argument)?;
        let domain = self
            .domain_service
            .add_resource_domain(ResourceId(request.resource_id), &input, &auth)
            .await?;
        Ok(AddResourceDomainResponse {
            domain: Some(domain.into()),
        })
    }

    async fn update_resource_domain(
        &self,
        request: UpdateResourceDomainRequest,
        metadata: &MetadataMap,
    ) -> Result<UpdateResourceDomainResponse, Status> {
        let auth = self.auth(metadata).await?;
        let domain = self
            .domain_service
            .update_resource_domain(DomainId(request.domain_id), &request.hostname, &auth)
            .await?;
        Ok(UpdateResourceDomainResponse {
            domain: Some(domain.into()),
        })
    }

    async fn set_primary(
        &self,
        request: SetPrimaryResourceDomainRequest,
        metadata: &MetadataMap,
    ) -> Result<SetPrimaryResourceDomainResponse, Status> {
        let auth = self.auth(metadata).await?;
        self.domain_service
            .set_primary(
                ResourceId(request.resource_id),
                DomainId(request.domain_id),
                &auth,
            )
            .await?;
        Ok(SetPrimaryResourceDomainResponse {})
    }

    async fn remove(
        &self,
        request: RemoveResourceDomainRequest,
        metadata: &MetadataMap,
    ) -> Result<RemoveResourceDomainResponse, Status> {
        let auth = self.auth(metadata).await?;
        self.domain_service
            .remove(DomainId(request.domain_id), &auth)
            .await?;
        Ok(RemoveResourceDomainResponse {})
    }

    async fn check_availability(
        &self,
        request: CheckDomainAvailabilityRequest,
        metadata: &MetadataMap,
    ) -> Result<CheckDomainAvailabilityResponse, Status> {
        self.auth(metadata).await?;
        let available = self
            .domain_service
            .check_availability(&request.domain)
            .await?;
        Ok(CheckDomainAvailabilityResponse { available })
    }

    async fn list_resource_domains(
        &self,
        request: ListResourceDomainsRequest,
        metadata: &MetadataMap,
    ) -> Result<ListResourceDomainsResponse, Status> {
        let auth = self.auth(metadata).await?;
        let domains = self
            .domain_service
            .list_resource_domains(ResourceId(request.resource_id), &auth)
            .await?;
        Ok(ListResourceDomainsResponse {
            domains: domains.into_iter().map(Into::into).collect(),
        })
    }
}

#[tonic::async_trait]
impl DomainServiceGrpc for DomainGrpcApi {
    async fn create_platform_domain(
        &self,
        request: Request<CreatePlatformDomainRequest>,
    ) -> Result<Response<CreatePlatformDomainResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("create_platform_domain", domain = %r.domain);
        match self
            .create_platform_domain(r, &m)
            .instrument(record.span.clone())
            .await
        {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_platform_domains(
        &self,
        request: Request<ListPlatformDomainsRequest>,
    ) -> Result<Response<ListPlatformDomainsResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("list_platform_domains");
        match self
            .list_platform_domains(r, &m)
            .instrument(record.span.clone())
            .await
        {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn set_platform_domain_active(
        &self,
        request: Request<SetPlatformDomainActiveRequest>,
    ) -> Result<Response<SetPlatformDomainActiveResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!(
            "set_platform_domain_active",
            platform_domain_id = r.platform_domain_id
        );
        match self
            .set_platform_domain_active(r, &m)
            .instrument(record.span.clone())
            .await
        {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn add_resource_domain(
        &self,
        request: Request<AddResourceDomainRequest>,
    ) -> Result<Response<AddResourceDomainResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("add_resource_domain", resource_id = r.resource_id);
        match self
            .add_resource_domain(r, &m)
            .instrument(record.span.clone())
            .await
        {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn update_resource_domain(
        &self,
        request: Request<UpdateResourceDomainRequest>,
    ) -> Result<Response<UpdateResourceDomainResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record =
            recorded_grpc_request!("update_resource_domain", domain_id = r.domain_id);
        match self
            .update_resource_domain(r, &m)
            .instrument(record.span.clone())
            .await
        {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn set_primary_resource_domain(
        &self,
        request: Request<SetPrimaryResourceDomainRequest>,
    ) -> Result<Response<SetPrimaryResourceDomainResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!(
            "set_primary_resource_domain",
            resource_id = r.resource_id,
            domain_id = r.domain_id
        );
        match self.set_primary(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn remove_resource_domain(
        &self,
        request: Request<RemoveResourceDomainRequest>,
    ) -> Result<Response<RemoveResourceDomainResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record =
            recorded_grpc_request!("remove_resource_domain", domain_id = r.domain_id);
        match self.remove(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn check_domain_availability(
        &self,
        request: Request<CheckDomainAvailabilityRequest>,
    ) -> Result<Response<CheckDomainAvailabilityResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("check_domain_availability", domain = %r.domain);
        match self
            .check_availability(r, &m)
            .instrument(record.span.clone())
            .await
        {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_resource_domains(
        &self,
        request: Request<ListResourceDomainsRequest>,
    ) -> Result<Response<ListResourceDomainsResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record =
            recorded_grpc_request!("list_resource_domains", resource_id = r.resource_id);
        match self
            .list_resource_domains(r, &m)
            .instrument(record.span.clone())
            .await
        {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }
}
