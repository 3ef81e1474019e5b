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
use crate::service::organization::{OrganizationService, OrganizationServiceError};
use loco_api_grpc::proto::loco::organization::v1::organization_service_server::OrganizationService as OrganizationServiceGrpc;
use loco_api_grpc::proto::loco::organization::v1::{
    CreateOrganizationRequest, CreateOrganizationResponse, DeleteOrganizationRequest,
    DeleteOrganizationResponse, GetOrganizationRequest, GetOrganizationResponse,
    ListOrganizationWorkspacesRequest, ListOrganizationWorkspacesResponse,
    ListUserOrganizationsRequest, ListUserOrganizationsResponse, UpdateOrganizationRequest,
    UpdateOrganizationResponse,
};
use loco_common::model::OrgId;
use loco_common::recorded_grpc_request;
use loco_common::SafeDisplay;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

impl From<OrganizationServiceError> for Status {
    fn from(value: OrganizationServiceError) -> Self {
        let message = value.to_safe_string();
        match value {
            OrganizationServiceError::NotFound => Status::not_found(message),
            OrganizationServiceError::AlreadyExists => Status::already_exists(message),
            OrganizationServiceError::DeleteBlocked => Status::failed_precondition(message),
            OrganizationServiceError::Validation(_) => Status::invalid_argument(message),
            OrganizationServiceError::Auth(inner) => inner.into(),
            OrganizationServiceError::Internal(_) => Status::internal(message),
        }
    }
}

pub struct OrganizationGrpcApi {
    pub auth_service: Arc<dyn AuthService>,
    pub organization_service: Arc<dyn OrganizationService>,
}

impl OrganizationGrpcApi {
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
        request: CreateOrganizationRequest,
        metadata: &MetadataMap,
    ) -> Result<CreateOrganizationResponse, Status> {
        let auth = self.auth(metadata).await?;
        let organization = self
            .organization_service
            .create(&request.name, &auth)
            .await?;
        Ok(CreateOrganizationResponse {
            organization: Some(organization.into()),
        })
    }

    async fn get(
        &self,
        request: GetOrganizationRequest,
        metadata: &MetadataMap,
    ) -> Result<GetOrganizationResponse, Status> {
        let auth = self.auth(metadata).await?;
        let organization = self
            .organization_service
            .get(OrgId(request.organization_id), &auth)
            .await?;
        Ok(GetOrganizationResponse {
            organization: Some(organization.into()),
        })
    }

    async fn list_user_organizations(
        &self,
        request: ListUserOrganizationsRequest,
        metadata: &MetadataMap,
    ) -> Result<ListUserOrganizationsResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (organizations, next_page_token) = self
            .organization_service
            .list_for_user(request.page_size, &request.page_token, &auth)
            .await?;
        Ok(ListUserOrganizationsResponse {
            organizations: organizations.into_iter().map(Into::into).collect(),
            next_page_token,
        })
    }

    async fn list_workspaces(
        &self,
        request: ListOrganizationWorkspacesRequest,
        metadata: &MetadataMap,
    ) -> Result<ListOrganizationWorkspacesResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (workspaces, next_page_token) = self
            .organization_service
            .list_workspaces(
                OrgId(request.organization_id),
                request.page_size,
                &request.page_token,
                &auth,
            )
            .await?;
        Ok(ListOrganizationWorkspacesResponse {
            workspaces: workspaces.into_iter().map(Into::into).collect(),
            next_page_token,
        })
    }

    async fn update(
        &self,
        request: UpdateOrganizationRequest,
        metadata: &MetadataMap,
    ) -> Result<UpdateOrganizationResponse, Status> {
        let auth = self.auth(metadata).await?;
        let organization = self
            .organization_service
            .update(OrgId(request.organization_id), &request.name, &auth)
            .await?;
        Ok(UpdateOrganizationResponse {
            organization: Some(organization.into()),
        })
    }

    async fn delete(
        &self,
        request: DeleteOrganizationRequest,
        metadata: &MetadataMap,
    ) -> Result<DeleteOrganizationResponse, Status> {
        let auth = self.auth(metadata).await?;
        self.organization_service
            .delete(OrgId(request.organization_id), &auth)
            .await?;
        Ok(DeleteOrganizationResponse {})
    }
}

#[tonic::async_trait]
impl OrganizationServiceGrpc for OrganizationGrpcApi {
    async fn create_organization(
        &self,
        request: Request<CreateOrganizationRequest>,
    ) -> Result<Response<CreateOrganizationResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("create_organization", name = %r.name);
        match self.create(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_organization(
        &self,
        request: Request<GetOrganizationRequest>,
    ) -> Result<Response<GetOrganizationResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record =
            recorded_grpc_request!("get_organization", organization_id = r.organization_id);
        match self.get(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_user_organizations(
        &self,
        request: Request<ListUserOrganizationsRequest>,
    ) -> Result<Response<ListUserOrganizationsResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("list_user_organizations");
        match self
            .list_user_organizations(r, &m)
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

    async fn list_organization_workspaces(
        &self,
        request: Request<ListOrganizationWorkspacesRequest>,
    ) -> Result<Response<ListOrganizationWorkspacesResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!(
            "list_organization_workspaces",
            organization_id = r.organization_id
        );
        match self
            .list_workspaces(r, &m)
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

    async fn update_organization(
        &self,
        request: Request<UpdateOrganizationRequest>,
    ) -> Result<Response<UpdateOrganizationResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record =
            recorded_grpc_request!("update_organization", organization_id = r.organization_id);
        match self.update(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn delete_organization(
        &self,
        request: Request<DeleteOrganizationRequest>,
    ) -> Result<Response<DeleteOrganizationResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record =
            recorded_grpc_request!("delete_organization", organization_id = r.organization_id);
        match self.delete(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }
}
