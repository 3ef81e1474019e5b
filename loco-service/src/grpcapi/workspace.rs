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
use crate::service::workspace::{WorkspaceService, WorkspaceServiceError};
use loco_api_grpc::proto::loco::workspace::v1::workspace_service_server::WorkspaceService as WorkspaceServiceGrpc;
use loco_api_grpc::proto::loco::workspace::v1::{
    CreateWorkspaceRequest, CreateWorkspaceResponse, DeleteWorkspaceRequest,
    DeleteWorkspaceResponse, GetWorkspaceRequest, GetWorkspaceResponse, ListMembersRequest,
    ListMembersResponse, ListOrganizationWorkspacesRequest, ListOrganizationWorkspacesResponse,
    ListUserWorkspacesRequest, ListUserWorkspacesResponse, UpdateWorkspaceRequest,
    UpdateWorkspaceResponse,
};
use loco_common::model::{OrgId, WorkspaceId};
use loco_common::recorded_grpc_request;
use loco_common::SafeDisplay;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

impl From<WorkspaceServiceError> for Status {
    fn from(value: WorkspaceServiceError) -> Self {
        let message = value.to_safe_string();
        match value {
            WorkspaceServiceError::NotFound => Status::not_found(message),
            WorkspaceServiceError::OrganizationNotFound => Status::not_found(message),
            WorkspaceServiceError::AlreadyExists => Status::already_exists(message),
            WorkspaceServiceError::DeleteBlocked => Status::failed_precondition(message),
            WorkspaceServiceError::Validation(_) => Status::invalid_argument(message),
            WorkspaceServiceError::Auth(inner) => inner.into(),
            WorkspaceServiceError::Internal(_) => Status::internal(message),
        }
    }
}

pub struct WorkspaceGrpcApi {
    pub auth_service: Arc<dyn AuthService>,
    pub workspace_service: Arc<dyn WorkspaceService>,
}

impl WorkspaceGrpcApi {
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
        request: CreateWorkspaceRequest,
        metadata: &MetadataMap,
    ) -> Result<CreateWorkspaceResponse, Status> {
        let auth = self.auth(metadata).await?;
        let workspace = self
            .workspace_service
            .create(
                OrgId(request.organization_id),
                &request.name,
                &request.description,
                &auth,
            )
            .await?;
        Ok(CreateWorkspaceResponse {
            workspace: Some(workspace.into()),
        })
    }

    async fn get(
        &self,
        request: GetWorkspaceRequest,
        metadata: &MetadataMap,
    ) -> Result<GetWorkspaceResponse, Status> {
        let auth = self.auth(metadata).await?;
        let workspace = self
            .workspace_service
            .get(WorkspaceId(request.workspace_id), &auth)
            .await?;
        Ok(GetWorkspaceResponse {
            workspace: Some(workspace.into()),
        })
    }

    async fn list_user_workspaces(
        &self,
        request: ListUserWorkspacesRequest,
        metadata: &MetadataMap,
    ) -> Result<ListUserWorkspacesResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (workspaces, next_page_token) = self
            .workspace_service
            .list_for_user(request.page_size, &request.page_token, &auth)
            .await?;
        Ok(ListUserWorkspacesResponse {
            workspaces: workspaces.into_iter().map(Into::into).collect(),
            next_page_token,
        })
    }

    async fn list_organization_workspaces(
        &self,
        request: ListOrganizationWorkspacesRequest,
        metadata: &MetadataMap,
    ) -> Result<ListOrganizationWorkspacesResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (workspaces, next_page_token) = self
            .workspace_service
            .list_for_organization(
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
        request: UpdateWorkspaceRequest,
        metadata: &MetadataMap,
    ) -> Result<UpdateWorkspaceResponse, Status> {
        let auth = self.auth(metadata).await?;
        let workspace = self
            .workspace_service
            .update(
                WorkspaceId(request.workspace_id),
                &request.name,
                &request.description,
                &auth,
            )
            .await?;
        Ok(UpdateWorkspaceResponse {
            workspace: Some(workspace.into()),
        })
    }

    async fn delete(
        &self,
        request: DeleteWorkspaceRequest,
        metadata: &MetadataMap,
    ) -> Result<DeleteWorkspaceResponse, Status> {
        let auth = self.auth(metadata).await?;
        self.workspace_service
            .delete(WorkspaceId(request.workspace_id), &auth)
            .await?;
        Ok(DeleteWorkspaceResponse {})
    }

    async fn list_members(
        &self,
        request: ListMembersRequest,
        metadata: &MetadataMap,
    ) -> Result<ListMembersResponse, Status> {
        let auth = self.auth(metadata).await?;
        let members = self
            .workspace_service
            .list_members(WorkspaceId(request.workspace_id), &auth)
            .await?;
        Ok(ListMembersResponse {
            members: members.into_iter().map(Into::into).collect(),
        })
    }
}

#[tonic::async_trait]
impl WorkspaceServiceGrpc for WorkspaceGrpcApi {
    async fn create_workspace(
        &self,
        request: Request<CreateWorkspaceRequest>,
    ) -> Result<Response<CreateWorkspaceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!(
            "create_workspace",
            organization_id = r.organization_id,
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

    async fn get_workspace(
        &self,
        request: Request<GetWorkspaceRequest>,
    ) -> Result<Response<GetWorkspaceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("get_workspace", workspace_id = r.workspace_id);
        match self.get(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_user_workspaces(
        &self,
        request: Request<ListUserWorkspacesRequest>,
    ) -> Result<Response<ListUserWorkspacesResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("list_user_workspaces");
        match self
            .list_user_workspaces(r, &m)
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
            .list_organization_workspaces(r, &m)
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

    async fn update_workspace(
        &self,
        request: Request<UpdateWorkspaceRequest>,
    ) -> Result<Response<UpdateWorkspaceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("update_workspace", workspace_id = r.workspace_id);
        match self.update(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn delete_workspace(
        &self,
        request: Request<DeleteWorkspaceRequest>,
    ) -> Result<Response<DeleteWorkspaceResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("delete_workspace", workspace_id = r.workspace_id);
        match self.delete(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_members(
        &self,
        request: Request<ListMembersRequest>,
    ) -> Result<Response<ListMembersResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("list_members", workspace_id = r.workspace_id);
        match self
            .list_members(r, &m)
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
