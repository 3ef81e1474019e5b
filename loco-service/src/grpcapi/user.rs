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
use crate::grpcapi::{error_kind, get_authorisation_token, COOKIE_KEY};
use crate::service::auth::AuthService;
use crate::service::token::TokenService;
use crate::service::user::{UserService, UserServiceError};
use loco_api_grpc::proto::loco::user::v1::user_service_server::UserService as UserServiceGrpc;
use loco_api_grpc::proto::loco::user::v1::{
    CreateUserRequest, CreateUserResponse, DeleteUserRequest, DeleteUserResponse, GetUserRequest,
    GetUserResponse, ListUsersRequest, ListUsersResponse, LogoutRequest, LogoutResponse,
    UpdateRolesRequest, UpdateRolesResponse, UpdateUserRequest, UpdateUserResponse, WhoAmIRequest,
    WhoAmIResponse,
};
use loco_common::model::auth::EntityScope;
use loco_common::model::UserId;
use loco_common::recorded_grpc_request;
use loco_common::SafeDisplay;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

impl From<UserServiceError> for Status {
    fn from(value: UserServiceError) -> Self {
        let message = value.to_safe_string();
        match value {
            UserServiceError::NotFound => Status::not_found(message),
            UserServiceError::AlreadyExists => Status::already_exists(message),
            UserServiceError::DeleteBlocked => Status::failed_precondition(message),
            UserServiceError::Validation(_) => Status::invalid_argument(message),
            UserServiceError::Auth(inner) => inner.into(),
            UserServiceError::Internal(_) => Status::internal(message),
        }
    }
}

pub struct UserGrpcApi {
    pub auth_service: Arc<dyn AuthService>,
    pub user_service: Arc<dyn UserService>,
    pub token_service: Arc<dyn TokenService>,
}

impl UserGrpcApi {
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
        request: CreateUserRequest,
        metadata: &MetadataMap,
    ) -> Result<CreateUserResponse, Status> {
        let auth = self.auth(metadata).await?;
        let avatar = if request.avatar.is_empty() {
            None
        } else {
            Some(request.avatar.as_str())
        };
        let user = self
            .user_service
            .create(
                &request.external_id,
                &request.email,
                &request.name,
                avatar,
                &auth,
            )
            .await?;
        Ok(CreateUserResponse {
            user: Some(user.into()),
        })
    }

    async fn get(
        &self,
        request: GetUserRequest,
        metadata: &MetadataMap,
    ) -> Result<GetUserResponse, Status> {
        let auth = self.auth(metadata).await?;
        let user = self
            .user_service
            .get(UserId(request.user_id), &auth)
            .await?;
        Ok(GetUserResponse {
            user: Some(user.into()),
        })
    }

    async fn who_am_i(&self, metadata: &MetadataMap) -> Result<WhoAmIResponse, Status> {
        let auth = self.auth(metadata).await?;
        let user = self.user_service.who_am_i(&auth).await?;
        Ok(WhoAmIResponse {
            user: Some(user.into()),
        })
    }

    async fn update(
        &self,
        request: UpdateUserRequest,
        metadata: &MetadataMap,
    ) -> Result<UpdateUserResponse, Status> {
        let auth = self.auth(metadata).await?;
        let avatar = if request.avatar.is_empty() {
            None
        } else {
            Some(request.avatar.as_str())
        };
        let user = self
            .user_service
            .update_avatar(UserId(request.user_id), avatar, &auth)
            .await?;
        Ok(UpdateUserResponse {
            user: Some(user.into()),
        })
    }

    async fn list(
        &self,
        request: ListUsersRequest,
        metadata: &MetadataMap,
    ) -> Result<ListUsersResponse, Status> {
        let auth = self.auth(metadata).await?;
        let (users, next_page_token) = self
            .user_service
            .list(request.page_size, &request.page_token, &auth)
            .await?;
        Ok(ListUsersResponse {
            users: users.into_iter().map(Into::into).collect(),
            next_page_token,
        })
    }

    async fn delete(
        &self,
        request: DeleteUserRequest,
        metadata: &MetadataMap,
    ) -> Result<DeleteUserResponse, Status> {
        let auth = self.auth(metadata).await?;
        self.user_service
            .delete(UserId(request.user_id), &auth)
            .await?;
        Ok(DeleteUserResponse {})
    }

    async fn logout(&self, metadata: &MetadataMap) -> Result<LogoutResponse, Status> {
        let secret = get_authorisation_token(metadata)
            .ok_or_else(|| Status::unauthenticated("Missing token"))?;
        // Verifies the token is live before revoking it.
        self.auth_service
            .authorization(&secret)
            .await
            .map_err(Status::from)?;
        self.token_service
            .revoke_secret(&secret)
            .await
            .map_err(|err| Status::internal(err.to_safe_string()))?;
        Ok(LogoutResponse {})
    }

    async fn update_roles(
        &self,
        request: UpdateRolesRequest,
        metadata: &MetadataMap,
    ) -> Result<UpdateRolesResponse, Status> {
        let auth = self.auth(metadata).await?;
        let grant = request
            .grant
            .into_iter()
            .map(EntityScope::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Status::invalid_argument)?;
        let revoke = request
            .revoke
            .into_iter()
            .map(EntityScope::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Status::invalid_argument)?;
        self.user_service
            .update_roles(UserId(request.user_id), &grant, &revoke, &auth)
            .await?;
        Ok(UpdateRolesResponse {})
    }
}

#[tonic::async_trait]
impl UserServiceGrpc for UserGrpcApi {
    async fn create_user(
        &self,
        request: Request<CreateUserRequest>,
    ) -> Result<Response<CreateUserResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("create_user", email = %r.email);
        match self.create(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_user(
        &self,
        request: Request<GetUserRequest>,
    ) -> Result<Response<GetUserResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("get_user", user_id = r.user_id);
        match self.get(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn who_am_i(
        &self,
        request: Request<WhoAmIRequest>,
    ) -> Result<Response<WhoAmIResponse>, Status> {
        let (m, _, _) = request.into_parts();
        let record = recorded_grpc_request!("who_am_i");
        match self.who_am_i(&m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn update_user(
        &self,
        request: Request<UpdateUserRequest>,
    ) -> Result<Response<UpdateUserResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("update_user", user_id = r.user_id);
        match self.update(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_users(
        &self,
        request: Request<ListUsersRequest>,
    ) -> Result<Response<ListUsersResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("list_users");
        match self.list(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn delete_user(
        &self,
        request: Request<DeleteUserRequest>,
    ) -> Result<Response<DeleteUserResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("delete_user", user_id = r.user_id);
        match self.delete(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn logout(
        &self,
        request: Request<LogoutRequest>,
    ) -> Result<Response<LogoutResponse>, Status> {
        let (m, _, _) = request.into_parts();
        let record = recorded_grpc_request!("logout");
        match self.logout(&m).instrument(record.span.clone()).await {
            Ok(result) => {
                let mut response = Response::new(result);
                // Clears the browser session along with the revocation.
                response.metadata_mut().insert(
                    "set-cookie",
                    format!("{COOKIE_KEY}=; Max-Age=0; Path=/; HttpOnly")
                        .parse()
                        .expect("static cookie header parses"),
                );
                Ok(record.succeed(response))
            }
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn update_roles(
        &self,
        request: Request<UpdateRolesRequest>,
    ) -> Result<Response<UpdateRolesResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("update_roles", user_id = r.user_id);
        match self
            .update_roles(r, &m)
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
