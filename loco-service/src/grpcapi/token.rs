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
use crate::service::token::{TokenService, TokenServiceError};
use loco_api_grpc::proto::loco::token::v1::token_service_server::TokenService as TokenServiceGrpc;
use loco_api_grpc::proto::loco::token::v1::{
    CreateTokenRequest, CreateTokenResponse, GetTokenRequest, GetTokenResponse,
    ListTokensRequest, ListTokensResponse, RevokeTokenRequest, RevokeTokenResponse,
};
use loco_common::model::auth::{Entity, EntityScope};
use loco_common::model::TokenId;
use loco_common::recorded_grpc_request;
use loco_common::SafeDisplay;
use std::sync::Arc;
use std::time::Duration;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

impl From<TokenServiceError> for Status {
    fn from(value: TokenServiceError) -> Self {
        let message = value.to_safe_string();
        match value {
            TokenServiceError::UnknownToken => Status::not_found(message),
            TokenServiceError::InsufficientPermissions => Status::permission_denied(message),
            TokenServiceError::AlreadyExists => Status::already_exists(message),
            TokenServiceError::Validation(_) => Status::invalid_argument(message),
            TokenServiceError::Auth(inner) => inner.into(),
            TokenServiceError::Internal(_) => Status::internal(message),
        }
    }
}

pub struct TokenGrpcApi {
    pub auth_service: Arc<dyn AuthService>,
    pub token_service: Arc<dyn TokenService>,
}

impl TokenGrpcApi {
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
        request: CreateTokenRequest,
        metadata: &MetadataMap,
    ) -> Result<CreateTokenResponse, Status> {
        let auth = self.auth(metadata).await?;
        let entity: Entity = request
            .entity
            .ok_or_else(|| Status::invalid_argument("Missing entity"))?
            .try_into()
            .map_err(Status::invalid_argument)?;
        let scopes = request
            .scopes
            .into_iter()
            .map(EntityScope::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Status::invalid_argument)?;
        let token = self
            .token_service
            .create(
                &request.name,
                &entity,
                &scopes,
                Duration::from_secs(request.duration_seconds),
                &auth,
            )
            .await?;
        Ok(CreateTokenResponse {
            token: Some(token.into()),
        })
    }

    async fn list(
        &self,
        request: ListTokensRequest,
        metadata: &MetadataMap,
    ) -> Result<ListTokensResponse, Status> {
        let auth = self.auth(metadata).await?;
        let entity: Entity = request
            .entity
            .ok_or_else(|| Status::invalid_argument("Missing entity"))?
            .try_into()
            .map_err(Status::invalid_argument)?;
        let tokens = self.token_service.list(&entity, &auth).await?;
        Ok(ListTokensResponse {
            tokens: tokens.into_iter().map(Into::into).collect(),
        })
    }

    async fn get(
        &self,
        request: GetTokenRequest,
        metadata: &MetadataMap,
    ) -> Result<GetTokenResponse, Status> {
        let auth = self.auth(metadata).await?;
        let token = self
            .token_service
            .get(TokenId(request.token_id), &auth)
            .await?;
        Ok(GetTokenResponse {
            token: Some(token.into()),
        })
    }

    async fn revoke(
        &self,
        request: RevokeTokenRequest,
        metadata: &MetadataMap,
    ) -> Result<RevokeTokenResponse, Status> {
        let auth = self.auth(metadata).await?;
        self.token_service
            .revoke(TokenId(request.token_id), &auth)
            .await?;
        Ok(RevokeTokenResponse {})
    }
}

#[tonic::async_trait]
impl TokenServiceGrpc for TokenGrpcApi {
    async fn create_token(
        &self,
        request: Request<CreateTokenRequest>,
    ) -> Result<Response<CreateTokenResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("create_token", name = %r.name);
        match self.create(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn list_tokens(
        &self,
        request: Request<ListTokensRequest>,
    ) -> Result<Response<ListTokensResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("list_tokens");
        match self.list(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_token(
        &self,
        request: Request<GetTokenRequest>,
    ) -> Result<Response<GetTokenResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("get_token", token_id = r.token_id);
        match self.get(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn revoke_token(
        &self,
        request: Request<RevokeTokenRequest>,
    ) -> Result<Response<RevokeTokenResponse>, Status> {
        let (m, _, r) = request.into_parts();
        let record = recorded_grpc_request!("revoke_token", token_id = r.token_id);
        match self.revoke(r, &m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }
}
