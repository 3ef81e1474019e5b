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

use crate::grpcapi::{error_kind, get_authorisation_token};
use crate::login::{LoginError, LoginService, LoginSystem};
use crate::service::auth::AuthService;
use loco_api_grpc::proto::loco::oauth::v1::o_auth_service_server::OAuthService as OAuthServiceGrpc;
use loco_api_grpc::proto::loco::oauth::v1::{
    ExchangeCodeRequest, ExchangeResponse, ExchangeTokenRequest, GetAuthorizationUrlRequest,
    GetAuthorizationUrlResponse, GetDetailsRequest, GetDetailsResponse,
};
use loco_common::recorded_grpc_request;
use loco_common::SafeDisplay;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status};
use tracing::Instrument;

impl From<LoginError> for Status {
    fn from(value: LoginError) -> Self {
        let message = value.to_safe_string();
        match value {
            // The distinguished provisioning signal never escapes the OAuth
            // endpoints; if it does something is genuinely wrong.
            LoginError::UserNotFound { .. } => Status::internal(message),
            LoginError::NoVerifiedEmail(_) => Status::failed_precondition(message),
            LoginError::UnknownState => Status::invalid_argument(message),
            LoginError::Provider(_) => Status::unauthenticated(message),
            LoginError::Token(inner) => (*inner).into(),
            LoginError::InternalRepoError(_) => Status::internal(message),
            LoginError::Internal(_) => Status::internal(message),
        }
    }
}

/// The OAuth endpoints are the published authentication bypass list: URL
/// generation and the two exchanges run unauthenticated by design.
pub struct OAuthGrpcApi {
    pub auth_service: Arc<dyn AuthService>,
    pub login_system: Arc<LoginSystem>,
}

impl OAuthGrpcApi {
    fn login_service(&self) -> Result<&Arc<dyn LoginService>, Status> {
        match self.login_system.as_ref() {
            LoginSystem::Enabled(service) => Ok(service),
            LoginSystem::Disabled => Err(Status::failed_precondition(
                "Login is disabled on this installation",
            )),
        }
    }

    fn supported_provider(provider: &str) -> Result<(), Status> {
        if provider.is_empty() || provider == "github" {
            Ok(())
        } else {
            Err(Status::invalid_argument(format!(
                "Unsupported OAuth provider: {provider}"
            )))
        }
    }

    async fn get_authorization_url(
        &self,
        request: GetAuthorizationUrlRequest,
    ) -> Result<GetAuthorizationUrlResponse, Status> {
        Self::supported_provider(&request.provider)?;
        let (url, state) = self.login_service()?.authorization_url().await?;
        Ok(GetAuthorizationUrlResponse { url, state })
    }

    async fn exchange_code(
        &self,
        request: ExchangeCodeRequest,
    ) -> Result<ExchangeResponse, Status> {
        Self::supported_provider(&request.provider)?;
        let (user, token) = self
            .login_service()?
            .exchange_code(&request.code, &request.state)
            .await?;
        Ok(ExchangeResponse {
            user: Some(user.into()),
            token: Some(token.into()),
        })
    }

    async fn exchange_token(
        &self,
        request: ExchangeTokenRequest,
    ) -> Result<ExchangeResponse, Status> {
        Self::supported_provider(&request.provider)?;
        let (user, token) = self
            .login_service()?
            .exchange_token(&request.access_token)
            .await?;
        Ok(ExchangeResponse {
            user: Some(user.into()),
            token: Some(token.into()),
        })
    }

    async fn get_details(&self, metadata: &MetadataMap) -> Result<GetDetailsResponse, Status> {
        let secret = get_authorisation_token(metadata)
            .ok_or_else(|| Status::unauthenticated("Missing token"))?;
        let auth = self
            .auth_service
            .authorization(&secret)
            .await
            .map_err(Status::from)?;
        let (user, expires_at) = self.login_service()?.details(&auth).await?;
        Ok(GetDetailsResponse {
            user: Some(user.into()),
            token_expires_at: expires_at.to_rfc3339(),
        })
    }
}

#[tonic::async_trait]
impl OAuthServiceGrpc for OAuthGrpcApi {
    async fn get_authorization_url(
        &self,
        request: Request<GetAuthorizationUrlRequest>,
    ) -> Result<Response<GetAuthorizationUrlResponse>, Status> {
        let (_, _, r) = request.into_parts();
        let record = recorded_grpc_request!("get_authorization_url", provider = %r.provider);
        match self
            .get_authorization_url(r)
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

    async fn exchange_code(
        &self,
        request: Request<ExchangeCodeRequest>,
    ) -> Result<Response<ExchangeResponse>, Status> {
        let (_, _, r) = request.into_parts();
        let record = recorded_grpc_request!("exchange_code", provider = %r.provider);
        match self.exchange_code(r).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn exchange_token(
        &self,
        request: Request<ExchangeTokenRequest>,
    ) -> Result<Response<ExchangeResponse>, Status> {
        let (_, _, r) = request.into_parts();
        let record = recorded_grpc_request!("exchange_token", provider = %r.provider);
        match self.exchange_token(r).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }

    async fn get_details(
        &self,
        request: Request<GetDetailsRequest>,
    ) -> Result<Response<GetDetailsResponse>, Status> {
        let (m, _, _) = request.into_parts();
        let record = recorded_grpc_request!("get_details");
        match self.get_details(&m).instrument(record.span.clone()).await {
            Ok(result) => Ok(record.succeed(Response::new(result))),
            Err(status) => {
                let kind = error_kind(&status);
                Err(record.fail(status, kind))
            }
        }
    }
}
