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

use crate::bootstrap::Services;
use crate::grpcapi::deployment::DeploymentGrpcApi;
use crate::grpcapi::domain::DomainGrpcApi;
use crate::grpcapi::oauth::OAuthGrpcApi;
use crate::grpcapi::organization::OrganizationGrpcApi;
use crate::grpcapi::resource::ResourceGrpcApi;
use crate::grpcapi::token::TokenGrpcApi;
use crate::grpcapi::user::UserGrpcApi;
use crate::grpcapi::workspace::WorkspaceGrpcApi;
use loco_api_grpc::proto::loco::deployment::v1::deployment_service_server::DeploymentServiceServer;
use loco_api_grpc::proto::loco::domain::v1::domain_service_server::DomainServiceServer;
use loco_api_grpc::proto::loco::oauth::v1::o_auth_service_server::OAuthServiceServer;
use loco_api_grpc::proto::loco::organization::v1::organization_service_server::OrganizationServiceServer;
use loco_api_grpc::proto::loco::resource::v1::resource_service_server::ResourceServiceServer;
use loco_api_grpc::proto::loco::token::v1::token_service_server::TokenServiceServer;
use loco_api_grpc::proto::loco::user::v1::user_service_server::UserServiceServer;
use loco_api_grpc::proto::loco::workspace::v1::workspace_service_server::WorkspaceServiceServer;
use loco_common::model::auth::TokenSecret;
use std::net::SocketAddr;
use std::str::FromStr;
use tonic::metadata::MetadataMap;
use tonic::transport::{Error, Server};
use tonic::Status;

mod deployment;
mod domain;
mod oauth;
mod organization;
mod resource;
mod token;
mod user;
mod workspace;

pub const COOKIE_KEY: &str = "loco_token";

/// Bearer extraction for every RPC: the `Authorization: Bearer` header, or
/// the `loco_token` cookie. The OAuth endpoints are the published bypass
/// list and never call this.
pub fn get_authorisation_token(metadata: &MetadataMap) -> Option<TokenSecret> {
    let auth = metadata
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    if let Some(a) = auth {
        if a.to_lowercase().starts_with("bearer ") {
            let t = &a[7..a.len()];
            return TokenSecret::from_str(t.trim()).ok();
        }
    }

    metadata
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|cookie| {
                let (key, value) = cookie.trim().split_once('=')?;
                if key == COOKIE_KEY {
                    TokenSecret::from_str(value.trim()).ok()
                } else {
                    None
                }
            })
        })
}

impl From<crate::service::auth::AuthServiceError> for Status {
    fn from(value: crate::service::auth::AuthServiceError) -> Self {
        use crate::service::auth::AuthServiceError;
        use loco_common::SafeDisplay;
        match &value {
            AuthServiceError::InvalidToken => Status::unauthenticated(value.to_safe_string()),
            AuthServiceError::AccessDenied => Status::permission_denied(value.to_safe_string()),
            AuthServiceError::InternalRepoError(_) | AuthServiceError::Internal(_) => {
                Status::internal(value.to_safe_string())
            }
        }
    }
}

pub(crate) fn error_kind(status: &Status) -> &'static str {
    match status.code() {
        tonic::Code::InvalidArgument => "InvalidArgument",
        tonic::Code::NotFound => "NotFound",
        tonic::Code::AlreadyExists => "AlreadyExists",
        tonic::Code::PermissionDenied => "PermissionDenied",
        tonic::Code::Unauthenticated => "Unauthenticated",
        tonic::Code::FailedPrecondition => "FailedPrecondition",
        tonic::Code::Internal => "Internal",
        _ => "Other",
    }
}

pub async fn start_grpc_server(addr: SocketAddr, services: &Services) -> Result<(), Error> {
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<UserServiceServer<UserGrpcApi>>()
        .await;
    health_reporter
        .set_serving::<OrganizationServiceServer<OrganizationGrpcApi>>()
        .await;
    health_reporter
        .set_serving::<WorkspaceServiceServer<WorkspaceGrpcApi>>()
        .await;
    health_reporter
        .set_serving::<ResourceServiceServer<ResourceGrpcApi>>()
        .await;
    health_reporter
        .set_serving::<DeploymentServiceServer<DeploymentGrpcApi>>()
        .await;
    health_reporter
        .set_serving::<DomainServiceServer<DomainGrpcApi>>()
        .await;
    health_reporter
        .set_serving::<TokenServiceServer<TokenGrpcApi>>()
        .await;
    health_reporter
        .set_serving::<OAuthServiceServer<OAuthGrpcApi>>()
        .await;

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(loco_api_grpc::proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .unwrap();

    Server::builder()
        .add_service(reflection_service)
        .add_service(health_service)
        .add_service(UserServiceServer::new(UserGrpcApi {
            auth_service: services.auth_service.clone(),
            user_service: services.user_service.clone(),
            token_service: services.token_service.clone(),
        }))
        .add_service(OrganizationServiceServer::new(OrganizationGrpcApi {
            auth_service: services.auth_service.clone(),
            organization_service: services.organization_service.clone(),
        }))
        .add_service(WorkspaceServiceServer::new(WorkspaceGrpcApi {
            auth_service: services.auth_service.clone(),
            workspace_service: services.workspace_service.clone(),
        }))
        .add_service(ResourceServiceServer::new(ResourceGrpcApi {
            auth_service: services.auth_service.clone(),
            resource_service: services.resource_service.clone(),
        }))
        .add_service(DeploymentServiceServer::new(DeploymentGrpcApi {
            auth_service: services.auth_service.clone(),
            deployment_service: services.deployment_service.clone(),
        }))
        .add_service(DomainServiceServer::new(DomainGrpcApi {
            auth_service: services.auth_service.clone(),
            domain_service: services.domain_service.clone(),
        }))
        .add_service(TokenServiceServer::new(TokenGrpcApi {
            auth_service: services.auth_service.clone(),
            token_service: services.token_service.clone(),
        }))
        .add_service(OAuthServiceServer::new(OAuthGrpcApi {
            auth_service: services.auth_service.clone(),
            login_system: services.login_system.clone(),
        }))
        .serve(addr)
        .await
}

#[cfg(test)]
mod tests {
    use super::get_authorisation_token;
    use loco_common::model::auth::TokenSecret;
    use tonic::metadata::MetadataMap;

    #[test]
    fn bearer_header_is_extracted() {
        let mut m = MetadataMap::new();
        m.insert("authorization", "Bearer loco_abc123".parse().unwrap());
        assert_eq!(
            get_authorisation_token(&m),
            Some(TokenSecret::new("loco_abc123"))
        );

        let mut m = MetadataMap::new();
        m.insert("authorization", "bearer   loco_abc123 ".parse().unwrap());
        assert_eq!(
            get_authorisation_token(&m),
            Some(TokenSecret::new("loco_abc123"))
        );

        let mut m = MetadataMap::new();
        m.insert("authorization", "Bearer ".parse().unwrap());
        assert_eq!(get_authorisation_token(&m), None);

        let m = MetadataMap::new();
        assert_eq!(get_authorisation_token(&m), None);
    }

    #[test]
    fn cookie_is_extracted() {
        let mut m = MetadataMap::new();
        m.insert(
            "cookie",
            "other=1; loco_token=loco_abc123; theme=dark".parse().unwrap(),
        );
        assert_eq!(
            get_authorisation_token(&m),
            Some(TokenSecret::new("loco_abc123"))
        );

        let mut m = MetadataMap::new();
        m.insert("cookie", "other=1".parse().unwrap());
        assert_eq!(get_authorisation_token(&m), None);
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut m = MetadataMap::new();
        m.insert("authorization", "Bearer from-header".parse().unwrap());
        m.insert("cookie", "loco_token=from-cookie".parse().unwrap());
        assert_eq!(
            get_authorisation_token(&m),
            Some(TokenSecret::new("from-header"))
        );
    }
}
