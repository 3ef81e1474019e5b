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

use crate::config::{ClusterTargetConfig, LocoServiceConfig};
use crate::k8s::application::{
    ApplicationClient, InMemoryApplicationClient, KubeApplicationClient,
};
use crate::login::LoginSystem;
use crate::repo;
use crate::service;
use loco_common::config::DbConfig;
use loco_common::db::postgres::PostgresPool;
use loco_common::db::sqlite::SqlitePool;
use loco_common::db::Pool;
use std::sync::Arc;

/// Process-lifetime components, built once in `main` and handed down;
/// nothing in here is a singleton.
#[derive(Clone)]
pub struct Services {
    pub auth_service: Arc<dyn service::auth::AuthService>,
    pub token_service: Arc<dyn service::token::TokenService>,
    pub user_service: Arc<dyn service::user::UserService>,
    pub organization_service: Arc<dyn service::organization::OrganizationService>,
    pub workspace_service: Arc<dyn service::workspace::WorkspaceService>,
    pub resource_service: Arc<dyn service::resource::ResourceService>,
    pub deployment_service: Arc<dyn service::deployment::DeploymentService>,
    pub domain_service: Arc<dyn service::domain::DomainService>,
    pub cluster_service: Arc<dyn service::cluster::ClusterService>,
    pub application_client: Arc<dyn ApplicationClient>,
    pub login_system: Arc<LoginSystem>,
}

impl Services {
    pub async fn new(config: &LocoServiceConfig) -> Result<Self, String> {
        let application_client = make_application_client(&config.clusters.target).await?;
        match config.db.clone() {
            DbConfig::Postgres(db_config) => {
                let db_pool = PostgresPool::configured(&db_config)
                    .await
                    .map_err(|e| e.to_string())?;
                Self::make_with_db(config, db_pool, application_client).await
            }
            DbConfig::Sqlite(db_config) => {
                let db_pool = SqlitePool::configured(&db_config)
                    .await
                    .map_err(|e| e.to_string())?;
                Self::make_with_db(config, db_pool, application_client).await
            }
        }
    }

    async fn make_with_db<DB>(
        config: &LocoServiceConfig,
        db_pool: DB,
        application_client: Arc<dyn ApplicationClient>,
    ) -> Result<Self, String>
    where
        DB: Pool,
        repo::user::DbUserRepo<DB>: repo::user::UserRepo,
        repo::organization::DbOrganizationRepo<DB>: repo::organization::OrganizationRepo,
        repo::workspace::DbWorkspaceRepo<DB>: repo::workspace::WorkspaceRepo,
        repo::resource::DbResourceRepo<DB>: repo::resource::ResourceRepo,
        repo::domain::DbDomainRepo<DB>: repo::domain::DomainRepo,
        repo::cluster::DbClusterRepo<DB>: repo::cluster::ClusterRepo,
        repo::deployment::DbDeploymentRepo<DB>: repo::deployment::DeploymentRepo,
        repo::token::DbTokenRepo<DB>: repo::token::TokenRepo,
        repo::scope::DbScopeRepo<DB>: repo::scope::ScopeRepo,
    {
        let user_repo: Arc<dyn repo::user::UserRepo> =
            Arc::new(repo::user::DbUserRepo::new(db_pool.clone()));
        let organization_repo: Arc<dyn repo::organization::OrganizationRepo> =
            Arc::new(repo::organization::DbOrganizationRepo::new(db_pool.clone()));
        let workspace_repo: Arc<dyn repo::workspace::WorkspaceRepo> =
            Arc::new(repo::workspace::DbWorkspaceRepo::new(db_pool.clone()));
        let resource_repo: Arc<dyn repo::resource::ResourceRepo> =
            Arc::new(repo::resource::DbResourceRepo::new(db_pool.clone()));
        let domain_repo: Arc<dyn repo::domain::DomainRepo> =
            Arc::new(repo::domain::DbDomainRepo::new(db_pool.clone()));
        let cluster_repo: Arc<dyn repo::cluster::ClusterRepo> =
            Arc::new(repo::cluster::DbClusterRepo::new(db_pool.clone()));
        let deployment_repo: Arc<dyn repo::deployment::DeploymentRepo> =
            Arc::new(repo::deployment::DbDeploymentRepo::new(db_pool.clone()));
        let token_repo: Arc<dyn repo::token::TokenRepo> =
            Arc::new(repo::token::DbTokenRepo::new(db_pool.clone()));
        let scope_repo: Arc<dyn repo::scope::ScopeRepo> =
            Arc::new(repo::scope::DbScopeRepo::new(db_pool.clone()));

        let auth_service: Arc<dyn service::auth::AuthService> =
            Arc::new(service::auth::AuthServiceDefault::new(
                token_repo.clone(),
                workspace_repo.clone(),
                resource_repo.clone(),
            ));

        let token_service: Arc<dyn service::token::TokenService> =
            Arc::new(service::token::TokenServiceDefault::new(
                token_repo.clone(),
                scope_repo.clone(),
                auth_service.clone(),
                config.tokens.clone(),
            ));

        let user_service: Arc<dyn service::user::UserService> =
            Arc::new(service::user::UserServiceDefault::new(
                user_repo.clone(),
                organization_repo.clone(),
                workspace_repo.clone(),
                scope_repo.clone(),
                auth_service.clone(),
            ));

        let organization_service: Arc<dyn service::organization::OrganizationService> =
            Arc::new(service::organization::OrganizationServiceDefault::new(
                organization_repo.clone(),
                workspace_repo.clone(),
                auth_service.clone(),
            ));

        let workspace_service: Arc<dyn service::workspace::WorkspaceService> =
            Arc::new(service::workspace::WorkspaceServiceDefault::new(
                workspace_repo.clone(),
                organization_repo.clone(),
                auth_service.clone(),
            ));

        let cluster_service: Arc<dyn service::cluster::ClusterService> = Arc::new(
            service::cluster::ClusterServiceDefault::new(cluster_repo.clone()),
        );

        let domain_service: Arc<dyn service::domain::DomainService> =
            Arc::new(service::domain::DomainServiceDefault::new(
                domain_repo.clone(),
                resource_repo.clone(),
                auth_service.clone(),
            ));

        let deployment_service: Arc<dyn service::deployment::DeploymentService> =
            Arc::new(service::deployment::DeploymentServiceDefault::new(
                deployment_repo.clone(),
                resource_repo.clone(),
                domain_repo.clone(),
                cluster_service.clone(),
                application_client.clone(),
                auth_service.clone(),
            ));

        let resource_service: Arc<dyn service::resource::ResourceService> =
            Arc::new(service::resource::ResourceServiceDefault::new(
                resource_repo.clone(),
                workspace_repo.clone(),
                deployment_repo.clone(),
                domain_service.clone(),
                cluster_service.clone(),
                deployment_service.clone(),
                application_client.clone(),
                auth_service.clone(),
            ));

        let login_system = Arc::new(LoginSystem::new(
            &config.login,
            user_repo.clone(),
            token_service.clone(),
        ));

        Ok(Self {
            auth_service,
            token_service,
            user_service,
            organization_service,
            workspace_service,
            resource_service,
            deployment_service,
            domain_service,
            cluster_service,
            application_client,
            login_system,
        })
    }
}

async fn make_application_client(
    config: &ClusterTargetConfig,
) -> Result<Arc<dyn ApplicationClient>, String> {
    match config {
        ClusterTargetConfig::Kube(kube_config) => {
            let client = KubeApplicationClient::try_default(&kube_config.namespace)
                .await
                .map_err(|e| e.to_string())?;
            Ok(Arc::new(client))
        }
        ClusterTargetConfig::Disabled(_) => Ok(Arc::new(InMemoryApplicationClient::new())),
    }
}
