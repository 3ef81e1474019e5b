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

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod grpcapi;
pub mod k8s;
pub mod login;
pub mod metrics;
pub mod model;
pub mod repo;
pub mod service;
pub mod spec;
pub mod validation;

use crate::auth::TokenAuthorisation;
use crate::bootstrap::Services;
use crate::config::{AccountConfig, LocoServiceConfig};
use crate::model::{ClusterHealth, Token};
use crate::repo::cluster::NewCluster;
use anyhow::{anyhow, Context};
use chrono::{Duration as ChronoDuration, Utc};
use loco_common::config::DbConfig;
use loco_common::db;
use loco_common::model::auth::{Entity, EntityScope, TokenSecret};
use loco_common::model::TokenId;
use poem::endpoint::PrometheusExporter;
use poem::listener::{Acceptor, Listener};
use poem::{EndpointExt, Route};
use prometheus::Registry;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use tokio::task::JoinSet;
use tracing::{debug, info, Instrument};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static POSTGRES_MIGRATIONS: sqlx::migrate::Migrator =
    sqlx::migrate!("db/migration/postgres");
static SQLITE_MIGRATIONS: sqlx::migrate::Migrator = sqlx::migrate!("db/migration/sqlite");

pub struct RunDetails {
    pub grpc_port: u16,
    pub http_port: u16,
}

#[derive(Clone)]
pub struct LocoService {
    config: LocoServiceConfig,
    prometheus_registry: Registry,
    services: Services,
}

impl LocoService {
    pub async fn new(
        config: LocoServiceConfig,
        prometheus_registry: Registry,
    ) -> Result<Self, anyhow::Error> {
        debug!("Initializing loco service");

        match config.db.clone() {
            DbConfig::Postgres(c) => {
                db::postgres::migrate(&c, &POSTGRES_MIGRATIONS)
                    .await
                    .context("Postgres DB migration")?;
            }
            DbConfig::Sqlite(c) => {
                db::sqlite::migrate(&c, &SQLITE_MIGRATIONS)
                    .await
                    .context("SQLite DB migration")?;
            }
        };

        let services = Services::new(&config)
            .await
            .map_err(|err| anyhow!(err).context("Service initialization"))?;

        register_fleet(&config, &services).await?;
        create_all_initial_accounts(&config, &services).await?;

        Ok(Self {
            config,
            prometheus_registry,
            services,
        })
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub async fn run(
        &self,
        join_set: &mut JoinSet<Result<(), anyhow::Error>>,
    ) -> Result<RunDetails, anyhow::Error> {
        let grpc_port = self.start_grpc_server(join_set).await?;
        let http_port = self.start_http_server(join_set).await?;
        self.start_token_gc(join_set);

        info!(
            "Started loco service on ports: http: {}, grpc: {}",
            http_port, grpc_port
        );

        Ok(RunDetails {
            http_port,
            grpc_port,
        })
    }

    /// Expired tokens are dead weight: they can never verify again, so a
    /// periodic sweep deletes the rows.
    fn start_token_gc(&self, join_set: &mut JoinSet<Result<(), anyhow::Error>>) {
        let token_service = self.services.token_service.clone();
        join_set.spawn(
            async move {
                let mut ticker =
                    tokio::time::interval(std::time::Duration::from_secs(60 * 60));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    match token_service.delete_expired().await {
                        Ok(0) => {}
                        Ok(deleted) => info!("Deleted {deleted} expired tokens"),
                        Err(err) => {
                            tracing::warn!("Expired token sweep failed: {err}")
                        }
                    }
                }
            }
            .in_current_span(),
        );
    }

    async fn start_grpc_server(
        &self,
        join_set: &mut JoinSet<Result<(), anyhow::Error>>,
    ) -> Result<u16, anyhow::Error> {
        let addr = SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), self.config.grpc_port);
        let services = self.services.clone();
        join_set.spawn(
            async move {
                grpcapi::start_grpc_server(addr.into(), &services)
                    .await
                    .map_err(|err| anyhow!(err).context("gRPC server failed"))
            }
            .in_current_span(),
        );
        Ok(self.config.grpc_port)
    }

    async fn start_http_server(
        &self,
        join_set: &mut JoinSet<Result<(), anyhow::Error>>,
    ) -> Result<u16, anyhow::Error> {
        let metrics = PrometheusExporter::new(self.prometheus_registry.clone());

        let cors = poem::middleware::Cors::new()
            .allow_origin_regex(&self.config.cors_origin_regex)
            .allow_credentials(true);

        let app = Route::new()
            .nest("/", api::make_api_route())
            .nest("/metrics", metrics)
            .with(cors)
            .boxed();

        let poem_listener =
            poem::listener::TcpListener::bind(format!("0.0.0.0:{}", self.config.http_port));
        let acceptor = poem_listener.into_acceptor().await?;
        let port = acceptor.local_addr()[0]
            .as_socket_addr()
            .expect("socket address")
            .port();

        join_set.spawn(
            async move {
                poem::Server::new_with_acceptor(acceptor)
                    .run(app)
                    .await
                    .map_err(|e| e.into())
            }
            .in_current_span(),
        );

        Ok(port)
    }
}

async fn register_fleet(
    config: &LocoServiceConfig,
    services: &Services,
) -> Result<(), anyhow::Error> {
    let fleet: Vec<NewCluster> = config
        .clusters
        .fleet
        .iter()
        .map(|(name, cluster)| NewCluster {
            name: name.clone(),
            region: cluster.region.clone(),
            provider: cluster.provider.clone(),
            is_active: true,
            is_default: cluster.is_default,
            endpoint: cluster.endpoint.clone(),
            health_status: ClusterHealth::Healthy,
        })
        .collect();
    services
        .cluster_service
        .register_fleet(&fleet)
        .await
        .context("fleet registration")?;
    Ok(())
}

/// A synthesized system authorisation for startup work. Never persisted and
/// never leaves the process.
fn bootstrap_authorisation() -> TokenAuthorisation {
    TokenAuthorisation::new(Token {
        id: TokenId(0),
        name: "bootstrap".to_string(),
        entity: Entity::system(),
        scopes: EntityScope::owner_set(Entity::system()),
        expires_at: Utc::now() + ChronoDuration::minutes(5),
        created_at: Utc::now(),
    })
}

async fn create_all_initial_accounts(
    config: &LocoServiceConfig,
    services: &Services,
) -> Result<(), anyhow::Error> {
    for account_config in config.accounts.accounts.values() {
        create_initial_account(account_config, services).await?;
    }
    Ok(())
}

async fn create_initial_account(
    account_config: &AccountConfig,
    services: &Services,
) -> Result<(), anyhow::Error> {
    info!(
        "Creating initial account({}, {}).",
        account_config.external_id, account_config.name
    );
    let auth = bootstrap_authorisation();

    let user = match services
        .user_service
        .find_by_email(&account_config.email, &auth)
        .await?
    {
        Some(user) => user,
        None => {
            services
                .user_service
                .create(
                    &account_config.external_id,
                    &account_config.email,
                    &account_config.name,
                    None,
                    &auth,
                )
                .await?
        }
    };

    // Idempotent; repeated grants are no-ops.
    services
        .user_service
        .update_roles(
            user.id,
            &EntityScope::owner_set(Entity::system()),
            &[],
            &auth,
        )
        .await?;

    let secret = TokenSecret::from_str(&account_config.token)
        .map_err(|err| anyhow!("Invalid seeded token: {err}"))?;
    services
        .token_service
        .create_known_secret(user.id, &secret, "bootstrap")
        .await?;

    Ok(())
}
