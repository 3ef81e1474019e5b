use loco_common::config::{DbConfig, DbSqliteConfig};
use loco_common::model::auth::{Entity, EntityScope, EntityType, ScopeLevel, TokenSecret};
use loco_common::model::UserId;
use loco_service::auth::TokenAuthorisation;
use loco_service::bootstrap::Services;
use loco_service::config::{
    AccountConfig, AccountsConfig, ClusterConfig, ClusterTargetConfig, ClustersConfig,
    LocoServiceConfig, LoginConfig,
};
use loco_service::model::{DeploymentStatus, DomainInput, ResourceType, User};
use loco_service::service::deployment::DeploymentServiceError;
use loco_service::service::domain::DomainServiceError;
use loco_service::service::organization::OrganizationServiceError;
use loco_service::spec::{
    BuildSpec, DeploymentTypeSpec, ObservabilitySpec, RegionTarget, ResourceTypeSpec,
    RoutingSpec, ServiceDeploymentSpec, ServiceResourceSpec,
};
use loco_service::{metrics, LocoService};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio_stream::StreamExt;

const ROOT_TOKEN: &str = "loco_00112233445566778899aabbccddeeff";

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

struct SqliteDb {
    db_path: String,
}

impl Default for SqliteDb {
    fn default() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let n = DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self {
            db_path: format!("/tmp/loco-{nanos}-{n}.db"),
        }
    }
}

impl Drop for SqliteDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_path));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_path));
    }
}

fn test_config(db_path: &str) -> LocoServiceConfig {
    let mut fleet = HashMap::new();
    fleet.insert(
        "use1-a".to_string(),
        ClusterConfig {
            region: "us-east-1".to_string(),
            provider: "kind".to_string(),
            endpoint: "https://use1-a.clusters.loco.dev".to_string(),
            is_default: true,
        },
    );
    fleet.insert(
        "euw1-a".to_string(),
        ClusterConfig {
            region: "eu-west-1".to_string(),
            provider: "kind".to_string(),
            endpoint: "https://euw1-a.clusters.loco.dev".to_string(),
            is_default: false,
        },
    );

    let mut accounts = HashMap::new();
    accounts.insert(
        "root".to_string(),
        AccountConfig {
            external_id: "root".to_string(),
            name: "Initial User".to_string(),
            email: "initial@loco.dev".to_string(),
            token: ROOT_TOKEN.to_string(),
        },
    );

    LocoServiceConfig {
        db: DbConfig::Sqlite(DbSqliteConfig {
            database: db_path.to_string(),
            max_connections: 5,
        }),
        login: LoginConfig::Disabled(Default::default()),
        clusters: ClustersConfig {
            target: ClusterTargetConfig::Disabled(Default::default()),
            fleet,
        },
        accounts: AccountsConfig { accounts },
        ..Default::default()
    }
}

async fn start_services(db: &SqliteDb) -> (Services, TokenAuthorisation) {
    let config = test_config(&db.db_path);
    let service = LocoService::new(config, metrics::register_all())
        .await
        .expect("service initialization");
    let services = service.services().clone();
    let admin = services
        .auth_service
        .authorization(&TokenSecret::new(ROOT_TOKEN))
        .await
        .expect("root token authorizes");
    (services, admin)
}

async fn auth_for(services: &Services, user_id: UserId) -> TokenAuthorisation {
    let token = services
        .token_service
        .issue_login_token(user_id)
        .await
        .expect("login token");
    services
        .auth_service
        .authorization(&token.secret)
        .await
        .expect("login token authorizes")
}

async fn create_user(
    services: &Services,
    admin: &TokenAuthorisation,
    external_id: &str,
    email: &str,
) -> (User, TokenAuthorisation) {
    let user = services
        .user_service
        .create(external_id, email, "Test User", None, admin)
        .await
        .expect("user creation");
    let auth = auth_for(services, user.id).await;
    (user, auth)
}

fn service_spec() -> ResourceTypeSpec {
    let mut regions = BTreeMap::new();
    regions.insert(
        "us-east-1".to_string(),
        RegionTarget {
            cpu: "500m".to_string(),
            memory: "512Mi".to_string(),
            min_replicas: 1,
            max_replicas: 3,
            scalers: None,
            primary: true,
        },
    );
    regions.insert(
        "eu-west-1".to_string(),
        RegionTarget {
            cpu: "250m".to_string(),
            memory: "256Mi".to_string(),
            min_replicas: 1,
            max_replicas: 1,
            scalers: None,
            primary: false,
        },
    );
    ResourceTypeSpec::Service(ServiceResourceSpec {
        build: BuildSpec {
            image: "nginx:1.25".to_string(),
            dockerfile: None,
            build_type: None,
        },
        port: 8080,
        routing: RoutingSpec {
            path_prefix: "/".to_string(),
            idle_timeout_seconds: 30,
        },
        observability: ObservabilitySpec {
            logging: true,
            metrics: false,
            tracing: false,
        },
        regions,
    })
}

fn image_override(image: &str) -> DeploymentTypeSpec {
    DeploymentTypeSpec::Service(ServiceDeploymentSpec {
        image: image.to_string(),
        ..Default::default()
    })
}

struct Fixture {
    services: Services,
    admin: TokenAuthorisation,
    user_auth: TokenAuthorisation,
    resource_id: loco_common::model::ResourceId,
    workspace_id: loco_common::model::WorkspaceId,
}

/// Shared setup: user, org, workspace, platform domain and a two-region
/// service resource with the platform provided domain `api.deploy-app.com`.
async fn deploy_fixture(db: &SqliteDb) -> Fixture {
    let (services, admin) = start_services(db).await;
    let (user, _) = create_user(&services, &admin, "u-1", "u1@loco.dev").await;
    let auth = auth_for(&services, user.id).await;

    let org = services
        .organization_service
        .create("acme", &auth)
        .await
        .expect("organization creation");
    let auth = auth_for(&services, user.id).await;

    let workspace = services
        .workspace_service
        .create(org.id, "web", "frontend team", &auth)
        .await
        .expect("workspace creation");
    let auth = auth_for(&services, user.id).await;

    let platform_domain = services
        .domain_service
        .create_platform_domain("deploy-app.com", &admin)
        .await
        .expect("platform domain creation");

    let resource = services
        .resource_service
        .create(
            workspace.id,
            "api",
            ResourceType::Service,
            "public api",
            service_spec(),
            DomainInput::PlatformProvided {
                subdomain_label: "api".to_string(),
                platform_domain_id: platform_domain.id,
            },
            &auth,
        )
        .await
        .expect("resource creation");

    Fixture {
        services,
        admin,
        user_auth: auth,
        resource_id: resource.id,
        workspace_id: workspace.id,
    }
}

#[tokio::test]
async fn happy_path_service_deploy() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = &fixture.services;
    let auth = &fixture.user_auth;

    let regions = services
        .resource_service
        .list_declared_regions(fixture.resource_id, auth)
        .await
        .unwrap();
    assert_eq!(regions.len(), 2);
    let primary: Vec<_> = regions.iter().filter(|region| region.is_primary).collect();
    assert_eq!(primary.len(), 1);
    assert_eq!(primary[0].region, "us-east-1");

    let d1 = services
        .deployment_service
        .create(
            fixture.resource_id,
            "us-east-1",
            Some(image_override("nginx:1.25")),
            auth,
        )
        .await
        .unwrap();

    let deployment = services.deployment_service.get(d1, auth).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Pending);
    assert!(deployment.is_active);
    assert_eq!(deployment.region, "us-east-1");
    assert_eq!(deployment.message, "Scheduling deployment");

    let crd = services
        .application_client
        .get(&format!("resource-{}", fixture.resource_id))
        .await
        .unwrap()
        .expect("workload object applied");
    assert_eq!(crd.spec.region, "us-east-1");
    assert_eq!(crd.spec.resource_id, fixture.resource_id.0);
    assert_eq!(crd.spec.workspace_id, fixture.workspace_id.0);
    let workload = crd.spec.service.expect("service block");
    assert_eq!(workload.routing.hostname, "api.deploy-app.com");
    assert_eq!(workload.deployment.image, "nginx:1.25");
    assert_eq!(workload.deployment.port, 8080);
}

#[tokio::test]
async fn supersession_flips_the_active_flag() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = &fixture.services;
    let auth = &fixture.user_auth;

    let d1 = services
        .deployment_service
        .create(fixture.resource_id, "us-east-1", None, auth)
        .await
        .unwrap();
    let d_eu = services
        .deployment_service
        .create(fixture.resource_id, "eu-west-1", None, auth)
        .await
        .unwrap();
    let d2 = services
        .deployment_service
        .create(
            fixture.resource_id,
            "us-east-1",
            Some(image_override("nginx:1.26")),
            auth,
        )
        .await
        .unwrap();

    let d1 = services.deployment_service.get(d1, auth).await.unwrap();
    let d2 = services.deployment_service.get(d2, auth).await.unwrap();
    let d_eu = services.deployment_service.get(d_eu, auth).await.unwrap();
    assert!(!d1.is_active);
    assert!(d2.is_active);
    assert!(d_eu.is_active);

    // At most one active row per (resource, region) at any quiescent point.
    let (deployments, _) = services
        .deployment_service
        .list(fixture.resource_id, 100, "", auth)
        .await
        .unwrap();
    let active_us: Vec<_> = deployments
        .iter()
        .filter(|deployment| deployment.region == "us-east-1" && deployment.is_active)
        .collect();
    assert_eq!(active_us.len(), 1);
    assert_eq!(active_us[0].id, d2.id);
}

#[tokio::test]
async fn authorization_denial_leaves_no_trace() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = &fixture.services;

    let (_, intruder_auth) =
        create_user(services, &fixture.admin, "u-2", "u2@loco.dev").await;

    let result = services
        .deployment_service
        .create(fixture.resource_id, "us-east-1", None, &intruder_auth)
        .await;
    assert!(matches!(
        result,
        Err(DeploymentServiceError::Auth(
            loco_service::service::auth::AuthServiceError::AccessDenied
        ))
    ));

    let (deployments, _) = services
        .deployment_service
        .list(fixture.resource_id, 100, "", &fixture.user_auth)
        .await
        .unwrap();
    assert!(deployments.is_empty());

    let crd = services
        .application_client
        .get(&format!("resource-{}", fixture.resource_id))
        .await
        .unwrap();
    assert!(crd.is_none());
}

#[tokio::test]
async fn primary_domain_removal_is_blocked() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = &fixture.services;
    let auth = &fixture.user_auth;

    let domains = services
        .domain_service
        .list_resource_domains(fixture.resource_id, auth)
        .await
        .unwrap();
    assert_eq!(domains.len(), 1);
    let primary = &domains[0];
    assert!(primary.is_primary);

    let result = services.domain_service.remove(primary.id, auth).await;
    assert!(matches!(
        result,
        Err(DomainServiceError::CannotRemovePrimary)
    ));

    let domains = services
        .domain_service
        .list_resource_domains(fixture.resource_id, auth)
        .await
        .unwrap();
    assert_eq!(domains.len(), 1);
}

#[tokio::test]
async fn secondary_domains_have_their_own_rules() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = &fixture.services;
    let auth = &fixture.user_auth;

    assert!(services
        .domain_service
        .check_availability("api.example.com")
        .await
        .unwrap());

    let secondary = services
        .domain_service
        .add_resource_domain(
            fixture.resource_id,
            &DomainInput::UserProvided {
                hostname: "api.example.com".to_string(),
            },
            auth,
        )
        .await
        .unwrap();
    assert!(!secondary.is_primary);

    // Global uniqueness.
    assert!(!services
        .domain_service
        .check_availability("api.example.com")
        .await
        .unwrap());
    let duplicate = services
        .domain_service
        .add_resource_domain(
            fixture.resource_id,
            &DomainInput::UserProvided {
                hostname: "api.example.com".to_string(),
            },
            auth,
        )
        .await;
    assert!(matches!(duplicate, Err(DomainServiceError::AlreadyExists)));

    // Promote the secondary; exactly one primary afterwards.
    services
        .domain_service
        .set_primary(fixture.resource_id, secondary.id, auth)
        .await
        .unwrap();
    let domains = services
        .domain_service
        .list_resource_domains(fixture.resource_id, auth)
        .await
        .unwrap();
    let primaries: Vec<_> = domains.iter().filter(|domain| domain.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, secondary.id);

    // The old primary is now removable.
    let old_primary = domains.iter().find(|domain| !domain.is_primary).unwrap();
    services
        .domain_service
        .remove(old_primary.id, auth)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_emits_a_monotone_status_sequence() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = fixture.services.clone();
    let auth = fixture.user_auth.clone();

    let deployment_id = services
        .deployment_service
        .create(fixture.resource_id, "us-east-1", None, &auth)
        .await
        .unwrap();

    let mut stream = services
        .deployment_service
        .watch(deployment_id, &auth)
        .await
        .unwrap();

    let driver_services = services.clone();
    let driver = tokio::spawn(async move {
        for status in [
            DeploymentStatus::Deploying,
            DeploymentStatus::Running,
            DeploymentStatus::Succeeded,
        ] {
            tokio::time::sleep(Duration::from_millis(700)).await;
            driver_services
                .deployment_service
                .mark_status(deployment_id, status, "driven by test")
                .await
                .unwrap();
        }
    });

    fn rank(status: DeploymentStatus) -> u8 {
        match status {
            DeploymentStatus::Pending => 0,
            DeploymentStatus::Deploying => 1,
            DeploymentStatus::Running => 2,
            DeploymentStatus::Succeeded => 3,
            DeploymentStatus::Failed => 3,
            DeploymentStatus::Canceled => 1,
        }
    }

    let mut observed = Vec::new();
    while let Some(event) = stream.next().await {
        assert_eq!(event.deployment_id, deployment_id);
        observed.push(event.status);
    }
    driver.await.unwrap();

    assert!(!observed.is_empty());
    // Monotone, not complete: a poll may skip intermediate statuses.
    for window in observed.windows(2) {
        assert!(rank(window[0]) <= rank(window[1]), "observed {observed:?}");
    }
    assert_eq!(*observed.last().unwrap(), DeploymentStatus::Succeeded);
}

#[tokio::test]
async fn env_is_never_persisted() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = &fixture.services;
    let auth = &fixture.user_auth;

    let env = BTreeMap::from([("SECRET".to_string(), "s".to_string())]);
    let deployment_id = services
        .deployment_service
        .create(
            fixture.resource_id,
            "us-east-1",
            Some(DeploymentTypeSpec::Service(ServiceDeploymentSpec {
                image: "nginx:1.25".to_string(),
                env: Some(env.clone()),
                ..Default::default()
            })),
            auth,
        )
        .await
        .unwrap();

    // The stored row carries no env...
    let deployment = services
        .deployment_service
        .get(deployment_id, auth)
        .await
        .unwrap();
    let DeploymentTypeSpec::Service(stored) = deployment.spec;
    assert_eq!(stored.env, None);

    // ...while the cluster object received it verbatim.
    let crd = services
        .application_client
        .get(&format!("resource-{}", fixture.resource_id))
        .await
        .unwrap()
        .unwrap();
    let workload = crd.spec.service.unwrap();
    assert_eq!(workload.deployment.env.get("SECRET").map(String::as_str), Some("s"));
}

#[tokio::test]
async fn scale_builds_a_fresh_deployment() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = &fixture.services;
    let auth = &fixture.user_auth;

    let d1 = services
        .deployment_service
        .create(fixture.resource_id, "us-east-1", None, auth)
        .await
        .unwrap();

    let created = services
        .resource_service
        .scale(
            fixture.resource_id,
            Some("us-east-1"),
            Some("1000m"),
            None,
            Some(2),
            Some(4),
            auth,
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 1);

    let scaled = services
        .deployment_service
        .get(created[0], auth)
        .await
        .unwrap();
    let DeploymentTypeSpec::Service(spec) = scaled.spec;
    assert_eq!(spec.cpu.as_deref(), Some("1000m"));
    // Untouched values carry over from the superseded deployment.
    assert_eq!(spec.memory.as_deref(), Some("512Mi"));
    assert_eq!(spec.min_replicas, Some(2));
    assert_eq!(spec.max_replicas, Some(4));
    assert!(scaled.is_active);

    let old = services.deployment_service.get(d1, auth).await.unwrap();
    assert!(!old.is_active);
}

#[tokio::test]
async fn tokens_verify_until_revoked_or_expired() {
    let db = SqliteDb::default();
    let (services, admin) = start_services(&db).await;
    let (user, auth) = create_user(&services, &admin, "u-3", "u3@loco.dev").await;

    let token = services
        .token_service
        .create(
            "ci",
            &Entity::user(user.id.0),
            &[EntityScope::new(EntityType::User, user.id.0, ScopeLevel::Read)],
            Duration::from_secs(3600),
            &auth,
        )
        .await
        .unwrap();

    // Verify returns the token scopes, not the user's full set.
    let bearer = services
        .auth_service
        .authorization(&token.secret)
        .await
        .unwrap();
    assert_eq!(bearer.scopes().len(), 1);
    assert_eq!(bearer.scopes()[0].level, ScopeLevel::Read);

    services
        .token_service
        .revoke(token.data.id, &auth)
        .await
        .unwrap();
    assert!(services
        .auth_service
        .authorization(&token.secret)
        .await
        .is_err());

    // Zero duration expires immediately.
    let expired = services
        .token_service
        .create(
            "expired",
            &Entity::user(user.id.0),
            &[EntityScope::new(EntityType::User, user.id.0, ScopeLevel::Read)],
            Duration::from_secs(0),
            &auth,
        )
        .await
        .unwrap();
    assert!(services
        .auth_service
        .authorization(&expired.secret)
        .await
        .is_err());
}

#[tokio::test]
async fn token_issue_requires_held_scopes() {
    let db = SqliteDb::default();
    let (services, admin) = start_services(&db).await;
    let (user, auth) = create_user(&services, &admin, "u-4", "u4@loco.dev").await;

    // u-4 holds nothing on the system entity.
    let result = services
        .token_service
        .create(
            "too-broad",
            &Entity::user(user.id.0),
            &[EntityScope::system(ScopeLevel::Read)],
            Duration::from_secs(3600),
            &auth,
        )
        .await;
    assert!(matches!(
        result,
        Err(loco_service::service::token::TokenServiceError::InsufficientPermissions)
    ));
}

#[tokio::test]
async fn unique_names_map_to_already_exists() {
    let db = SqliteDb::default();
    let (services, admin) = start_services(&db).await;
    let (_, auth) = create_user(&services, &admin, "u-5", "u5@loco.dev").await;

    services
        .organization_service
        .create("unique-org", &auth)
        .await
        .unwrap();
    let duplicate = services
        .organization_service
        .create("unique-org", &auth)
        .await;
    assert!(matches!(
        duplicate,
        Err(OrganizationServiceError::AlreadyExists)
    ));
}

#[tokio::test]
async fn hierarchy_scopes_satisfy_descendant_requirements() {
    let db = SqliteDb::default();
    let fixture = deploy_fixture(&db).await;
    let services = &fixture.services;

    // The fixture user's organization scope alone must satisfy a resource
    // requirement through the workspace link.
    let org_scope = fixture
        .user_auth
        .scopes()
        .iter()
        .find(|scope| scope.entity.entity_type == EntityType::Organization)
        .copied()
        .unwrap();

    let required = EntityScope::new(
        EntityType::Resource,
        fixture.resource_id.0,
        ScopeLevel::Write,
    );
    assert!(services
        .auth_service
        .verify_with_given_entity_scopes(&[org_scope], &required)
        .await
        .unwrap());

    // A write on an unrelated workspace does not.
    let unrelated = EntityScope::new(EntityType::Workspace, 424242, ScopeLevel::Admin);
    assert!(!services
        .auth_service
        .verify_with_given_entity_scopes(&[unrelated], &required)
        .await
        .unwrap());

    // Level ordering is respected along the hierarchy.
    let org_read = EntityScope {
        level: ScopeLevel::Read,
        ..org_scope
    };
    assert!(!services
        .auth_service
        .verify_with_given_entity_scopes(&[org_read], &required)
        .await
        .unwrap());

    // System scopes satisfy anything of lower or equal level.
    assert!(services
        .auth_service
        .verify_with_given_entity_scopes(&[EntityScope::system(ScopeLevel::Admin)], &required)
        .await
        .unwrap());
}
