use loco_common::config::{DbConfig, DbPostgresConfig};
use loco_common::model::auth::TokenSecret;
use loco_service::config::{
    AccountConfig, AccountsConfig, ClusterConfig, ClusterTargetConfig, ClustersConfig,
    LocoServiceConfig, LoginConfig,
};
use loco_service::model::{DeploymentStatus, DomainInput, ResourceType};
use loco_service::spec::{
    BuildSpec, ResourceTypeSpec, ServiceResourceSpec,
};
use loco_service::{metrics, LocoService};
use std::collections::{BTreeMap, HashMap};
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::testcontainers::runners::AsyncRunner;
use testcontainers_modules::testcontainers::ImageExt;

const ROOT_TOKEN: &str = "loco_ffeeddccbbaa99887766554433221100";

fn postgres_config(port: u16) -> LocoServiceConfig {
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
        db: DbConfig::Postgres(DbPostgresConfig {
            host: "127.0.0.1".to_string(),
            port,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            schema: None,
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

fn service_spec() -> ResourceTypeSpec {
    let mut regions = BTreeMap::new();
    regions.insert(
        "us-east-1".to_string(),
        loco_service::spec::RegionTarget {
            cpu: "500m".to_string(),
            memory: "512Mi".to_string(),
            min_replicas: 1,
            max_replicas: 2,
            scalers: None,
            primary: true,
        },
    );
    ResourceTypeSpec::Service(ServiceResourceSpec {
        build: BuildSpec {
            image: "nginx:1.25".to_string(),
            dockerfile: None,
            build_type: None,
        },
        port: 8080,
        routing: Default::default(),
        observability: Default::default(),
        regions,
    })
}

#[tokio::test]
async fn test_postgres_db() {
    let container = Postgres::default()
        .with_tag("16-alpine")
        .start()
        .await
        .expect("postgres container starts");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("mapped port");

    let config = postgres_config(port);
    let service = LocoService::new(config, metrics::register_all())
        .await
        .expect("service initialization against postgres");
    let services = service.services().clone();

    let admin = services
        .auth_service
        .authorization(&TokenSecret::new(ROOT_TOKEN))
        .await
        .expect("seeded root token authorizes");

    let user = services
        .user_service
        .create("pg-user", "pg@loco.dev", "Postgres User", None, &admin)
        .await
        .unwrap();
    let login = services
        .token_service
        .issue_login_token(user.id)
        .await
        .unwrap();
    let auth = services
        .auth_service
        .authorization(&login.secret)
        .await
        .unwrap();

    let org = services
        .organization_service
        .create("pg-org", &auth)
        .await
        .unwrap();
    let auth = {
        let login = services
            .token_service
            .issue_login_token(user.id)
            .await
            .unwrap();
        services
            .auth_service
            .authorization(&login.secret)
            .await
            .unwrap()
    };
    let workspace = services
        .workspace_service
        .create(org.id, "pg-web", "", &auth)
        .await
        .unwrap();
    let auth = {
        let login = services
            .token_service
            .issue_login_token(user.id)
            .await
            .unwrap();
        services
            .auth_service
            .authorization(&login.secret)
            .await
            .unwrap()
    };

    let platform_domain = services
        .domain_service
        .create_platform_domain("deploy-app.com", &admin)
        .await
        .unwrap();
    let resource = services
        .resource_service
        .create(
            workspace.id,
            "api",
            ResourceType::Service,
            "",
            service_spec(),
            DomainInput::PlatformProvided {
                subdomain_label: "api".to_string(),
                platform_domain_id: platform_domain.id,
            },
            &auth,
        )
        .await
        .unwrap();

    let deployment_id = services
        .deployment_service
        .create(resource.id, "us-east-1", None, &auth)
        .await
        .unwrap();
    let deployment = services
        .deployment_service
        .get(deployment_id, &auth)
        .await
        .unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Pending);
    assert!(deployment.is_active);
}
