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

use crate::spec::{DeploymentTypeSpec, ResourceTypeSpec};
use chrono::{DateTime, Utc};
use loco_api_grpc::proto::loco::deployment::v1 as deployment_proto;
use loco_api_grpc::proto::loco::domain::v1 as domain_proto;
use loco_api_grpc::proto::loco::organization::v1 as organization_proto;
use loco_api_grpc::proto::loco::resource::v1 as resource_proto;
use loco_api_grpc::proto::loco::token::v1 as token_proto;
use loco_api_grpc::proto::loco::user::v1 as user_proto;
use loco_api_grpc::proto::loco::workspace::v1 as workspace_proto;
use loco_common::model::auth::{Entity, EntityScope, TokenSecret};
pub use loco_common::model::{
    ClusterId, DeploymentId, DomainId, OrgId, PlatformDomainId, ResourceId, TokenId, UserId,
    WorkspaceId,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for user_proto::User {
    fn from(value: User) -> Self {
        Self {
            id: value.id.0,
            external_id: value.external_id,
            email: value.email,
            name: value.name,
            avatar: value.avatar.unwrap_or_default(),
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl From<Organization> for organization_proto::Organization {
    fn from(value: Organization) -> Self {
        Self {
            id: value.id.0,
            name: value.name,
            created_by: value.created_by.0,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub organization_id: OrgId,
    pub name: String,
    pub description: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl From<Workspace> for workspace_proto::Workspace {
    fn from(value: Workspace) -> Self {
        Self {
            id: value.id.0,
            organization_id: value.organization_id.0,
            name: value.name,
            description: value.description,
            created_by: value.created_by.0,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

/// Legacy workspace role. Retained as membership display data only; the
/// entity scope system is the authoritative authorization input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceRole {
    Admin,
    Deploy,
    Read,
}

impl Display for WorkspaceRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkspaceRole::Admin => write!(f, "admin"),
            WorkspaceRole::Deploy => write!(f, "deploy"),
            WorkspaceRole::Read => write!(f, "read"),
        }
    }
}

impl FromStr for WorkspaceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(WorkspaceRole::Admin),
            "deploy" => Ok(WorkspaceRole::Deploy),
            "read" => Ok(WorkspaceRole::Read),
            _ => Err(format!("Invalid workspace role: {s}")),
        }
    }
}

impl From<WorkspaceRole> for workspace_proto::WorkspaceRole {
    fn from(value: WorkspaceRole) -> Self {
        match value {
            WorkspaceRole::Admin => workspace_proto::WorkspaceRole::Admin,
            WorkspaceRole::Deploy => workspace_proto::WorkspaceRole::Deploy,
            WorkspaceRole::Read => workspace_proto::WorkspaceRole::Read,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
    pub role: WorkspaceRole,
}

impl From<WorkspaceMember> for workspace_proto::WorkspaceMember {
    fn from(value: WorkspaceMember) -> Self {
        Self {
            workspace_id: value.workspace_id.0,
            user_id: value.user_id.0,
            role: workspace_proto::WorkspaceRole::from(value.role) as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Service,
    Database,
    Cache,
    Queue,
    Blob,
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::Service => write!(f, "service"),
            ResourceType::Database => write!(f, "database"),
            ResourceType::Cache => write!(f, "cache"),
            ResourceType::Queue => write!(f, "queue"),
            ResourceType::Blob => write!(f, "blob"),
        }
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "service" => Ok(ResourceType::Service),
            "database" => Ok(ResourceType::Database),
            "cache" => Ok(ResourceType::Cache),
            "queue" => Ok(ResourceType::Queue),
            "blob" => Ok(ResourceType::Blob),
            _ => Err(format!("Invalid resource type: {s}")),
        }
    }
}

impl From<ResourceType> for resource_proto::ResourceType {
    fn from(value: ResourceType) -> Self {
        match value {
            ResourceType::Service => resource_proto::ResourceType::Service,
            ResourceType::Database => resource_proto::ResourceType::Database,
            ResourceType::Cache => resource_proto::ResourceType::Cache,
            ResourceType::Queue => resource_proto::ResourceType::Queue,
            ResourceType::Blob => resource_proto::ResourceType::Blob,
        }
    }
}

impl TryFrom<resource_proto::ResourceType> for ResourceType {
    type Error = String;

    fn try_from(value: resource_proto::ResourceType) -> Result<Self, Self::Error> {
        match value {
            resource_proto::ResourceType::Unspecified => {
                Err("Unspecified resource type".to_string())
            }
            resource_proto::ResourceType::Service => Ok(ResourceType::Service),
            resource_proto::ResourceType::Database => Ok(ResourceType::Database),
            resource_proto::ResourceType::Cache => Ok(ResourceType::Cache),
            resource_proto::ResourceType::Queue => Ok(ResourceType::Queue),
            resource_proto::ResourceType::Blob => Ok(ResourceType::Blob),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Healthy,
    Deploying,
    Degraded,
    Unavailable,
    Suspended,
}

impl Display for ResourceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Healthy => write!(f, "healthy"),
            ResourceStatus::Deploying => write!(f, "deploying"),
            ResourceStatus::Degraded => write!(f, "degraded"),
            ResourceStatus::Unavailable => write!(f, "unavailable"),
            ResourceStatus::Suspended => write!(f, "suspended"),
        }
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(ResourceStatus::Healthy),
            "deploying" => Ok(ResourceStatus::Deploying),
            "degraded" => Ok(ResourceStatus::Degraded),
            "unavailable" => Ok(ResourceStatus::Unavailable),
            "suspended" => Ok(ResourceStatus::Suspended),
            _ => Err(format!("Invalid resource status: {s}")),
        }
    }
}

impl From<ResourceStatus> for resource_proto::ResourceStatus {
    fn from(value: ResourceStatus) -> Self {
        match value {
            ResourceStatus::Healthy => resource_proto::ResourceStatus::Healthy,
            ResourceStatus::Deploying => resource_proto::ResourceStatus::Deploying,
            ResourceStatus::Degraded => resource_proto::ResourceStatus::Degraded,
            ResourceStatus::Unavailable => resource_proto::ResourceStatus::Unavailable,
            ResourceStatus::Suspended => resource_proto::ResourceStatus::Suspended,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub resource_type: ResourceType,
    pub description: String,
    pub status: ResourceStatus,
    pub spec: ResourceTypeSpec,
    pub spec_version: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Resource> for resource_proto::Resource {
    fn from(value: Resource) -> Self {
        Self {
            id: value.id.0,
            workspace_id: value.workspace_id.0,
            name: value.name,
            resource_type: resource_proto::ResourceType::from(value.resource_type) as i32,
            description: value.description,
            status: resource_proto::ResourceStatus::from(value.status) as i32,
            spec: Some(value.spec.into()),
            spec_version: value.spec_version,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStatus {
    Desired,
    Retiring,
}

impl Display for RegionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionStatus::Desired => write!(f, "desired"),
            RegionStatus::Retiring => write!(f, "retiring"),
        }
    }
}

impl FromStr for RegionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desired" => Ok(RegionStatus::Desired),
            "retiring" => Ok(RegionStatus::Retiring),
            _ => Err(format!("Invalid region status: {s}")),
        }
    }
}

impl From<RegionStatus> for resource_proto::RegionStatus {
    fn from(value: RegionStatus) -> Self {
        match value {
            RegionStatus::Desired => resource_proto::RegionStatus::Desired,
            RegionStatus::Retiring => resource_proto::RegionStatus::Retiring,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRegion {
    pub id: i64,
    pub resource_id: ResourceId,
    pub region: String,
    pub is_primary: bool,
    pub status: RegionStatus,
}

impl From<ResourceRegion> for resource_proto::ResourceRegion {
    fn from(value: ResourceRegion) -> Self {
        Self {
            id: value.id,
            resource_id: value.resource_id.0,
            region: value.region,
            is_primary: value.is_primary,
            status: resource_proto::RegionStatus::from(value.status) as i32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub region: String,
    pub is_default: bool,
}

impl From<RegionInfo> for resource_proto::RegionInfo {
    fn from(value: RegionInfo) -> Self {
        Self {
            region: value.region,
            is_default: value.is_default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainSource {
    PlatformProvided,
    UserProvided,
}

impl Display for DomainSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainSource::PlatformProvided => write!(f, "platform_provided"),
            DomainSource::UserProvided => write!(f, "user_provided"),
        }
    }
}

impl FromStr for DomainSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_provided" => Ok(DomainSource::PlatformProvided),
            "user_provided" => Ok(DomainSource::UserProvided),
            _ => Err(format!("Invalid domain source: {s}")),
        }
    }
}

impl From<DomainSource> for domain_proto::DomainSource {
    fn from(value: DomainSource) -> Self {
        match value {
            DomainSource::PlatformProvided => domain_proto::DomainSource::PlatformProvided,
            DomainSource::UserProvided => domain_proto::DomainSource::UserProvided,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDomain {
    pub id: DomainId,
    pub resource_id: ResourceId,
    pub domain: String,
    pub source: DomainSource,
    pub subdomain_label: Option<String>,
    pub platform_domain_id: Option<PlatformDomainId>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ResourceDomain> for domain_proto::ResourceDomain {
    fn from(value: ResourceDomain) -> Self {
        Self {
            id: value.id.0,
            resource_id: value.resource_id.0,
            domain: value.domain,
            source: domain_proto::DomainSource::from(value.source) as i32,
            subdomain_label: value.subdomain_label.unwrap_or_default(),
            platform_domain_id: value.platform_domain_id.map(|id| id.0).unwrap_or_default(),
            is_primary: value.is_primary,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDomain {
    pub id: PlatformDomainId,
    pub domain: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<PlatformDomain> for domain_proto::PlatformDomain {
    fn from(value: PlatformDomain) -> Self {
        Self {
            id: value.id.0,
            domain: value.domain,
            is_active: value.is_active,
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

/// Domain input for resource creation and `AddResourceDomain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainInput {
    PlatformProvided {
        subdomain_label: String,
        platform_domain_id: PlatformDomainId,
    },
    UserProvided {
        hostname: String,
    },
}

impl TryFrom<domain_proto::DomainInput> for DomainInput {
    type Error = String;

    fn try_from(value: domain_proto::DomainInput) -> Result<Self, Self::Error> {
        let source = domain_proto::DomainSource::try_from(value.source)
            .map_err(|_| format!("Invalid domain source: {}", value.source))?;
        match source {
            domain_proto::DomainSource::Unspecified => Err("Unspecified domain source".to_string()),
            domain_proto::DomainSource::PlatformProvided => {
                if value.subdomain_label.is_empty() {
                    return Err("Platform provided domains require a subdomain".to_string());
                }
                if value.platform_domain_id == 0 {
                    return Err("Platform provided domains require a platform domain".to_string());
                }
                Ok(DomainInput::PlatformProvided {
                    subdomain_label: value.subdomain_label,
                    platform_domain_id: PlatformDomainId(value.platform_domain_id),
                })
            }
            domain_proto::DomainSource::UserProvided => {
                if value.hostname.is_empty() {
                    return Err("User provided domains require a hostname".to_string());
                }
                Ok(DomainInput::UserProvided {
                    hostname: value.hostname,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterHealth {
    Healthy,
    Unhealthy,
    Unknown,
}

impl Display for ClusterHealth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterHealth::Healthy => write!(f, "healthy"),
            ClusterHealth::Unhealthy => write!(f, "unhealthy"),
            ClusterHealth::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for ClusterHealth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(ClusterHealth::Healthy),
            "unhealthy" => Ok(ClusterHealth::Unhealthy),
            "unknown" => Ok(ClusterHealth::Unknown),
            _ => Err(format!("Invalid cluster health: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub region: String,
    pub provider: String,
    pub is_active: bool,
    pub is_default: bool,
    pub endpoint: String,
    pub health_status: ClusterHealth,
    pub last_health_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl DeploymentStatus {
    /// `failed` and `succeeded` terminate the deployment state machine; a
    /// watch stream closes once it has emitted one of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Succeeded | DeploymentStatus::Failed)
    }
}

impl Display for DeploymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentStatus::Pending => write!(f, "pending"),
            DeploymentStatus::Deploying => write!(f, "deploying"),
            DeploymentStatus::Running => write!(f, "running"),
            DeploymentStatus::Succeeded => write!(f, "succeeded"),
            DeploymentStatus::Failed => write!(f, "failed"),
            DeploymentStatus::Canceled => write!(f, "canceled"),
        }
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeploymentStatus::Pending),
            "deploying" => Ok(DeploymentStatus::Deploying),
            "running" => Ok(DeploymentStatus::Running),
            "succeeded" => Ok(DeploymentStatus::Succeeded),
            "failed" => Ok(DeploymentStatus::Failed),
            "canceled" => Ok(DeploymentStatus::Canceled),
            _ => Err(format!("Invalid deployment status: {s}")),
        }
    }
}

impl From<DeploymentStatus> for deployment_proto::DeploymentStatus {
    fn from(value: DeploymentStatus) -> Self {
        match value {
            DeploymentStatus::Pending => deployment_proto::DeploymentStatus::Pending,
            DeploymentStatus::Deploying => deployment_proto::DeploymentStatus::Deploying,
            DeploymentStatus::Running => deployment_proto::DeploymentStatus::Running,
            DeploymentStatus::Succeeded => deployment_proto::DeploymentStatus::Succeeded,
            DeploymentStatus::Failed => deployment_proto::DeploymentStatus::Failed,
            DeploymentStatus::Canceled => deployment_proto::DeploymentStatus::Canceled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub resource_id: ResourceId,
    pub cluster_id: ClusterId,
    pub region: String,
    pub replicas: i32,
    pub status: DeploymentStatus,
    pub is_active: bool,
    pub message: String,
    /// Merged spec as persisted: env is always stripped.
    pub spec: DeploymentTypeSpec,
    pub spec_version: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Deployment> for deployment_proto::Deployment {
    fn from(value: Deployment) -> Self {
        Self {
            id: value.id.0,
            resource_id: value.resource_id.0,
            cluster_id: value.cluster_id.0,
            region: value.region,
            replicas: value.replicas,
            status: deployment_proto::DeploymentStatus::from(value.status) as i32,
            is_active: value.is_active,
            message: value.message,
            spec: Some(value.spec.into()),
            spec_version: value.spec_version,
            started_at: value
                .started_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
            completed_at: value
                .completed_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub name: String,
    pub entity: Entity,
    pub scopes: Vec<EntityScope>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<Token> for token_proto::Token {
    fn from(value: Token) -> Self {
        Self {
            id: value.id.0,
            name: value.name,
            entity: Some(value.entity.into()),
            scopes: value.scopes.into_iter().map(Into::into).collect(),
            expires_at: value.expires_at.to_rfc3339(),
            created_at: value.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeToken {
    pub data: Token,
    pub secret: TokenSecret,
}

impl UnsafeToken {
    pub fn new(data: Token, secret: TokenSecret) -> Self {
        Self { data, secret }
    }
}

impl From<UnsafeToken> for token_proto::UnsafeToken {
    fn from(value: UnsafeToken) -> Self {
        Self {
            data: Some(value.data.into()),
            secret: value.secret.value,
        }
    }
}

/// Identity details the OAuth provider reports for a login.
#[derive(Debug, Clone)]
pub struct ExternalLogin {
    pub external_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub verified_emails: Vec<String>,
}
