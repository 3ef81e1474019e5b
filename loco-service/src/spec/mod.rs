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

use crate::model::ResourceType;
use loco_api_grpc::proto::loco::deployment::v1 as deployment_proto;
use loco_api_grpc::proto::loco::resource::v1 as resource_proto;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod codec;
pub mod merge;
pub mod project;

/// Durable desired shape of a resource, keyed by resource type. The serde
/// shape of these types is persisted to the `resources.spec` column; see
/// `codec` for the version handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceTypeSpec {
    Service(ServiceResourceSpec),
    Database(DatabaseResourceSpec),
    Cache(CacheResourceSpec),
    Queue(QueueResourceSpec),
    Blob(BlobResourceSpec),
}

impl ResourceTypeSpec {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceTypeSpec::Service(_) => ResourceType::Service,
            ResourceTypeSpec::Database(_) => ResourceType::Database,
            ResourceTypeSpec::Cache(_) => ResourceType::Cache,
            ResourceTypeSpec::Queue(_) => ResourceType::Queue,
            ResourceTypeSpec::Blob(_) => ResourceType::Blob,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceResourceSpec> {
        match self {
            ResourceTypeSpec::Service(spec) => Some(spec),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResourceSpec {
    pub build: BuildSpec,
    pub port: i32,
    #[serde(default)]
    pub routing: RoutingSpec,
    #[serde(default)]
    pub observability: ObservabilitySpec,
    /// Region name to the desired shape in that region. A BTreeMap keeps the
    /// persisted serialization deterministic.
    pub regions: BTreeMap<String, RegionTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingSpec {
    #[serde(default)]
    pub path_prefix: String,
    #[serde(default)]
    pub idle_timeout_seconds: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservabilitySpec {
    #[serde(default)]
    pub logging: bool,
    #[serde(default)]
    pub metrics: bool,
    #[serde(default)]
    pub tracing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalersSpec {
    pub enabled: bool,
    #[serde(default)]
    pub cpu_target: u32,
    #[serde(default)]
    pub memory_target: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionTarget {
    pub cpu: String,
    pub memory: String,
    pub min_replicas: i32,
    pub max_replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalers: Option<ScalersSpec>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseResourceSpec {
    pub engine: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheResourceSpec {
    pub engine: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueResourceSpec {
    pub engine: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobResourceSpec {
    pub storage_class: String,
}

/// Per-rollout override, keyed by resource type. Only services carry a
/// deployment shape today; the enum stays exhaustive so adding another
/// variant forces every converter match to be revisited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeploymentTypeSpec {
    Service(ServiceDeploymentSpec),
}

impl DeploymentTypeSpec {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            DeploymentTypeSpec::Service(_) => ResourceType::Service,
        }
    }

    pub fn as_service(&self) -> &ServiceDeploymentSpec {
        match self {
            DeploymentTypeSpec::Service(spec) => spec,
        }
    }

    /// Copy with `env` removed; the DB never stores plaintext environment
    /// values.
    pub fn stripped_for_persistence(&self) -> DeploymentTypeSpec {
        match self {
            DeploymentTypeSpec::Service(spec) => DeploymentTypeSpec::Service(ServiceDeploymentSpec {
                env: None,
                ..spec.clone()
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDeploymentSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalers: Option<ScalersSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

fn optional(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl From<ScalersSpec> for resource_proto::ScalersSpec {
    fn from(value: ScalersSpec) -> Self {
        Self {
            enabled: value.enabled,
            cpu_target: value.cpu_target,
            memory_target: value.memory_target,
        }
    }
}

impl From<resource_proto::ScalersSpec> for ScalersSpec {
    fn from(value: resource_proto::ScalersSpec) -> Self {
        Self {
            enabled: value.enabled,
            cpu_target: value.cpu_target,
            memory_target: value.memory_target,
        }
    }
}

impl From<RegionTarget> for resource_proto::RegionTarget {
    fn from(value: RegionTarget) -> Self {
        Self {
            cpu: value.cpu,
            memory: value.memory,
            min_replicas: value.min_replicas,
            max_replicas: value.max_replicas,
            scalers: value.scalers.map(Into::into),
            primary: value.primary,
        }
    }
}

impl From<resource_proto::RegionTarget> for RegionTarget {
    fn from(value: resource_proto::RegionTarget) -> Self {
        Self {
            cpu: value.cpu,
            memory: value.memory,
            min_replicas: value.min_replicas,
            max_replicas: value.max_replicas,
            scalers: value.scalers.map(Into::into),
            primary: value.primary,
        }
    }
}

impl From<ServiceResourceSpec> for resource_proto::ServiceResourceSpec {
    fn from(value: ServiceResourceSpec) -> Self {
        Self {
            build: Some(resource_proto::BuildSpec {
                image: value.build.image,
                dockerfile: value.build.dockerfile.unwrap_or_default(),
                build_type: value.build.build_type.unwrap_or_default(),
            }),
            port: value.port,
            routing: Some(resource_proto::RoutingSpec {
                path_prefix: value.routing.path_prefix,
                idle_timeout_seconds: value.routing.idle_timeout_seconds,
            }),
            observability: Some(resource_proto::ObservabilitySpec {
                logging: value.observability.logging,
                metrics: value.observability.metrics,
                tracing: value.observability.tracing,
            }),
            regions: value
                .regions
                .into_iter()
                .map(|(region, target)| (region, target.into()))
                .collect(),
        }
    }
}

impl TryFrom<resource_proto::ServiceResourceSpec> for ServiceResourceSpec {
    type Error = String;

    fn try_from(value: resource_proto::ServiceResourceSpec) -> Result<Self, Self::Error> {
        let build = value.build.ok_or("Missing build")?;
        Ok(Self {
            build: BuildSpec {
                image: build.image,
                dockerfile: optional(build.dockerfile),
                build_type: optional(build.build_type),
            },
            port: value.port,
            routing: value
                .routing
                .map(|routing| RoutingSpec {
                    path_prefix: routing.path_prefix,
                    idle_timeout_seconds: routing.idle_timeout_seconds,
                })
                .unwrap_or_default(),
            observability: value
                .observability
                .map(|obs| ObservabilitySpec {
                    logging: obs.logging,
                    metrics: obs.metrics,
                    tracing: obs.tracing,
                })
                .unwrap_or_default(),
            regions: value
                .regions
                .into_iter()
                .map(|(region, target)| (region, target.into()))
                .collect(),
        })
    }
}

impl From<ResourceTypeSpec> for resource_proto::ResourceSpec {
    fn from(value: ResourceTypeSpec) -> Self {
        let spec = match value {
            ResourceTypeSpec::Service(service) => {
                resource_proto::resource_spec::Spec::Service(service.into())
            }
            ResourceTypeSpec::Database(database) => {
                resource_proto::resource_spec::Spec::Database(resource_proto::DatabaseResourceSpec {
                    engine: database.engine,
                    version: database.version,
                })
            }
            ResourceTypeSpec::Cache(cache) => {
                resource_proto::resource_spec::Spec::Cache(resource_proto::CacheResourceSpec {
                    engine: cache.engine,
                    version: cache.version,
                })
            }
            ResourceTypeSpec::Queue(queue) => {
                resource_proto::resource_spec::Spec::Queue(resource_proto::QueueResourceSpec {
                    engine: queue.engine,
                })
            }
            ResourceTypeSpec::Blob(blob) => {
                resource_proto::resource_spec::Spec::Blob(resource_proto::BlobResourceSpec {
                    storage_class: blob.storage_class,
                })
            }
        };
        Self { spec: Some(spec) }
    }
}

impl TryFrom<resource_proto::ResourceSpec> for ResourceTypeSpec {
    type Error = String;

    fn try_from(value: resource_proto::ResourceSpec) -> Result<Self, Self::Error> {
        match value.spec.ok_or("Missing spec")? {
            resource_proto::resource_spec::Spec::Service(service) => {
                Ok(ResourceTypeSpec::Service(service.try_into()?))
            }
            resource_proto::resource_spec::Spec::Database(database) => {
                Ok(ResourceTypeSpec::Database(DatabaseResourceSpec {
                    engine: database.engine,
                    version: database.version,
                }))
            }
            resource_proto::resource_spec::Spec::Cache(cache) => {
                Ok(ResourceTypeSpec::Cache(CacheResourceSpec {
                    engine: cache.engine,
                    version: cache.version,
                }))
            }
            resource_proto::resource_spec::Spec::Queue(queue) => {
                Ok(ResourceTypeSpec::Queue(QueueResourceSpec {
                    engine: queue.engine,
                }))
            }
            resource_proto::resource_spec::Spec::Blob(blob) => {
                Ok(ResourceTypeSpec::Blob(BlobResourceSpec {
                    storage_class: blob.storage_class,
                }))
            }
        }
    }
}

impl From<ServiceDeploymentSpec> for deployment_proto::ServiceDeploymentSpec {
    fn from(value: ServiceDeploymentSpec) -> Self {
        Self {
            image: value.image,
            cpu: value.cpu.unwrap_or_default(),
            memory: value.memory.unwrap_or_default(),
            min_replicas: value.min_replicas.unwrap_or_default(),
            max_replicas: value.max_replicas.unwrap_or_default(),
            scalers: value.scalers.map(Into::into),
            env: value.env.map(|env| env.into_iter().collect()).unwrap_or_default(),
        }
    }
}

impl From<deployment_proto::ServiceDeploymentSpec> for ServiceDeploymentSpec {
    fn from(value: deployment_proto::ServiceDeploymentSpec) -> Self {
        Self {
            image: value.image,
            cpu: optional(value.cpu),
            memory: optional(value.memory),
            min_replicas: (value.min_replicas > 0).then_some(value.min_replicas),
            max_replicas: (value.max_replicas > 0).then_some(value.max_replicas),
            scalers: value.scalers.map(Into::into),
            env: if value.env.is_empty() {
                None
            } else {
                Some(value.env.into_iter().collect())
            },
        }
    }
}

impl From<DeploymentTypeSpec> for deployment_proto::DeploymentSpec {
    fn from(value: DeploymentTypeSpec) -> Self {
        match value {
            DeploymentTypeSpec::Service(service) => Self {
                spec: Some(deployment_proto::deployment_spec::Spec::Service(
                    service.into(),
                )),
            },
        }
    }
}

impl TryFrom<deployment_proto::DeploymentSpec> for DeploymentTypeSpec {
    type Error = String;

    fn try_from(value: deployment_proto::DeploymentSpec) -> Result<Self, Self::Error> {
        match value.spec.ok_or("Missing spec")? {
            deployment_proto::deployment_spec::Spec::Service(service) => {
                Ok(DeploymentTypeSpec::Service(service.into()))
            }
        }
    }
}
