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

use super::{DeploymentTypeSpec, ResourceTypeSpec, ServiceDeploymentSpec};
use crate::model::ResourceType;
use loco_common::SafeDisplay;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Resource has no configuration for region {0}")]
    UnknownRegion(String),
    #[error("Deployments are not supported for {0} resources")]
    UnsupportedResourceType(ResourceType),
}

impl SafeDisplay for MergeError {
    fn to_safe_string(&self) -> String {
        self.to_string()
    }
}

/// Region-aware merge: the durable region target provides the defaults, the
/// per-rollout override wins wherever it carries a value. An override field
/// counts as present when it is non-empty (strings) or strictly positive
/// (replicas); env is taken verbatim from the override.
pub fn merge(
    resource_spec: &ResourceTypeSpec,
    override_spec: Option<&DeploymentTypeSpec>,
    region: &str,
) -> Result<ServiceDeploymentSpec, MergeError> {
    let service = match resource_spec {
        ResourceTypeSpec::Service(service) => service,
        other => return Err(MergeError::UnsupportedResourceType(other.resource_type())),
    };

    let override_service = match override_spec {
        Some(DeploymentTypeSpec::Service(service)) => Some(service),
        None => None,
    };

    let target = service
        .regions
        .get(region)
        .ok_or_else(|| MergeError::UnknownRegion(region.to_string()))?;

    let mut merged = ServiceDeploymentSpec {
        image: service.build.image.clone(),
        cpu: Some(target.cpu.clone()),
        memory: Some(target.memory.clone()),
        min_replicas: Some(target.min_replicas),
        max_replicas: Some(target.max_replicas),
        scalers: target.scalers.clone(),
        env: None,
    };

    if let Some(override_service) = override_service {
        if !override_service.image.is_empty() {
            merged.image = override_service.image.clone();
        }
        if let Some(cpu) = &override_service.cpu {
            if !cpu.is_empty() {
                merged.cpu = Some(cpu.clone());
            }
        }
        if let Some(memory) = &override_service.memory {
            if !memory.is_empty() {
                merged.memory = Some(memory.clone());
            }
        }
        if let Some(min_replicas) = override_service.min_replicas {
            if min_replicas > 0 {
                merged.min_replicas = Some(min_replicas);
            }
        }
        if let Some(max_replicas) = override_service.max_replicas {
            if max_replicas > 0 {
                merged.max_replicas = Some(max_replicas);
            }
        }
        if let Some(scalers) = &override_service.scalers {
            merged.scalers = Some(scalers.clone());
        }
        merged.env = override_service.env.clone();
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{BuildSpec, RegionTarget, ScalersSpec, ServiceResourceSpec};
    use std::collections::BTreeMap;

    fn resource_spec() -> ResourceTypeSpec {
        let mut regions = BTreeMap::new();
        regions.insert(
            "us-east-1".to_string(),
            RegionTarget {
                cpu: "500m".to_string(),
                memory: "512Mi".to_string(),
                min_replicas: 1,
                max_replicas: 3,
                scalers: Some(ScalersSpec {
                    enabled: true,
                    cpu_target: 80,
                    memory_target: 0,
                }),
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
            routing: Default::default(),
            observability: Default::default(),
            regions,
        })
    }

    #[test]
    fn empty_override_leaves_region_defaults() {
        let merged = merge(&resource_spec(), None, "us-east-1").unwrap();
        assert_eq!(merged.image, "nginx:1.25");
        assert_eq!(merged.cpu.as_deref(), Some("500m"));
        assert_eq!(merged.memory.as_deref(), Some("512Mi"));
        assert_eq!(merged.min_replicas, Some(1));
        assert_eq!(merged.max_replicas, Some(3));
        assert!(merged.scalers.as_ref().is_some_and(|s| s.enabled));
        assert_eq!(merged.env, None);
    }

    #[test]
    fn override_fields_win_when_present() {
        let override_spec = DeploymentTypeSpec::Service(ServiceDeploymentSpec {
            image: "nginx:1.26".to_string(),
            cpu: Some("1000m".to_string()),
            memory: None,
            min_replicas: Some(2),
            max_replicas: Some(0),
            scalers: None,
            env: None,
        });
        let merged = merge(&resource_spec(), Some(&override_spec), "us-east-1").unwrap();
        assert_eq!(merged.image, "nginx:1.26");
        assert_eq!(merged.cpu.as_deref(), Some("1000m"));
        // Absent and non-positive values fall back to the region target.
        assert_eq!(merged.memory.as_deref(), Some("512Mi"));
        assert_eq!(merged.min_replicas, Some(2));
        assert_eq!(merged.max_replicas, Some(3));
    }

    #[test]
    fn env_is_taken_verbatim_from_the_override() {
        let env = BTreeMap::from([("SECRET".to_string(), "s".to_string())]);
        let override_spec = DeploymentTypeSpec::Service(ServiceDeploymentSpec {
            image: String::new(),
            env: Some(env.clone()),
            ..Default::default()
        });
        let merged = merge(&resource_spec(), Some(&override_spec), "eu-west-1").unwrap();
        assert_eq!(merged.env, Some(env));
        assert_eq!(merged.image, "nginx:1.25");
    }

    #[test]
    fn unknown_region_is_an_error() {
        let result = merge(&resource_spec(), None, "ap-south-1");
        assert!(matches!(result, Err(MergeError::UnknownRegion(_))));
    }

    #[test]
    fn non_service_resources_are_rejected() {
        let spec = ResourceTypeSpec::Database(crate::spec::DatabaseResourceSpec {
            engine: "postgres".to_string(),
            version: "16".to_string(),
        });
        let result = merge(&spec, None, "us-east-1");
        assert!(matches!(
            result,
            Err(MergeError::UnsupportedResourceType(ResourceType::Database))
        ));
    }
}
