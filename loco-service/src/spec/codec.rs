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

use super::{DeploymentTypeSpec, ResourceTypeSpec};
use crate::model::ResourceType;
use loco_common::SafeDisplay;

/// Version written alongside every persisted spec. The decoder dispatches on
/// it; unknown versions are rejected so a rolling schema change can never
/// silently lose fields.
pub const SPEC_VERSION: i32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SpecCodecError {
    #[error("Unsupported spec version: {0}")]
    UnsupportedVersion(i32),
    #[error("Resource type mismatch: stored {stored}, expected {expected}")]
    TypeMismatch {
        stored: ResourceType,
        expected: ResourceType,
    },
    #[error("Spec serialization failed: {0}")]
    Serialization(String),
}

impl SafeDisplay for SpecCodecError {
    fn to_safe_string(&self) -> String {
        match self {
            SpecCodecError::UnsupportedVersion(_) => self.to_string(),
            SpecCodecError::TypeMismatch { .. } => self.to_string(),
            SpecCodecError::Serialization(_) => "Invalid stored spec".to_string(),
        }
    }
}

pub fn encode_resource_spec(spec: &ResourceTypeSpec) -> Result<(String, i32), SpecCodecError> {
    let json =
        serde_json::to_string(spec).map_err(|err| SpecCodecError::Serialization(err.to_string()))?;
    Ok((json, SPEC_VERSION))
}

pub fn decode_resource_spec(
    json: &str,
    version: i32,
    resource_type: ResourceType,
) -> Result<ResourceTypeSpec, SpecCodecError> {
    if version != SPEC_VERSION {
        return Err(SpecCodecError::UnsupportedVersion(version));
    }
    let spec: ResourceTypeSpec =
        serde_json::from_str(json).map_err(|err| SpecCodecError::Serialization(err.to_string()))?;
    if spec.resource_type() != resource_type {
        return Err(SpecCodecError::TypeMismatch {
            stored: spec.resource_type(),
            expected: resource_type,
        });
    }
    Ok(spec)
}

pub fn encode_deployment_spec(spec: &DeploymentTypeSpec) -> Result<(String, i32), SpecCodecError> {
    let json =
        serde_json::to_string(spec).map_err(|err| SpecCodecError::Serialization(err.to_string()))?;
    Ok((json, SPEC_VERSION))
}

pub fn decode_deployment_spec(
    json: &str,
    version: i32,
) -> Result<DeploymentTypeSpec, SpecCodecError> {
    if version != SPEC_VERSION {
        return Err(SpecCodecError::UnsupportedVersion(version));
    }
    serde_json::from_str(json).map_err(|err| SpecCodecError::Serialization(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{
        BuildSpec, ObservabilitySpec, RegionTarget, RoutingSpec, ServiceDeploymentSpec,
        ServiceResourceSpec,
    };
    use std::collections::BTreeMap;

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

    #[test]
    fn resource_spec_round_trips() {
        let spec = service_spec();
        let (json, version) = encode_resource_spec(&spec).unwrap();
        let decoded =
            decode_resource_spec(&json, version, crate::model::ResourceType::Service).unwrap();
        assert_eq!(decoded, spec);
    }

    #[test]
    fn every_resource_type_round_trips() {
        use crate::spec::{
            BlobResourceSpec, CacheResourceSpec, DatabaseResourceSpec, QueueResourceSpec,
        };

        let specs = [
            service_spec(),
            ResourceTypeSpec::Database(DatabaseResourceSpec {
                engine: "postgres".to_string(),
                version: "16".to_string(),
            }),
            ResourceTypeSpec::Cache(CacheResourceSpec {
                engine: "redis".to_string(),
                version: "7".to_string(),
            }),
            ResourceTypeSpec::Queue(QueueResourceSpec {
                engine: "nats".to_string(),
            }),
            ResourceTypeSpec::Blob(BlobResourceSpec {
                storage_class: "standard".to_string(),
            }),
        ];
        for spec in specs {
            let (json, version) = encode_resource_spec(&spec).unwrap();
            let decoded = decode_resource_spec(&json, version, spec.resource_type()).unwrap();
            assert_eq!(decoded, spec);
        }
    }

    #[test]
    fn deployment_spec_round_trips() {
        let spec = DeploymentTypeSpec::Service(ServiceDeploymentSpec {
            image: "nginx:1.25".to_string(),
            cpu: Some("250m".to_string()),
            memory: None,
            min_replicas: Some(2),
            max_replicas: None,
            scalers: None,
            env: Some(BTreeMap::from([("A".to_string(), "b".to_string())])),
        });
        let (json, version) = encode_deployment_spec(&spec).unwrap();
        let decoded = decode_deployment_spec(&json, version).unwrap();
        assert_eq!(decoded, spec);
    }

    #[test]
    fn unknown_versions_are_rejected() {
        let (json, _) = encode_resource_spec(&service_spec()).unwrap();
        let result = decode_resource_spec(&json, 2, crate::model::ResourceType::Service);
        assert!(matches!(result, Err(SpecCodecError::UnsupportedVersion(2))));
    }

    #[test]
    fn type_mismatch_fails_fast() {
        let (json, version) = encode_resource_spec(&service_spec()).unwrap();
        let result = decode_resource_spec(&json, version, crate::model::ResourceType::Database);
        assert!(matches!(result, Err(SpecCodecError::TypeMismatch { .. })));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let (json, version) = encode_resource_spec(&service_spec()).unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("future_field".to_string(), serde_json::json!(42));
        let patched = serde_json::to_string(&value).unwrap();
        let decoded =
            decode_resource_spec(&patched, version, crate::model::ResourceType::Service).unwrap();
        assert_eq!(decoded, service_spec());
    }
}
