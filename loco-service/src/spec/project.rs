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

use super::{ServiceDeploymentSpec, ServiceResourceSpec};
use crate::k8s::application::{
    Application, ApplicationSpec, DeploymentBlock, ObservabilityBlock, ReplicasBlock,
    ResourcesBlock, RoutingBlock, ScalersBlock, ServiceWorkload, WorkloadType,
};
use crate::k8s::application_name;
use crate::model::{ResourceId, WorkspaceId};

/// Projects a merged deployment spec onto the workload CRD. The merged spec
/// carries env at this point; env never reaches the deployment row, only the
/// cluster object.
pub fn project_service(
    resource_id: ResourceId,
    workspace_id: WorkspaceId,
    region: &str,
    merged: &ServiceDeploymentSpec,
    resource_spec: &ServiceResourceSpec,
    hostname: &str,
) -> Application {
    let spec = ApplicationSpec {
        resource_id: resource_id.0,
        workspace_id: workspace_id.0,
        region: region.to_string(),
        workload_type: WorkloadType::Service,
        service: Some(ServiceWorkload {
            deployment: DeploymentBlock {
                image: merged.image.clone(),
                port: resource_spec.port,
                env: merged.env.clone().unwrap_or_default(),
                health_check_path: None,
            },
            resources: ResourcesBlock {
                cpu: merged.cpu.clone().unwrap_or_default(),
                memory: merged.memory.clone().unwrap_or_default(),
                replicas: ReplicasBlock {
                    min: merged.min_replicas.unwrap_or(1),
                    max: merged.max_replicas.unwrap_or(1),
                },
                scalers: merged.scalers.as_ref().map(|scalers| ScalersBlock {
                    enabled: scalers.enabled,
                    cpu_target: scalers.cpu_target,
                    memory_target: scalers.memory_target,
                }),
            },
            obs: ObservabilityBlock {
                logging: resource_spec.observability.logging,
                metrics: resource_spec.observability.metrics,
                tracing: resource_spec.observability.tracing,
            },
            routing: RoutingBlock {
                path_prefix: resource_spec.routing.path_prefix.clone(),
                hostname: hostname.to_string(),
            },
        }),
    };

    Application::new(&application_name(resource_id), spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{BuildSpec, ObservabilitySpec, RegionTarget, RoutingSpec};
    use kube::ResourceExt;
    use std::collections::BTreeMap;

    #[test]
    fn projection_builds_the_crd_shape() {
        let resource_spec = ServiceResourceSpec {
            build: BuildSpec {
                image: "nginx:1.25".to_string(),
                dockerfile: None,
                build_type: None,
            },
            port: 8080,
            routing: RoutingSpec {
                path_prefix: "/api".to_string(),
                idle_timeout_seconds: 60,
            },
            observability: ObservabilitySpec {
                logging: true,
                metrics: true,
                tracing: false,
            },
            regions: BTreeMap::new(),
        };
        let merged = ServiceDeploymentSpec {
            image: "nginx:1.26".to_string(),
            cpu: Some("500m".to_string()),
            memory: Some("512Mi".to_string()),
            min_replicas: Some(2),
            max_replicas: Some(4),
            scalers: None,
            env: Some(BTreeMap::from([("A".to_string(), "b".to_string())])),
        };

        let application = project_service(
            ResourceId(7),
            WorkspaceId(3),
            "us-east-1",
            &merged,
            &resource_spec,
            "api.deploy-app.com",
        );

        assert_eq!(application.name_any(), "resource-7");
        assert_eq!(application.spec.region, "us-east-1");
        assert_eq!(application.spec.workload_type, WorkloadType::Service);
        let service = application.spec.service.as_ref().unwrap();
        assert_eq!(service.deployment.image, "nginx:1.26");
        assert_eq!(service.deployment.port, 8080);
        assert_eq!(service.deployment.env.get("A").map(String::as_str), Some("b"));
        assert_eq!(service.resources.replicas.min, 2);
        assert_eq!(service.resources.replicas.max, 4);
        assert_eq!(service.routing.hostname, "api.deploy-app.com");
        assert_eq!(service.routing.path_prefix, "/api");
    }
}
