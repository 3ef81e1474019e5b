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

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Pod};
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::{Client, CustomResource, ResourceExt};
use loco_common::SafeDisplay;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// The workload object the control plane materializes per (resource,
/// region). The downstream workload controller reconciles it into pods;
/// this process only ever writes the desired state.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "loco.dev",
    version = "v1alpha1",
    kind = "Application",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub resource_id: i64,
    pub workspace_id: i64,
    pub region: String,
    #[serde(rename = "type")]
    pub workload_type: WorkloadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceWorkload>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadType {
    Service,
    Database,
    Cache,
    Queue,
    Blob,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceWorkload {
    pub deployment: DeploymentBlock,
    pub resources: ResourcesBlock,
    pub obs: ObservabilityBlock,
    pub routing: RoutingBlock,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentBlock {
    pub image: String,
    pub port: i32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_path: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesBlock {
    pub cpu: String,
    pub memory: String,
    pub replicas: ReplicasBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalers: Option<ScalersBlock>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReplicasBlock {
    pub min: i32,
    pub max: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScalersBlock {
    pub enabled: bool,
    pub cpu_target: u32,
    pub memory_target: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityBlock {
    pub logging: bool,
    pub metrics: bool,
    pub tracing: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingBlock {
    pub path_prefix: String,
    pub hostname: String,
}

#[derive(Debug, Clone)]
pub struct PodLogLine {
    pub pod: String,
    pub line: String,
}

#[derive(Debug, Clone)]
pub struct WorkloadEvent {
    pub reason: String,
    pub message: String,
    pub event_type: String,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplicationClientError {
    #[error("Cluster API error: {0}")]
    Api(String),
    #[error("Cluster connection failed: {0}")]
    Connection(String),
}

impl SafeDisplay for ApplicationClientError {
    fn to_safe_string(&self) -> String {
        "Cluster API error".to_string()
    }
}

impl From<kube::Error> for ApplicationClientError {
    fn from(error: kube::Error) -> Self {
        ApplicationClientError::Api(error.to_string())
    }
}

/// Cluster-side operations the control plane needs. The kube implementation
/// talks to the fleet; the in-memory one backs tests and the
/// `ClusterTargetConfig::Disabled` mode.
#[async_trait]
pub trait ApplicationClient: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Application>, ApplicationClientError>;

    async fn create(&self, application: Application) -> Result<(), ApplicationClientError>;

    async fn update(&self, application: Application) -> Result<(), ApplicationClientError>;

    /// Deleting an object that is already gone is not an error.
    async fn delete(&self, name: &str) -> Result<(), ApplicationClientError>;

    async fn pod_logs(&self, namespace: &str) -> Result<Vec<PodLogLine>, ApplicationClientError>;

    async fn list_events(
        &self,
        namespace: &str,
    ) -> Result<Vec<WorkloadEvent>, ApplicationClientError>;
}

/// Read-then-update-or-create: a `NotFound` on read triggers create,
/// otherwise the stored object is replaced carrying the observed
/// resourceVersion forward.
pub async fn apply(
    client: &dyn ApplicationClient,
    mut application: Application,
) -> Result<(), ApplicationClientError> {
    let name = application.name_any();
    match client.get(&name).await? {
        Some(existing) => {
            application.metadata.resource_version = existing.metadata.resource_version;
            client.update(application).await
        }
        None => client.create(application).await,
    }
}

pub struct KubeApplicationClient {
    client: Client,
    applications: Api<Application>,
}

impl KubeApplicationClient {
    /// Builds a client from the ambient kube config (in-cluster service
    /// account or the default kubeconfig context).
    pub async fn try_default(namespace: &str) -> Result<Self, ApplicationClientError> {
        let client = Client::try_default()
            .await
            .map_err(|err| ApplicationClientError::Connection(err.to_string()))?;
        Ok(Self::new(client, namespace))
    }

    pub fn new(client: Client, namespace: &str) -> Self {
        let applications = Api::namespaced(client.clone(), namespace);
        Self {
            client,
            applications,
        }
    }

    fn is_not_found(error: &kube::Error) -> bool {
        matches!(error, kube::Error::Api(response) if response.code == 404)
    }
}

#[async_trait]
impl ApplicationClient for KubeApplicationClient {
    async fn get(&self, name: &str) -> Result<Option<Application>, ApplicationClientError> {
        match self.applications.get(name).await {
            Ok(application) => Ok(Some(application)),
            Err(error) if Self::is_not_found(&error) => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn create(&self, application: Application) -> Result<(), ApplicationClientError> {
        self.applications
            .create(&PostParams::default(), &application)
            .await?;
        Ok(())
    }

    async fn update(&self, application: Application) -> Result<(), ApplicationClientError> {
        let name = application.name_any();
        self.applications
            .replace(&name, &PostParams::default(), &application)
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ApplicationClientError> {
        match self.applications.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(error) if Self::is_not_found(&error) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn pod_logs(&self, namespace: &str) -> Result<Vec<PodLogLine>, ApplicationClientError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut result = Vec::new();
        let listed = pods.list(&ListParams::default()).await?;
        for pod in listed {
            let pod_name = pod.name_any();
            let params = LogParams {
                tail_lines: Some(100),
                ..LogParams::default()
            };
            let logs = pods.logs(&pod_name, &params).await?;
            for line in logs.lines() {
                result.push(PodLogLine {
                    pod: pod_name.clone(),
                    line: line.to_string(),
                });
            }
        }
        Ok(result)
    }

    async fn list_events(
        &self,
        namespace: &str,
    ) -> Result<Vec<WorkloadEvent>, ApplicationClientError> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let listed = events.list(&ListParams::default()).await?;
        Ok(listed
            .into_iter()
            .map(|event| WorkloadEvent {
                reason: event.reason.unwrap_or_default(),
                message: event.message.unwrap_or_default(),
                event_type: event.type_.unwrap_or_default(),
                timestamp: event.last_timestamp.map(|time| time.0),
            })
            .collect())
    }
}

/// Records every applied object; substitutes for a cluster in tests and
/// when the cluster target is disabled.
#[derive(Default)]
pub struct InMemoryApplicationClient {
    applications: Mutex<HashMap<String, Application>>,
}

impl InMemoryApplicationClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationClient for InMemoryApplicationClient {
    async fn get(&self, name: &str) -> Result<Option<Application>, ApplicationClientError> {
        Ok(self.applications.lock().unwrap().get(name).cloned())
    }

    async fn create(&self, application: Application) -> Result<(), ApplicationClientError> {
        let name = application.name_any();
        let mut applications = self.applications.lock().unwrap();
        if applications.contains_key(&name) {
            return Err(ApplicationClientError::Api(format!(
                "applications.loco.dev {name} already exists"
            )));
        }
        applications.insert(name, application);
        Ok(())
    }

    async fn update(&self, application: Application) -> Result<(), ApplicationClientError> {
        let name = application.name_any();
        let mut applications = self.applications.lock().unwrap();
        if !applications.contains_key(&name) {
            return Err(ApplicationClientError::Api(format!(
                "applications.loco.dev {name} not found"
            )));
        }
        applications.insert(name, application);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ApplicationClientError> {
        self.applications.lock().unwrap().remove(name);
        Ok(())
    }

    async fn pod_logs(&self, _namespace: &str) -> Result<Vec<PodLogLine>, ApplicationClientError> {
        Ok(Vec::new())
    }

    async fn list_events(
        &self,
        _namespace: &str,
    ) -> Result<Vec<WorkloadEvent>, ApplicationClientError> {
        Ok(Vec::new())
    }
}
