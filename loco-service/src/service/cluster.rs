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

use crate::model::{Cluster, RegionInfo};
use crate::repo::cluster::{ClusterRepo, NewCluster};
use async_trait::async_trait;
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ClusterServiceError {
    #[error("No active healthy cluster serves region {0}")]
    NoClusterForRegion(String),
    #[error(transparent)]
    InternalRepoError(#[from] RepoError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SafeDisplay for ClusterServiceError {
    fn to_safe_string(&self) -> String {
        match self {
            ClusterServiceError::NoClusterForRegion(_) => self.to_string(),
            ClusterServiceError::InternalRepoError(inner) => inner.to_safe_string(),
            ClusterServiceError::Internal(_) => "Internal error".to_string(),
        }
    }
}

#[async_trait]
pub trait ClusterService: Send + Sync {
    /// Cluster selection for a region: prefer the default cluster, else the
    /// oldest among active and healthy ones.
    async fn select_for_region(&self, region: &str) -> Result<Cluster, ClusterServiceError>;

    /// Distinct regions across active healthy clusters, with the default
    /// flag set when any cluster in the region is a default.
    async fn list_regions(&self) -> Result<Vec<RegionInfo>, ClusterServiceError>;

    /// Startup registration of the configured fleet.
    async fn register_fleet(&self, clusters: &[NewCluster]) -> Result<(), ClusterServiceError>;
}

pub struct ClusterServiceDefault {
    cluster_repo: Arc<dyn ClusterRepo>,
}

impl ClusterServiceDefault {
    pub fn new(cluster_repo: Arc<dyn ClusterRepo>) -> Self {
        Self { cluster_repo }
    }
}

#[async_trait]
impl ClusterService for ClusterServiceDefault {
    async fn select_for_region(&self, region: &str) -> Result<Cluster, ClusterServiceError> {
        let candidates = self.cluster_repo.find_for_region(region).await?;
        let record = candidates
            .into_iter()
            .next()
            .ok_or_else(|| ClusterServiceError::NoClusterForRegion(region.to_string()))?;
        record.try_into().map_err(ClusterServiceError::Internal)
    }

    async fn list_regions(&self) -> Result<Vec<RegionInfo>, ClusterServiceError> {
        let clusters = self.cluster_repo.list_active_healthy().await?;
        let mut regions: BTreeMap<String, bool> = BTreeMap::new();
        for cluster in clusters {
            let entry = regions.entry(cluster.region).or_insert(false);
            *entry |= cluster.is_default;
        }
        Ok(regions
            .into_iter()
            .map(|(region, is_default)| RegionInfo { region, is_default })
            .collect())
    }

    async fn register_fleet(&self, clusters: &[NewCluster]) -> Result<(), ClusterServiceError> {
        for cluster in clusters {
            info!(name = %cluster.name, region = %cluster.region, "registering cluster");
            self.cluster_repo.upsert(cluster).await?;
        }
        Ok(())
    }
}
