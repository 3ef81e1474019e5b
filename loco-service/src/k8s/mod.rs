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

pub mod application;

use crate::model::{ResourceId, WorkspaceId};

/// CRD object name for a resource's workload.
pub fn application_name(resource_id: ResourceId) -> String {
    format!("resource-{resource_id}")
}

/// Namespace the workload controller materializes a resource's pods into.
pub fn resource_namespace(workspace_id: WorkspaceId, resource_id: ResourceId) -> String {
    format!("wks-{workspace_id}-res-{resource_id}")
}
