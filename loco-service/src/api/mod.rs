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

use crate::VERSION;
use poem::web::Json;
use poem::{get, handler, Route};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthcheckResponse {}

#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: String,
}

#[handler]
fn healthcheck() -> Json<HealthcheckResponse> {
    Json(HealthcheckResponse {})
}

#[handler]
fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: VERSION.to_string(),
    })
}

pub fn make_api_route() -> Route {
    Route::new()
        .at("/healthcheck", get(healthcheck))
        .at("/version", get(version))
}
