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

mod oauth2_provider_client;
mod service;
mod state_cache;

pub use oauth2_provider_client::{
    GithubOAuth2Client, OAuth2ProviderClient, OAuth2ProviderClientError,
};
pub use service::{LoginError, LoginService, LoginServiceDefault};
pub use state_cache::OAuthStateCache;

use crate::config::LoginConfig;
use crate::repo::user::UserRepo;
use crate::service::token::TokenService;
use std::sync::Arc;

/// Login is a deployment choice: hosted installs run the OAuth2 system,
/// air-gapped ones disable it and rely on seeded tokens.
pub enum LoginSystem {
    Enabled(Arc<dyn LoginService>),
    Disabled,
}

impl LoginSystem {
    pub fn new(
        config: &LoginConfig,
        user_repo: Arc<dyn UserRepo>,
        token_service: Arc<dyn TokenService>,
    ) -> Self {
        match config {
            LoginConfig::OAuth2(oauth2) => {
                let client: Arc<dyn OAuth2ProviderClient> =
                    Arc::new(GithubOAuth2Client::new(oauth2.github.clone()));
                let state_cache = Arc::new(OAuthStateCache::new(oauth2.state_ttl));
                LoginSystem::Enabled(Arc::new(LoginServiceDefault::new(
                    client,
                    user_repo,
                    token_service,
                    state_cache,
                )))
            }
            LoginConfig::Disabled(_) => LoginSystem::Disabled,
        }
    }
}
