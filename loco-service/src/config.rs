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

use loco_common::config::{ConfigLoader, DbConfig};
use loco_common::model::Empty;
use loco_common::tracing::TracingConfig;
use loco_common::SafeDisplay;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocoServiceConfig {
    pub tracing: TracingConfig,
    pub environment: String,
    pub http_port: u16,
    pub grpc_port: u16,
    pub db: DbConfig,
    pub tokens: TokensConfig,
    pub login: LoginConfig,
    pub clusters: ClustersConfig,
    pub accounts: AccountsConfig,
    pub cors_origin_regex: String,
}

impl SafeDisplay for LocoServiceConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "tracing:");
        let _ = writeln!(&mut result, "{}", self.tracing.to_safe_string_indented());
        let _ = writeln!(&mut result, "environment: {}", self.environment);
        let _ = writeln!(&mut result, "HTTP port: {}", self.http_port);
        let _ = writeln!(&mut result, "gRPC port: {}", self.grpc_port);
        let _ = writeln!(&mut result, "DB:");
        let _ = writeln!(&mut result, "{}", self.db.to_safe_string_indented());
        let _ = writeln!(&mut result, "tokens:");
        let _ = writeln!(&mut result, "{}", self.tokens.to_safe_string_indented());
        let _ = writeln!(&mut result, "login:");
        let _ = writeln!(&mut result, "{}", self.login.to_safe_string_indented());
        let _ = writeln!(&mut result, "clusters:");
        let _ = writeln!(&mut result, "{}", self.clusters.to_safe_string_indented());
        let _ = writeln!(&mut result, "accounts:");
        let _ = writeln!(&mut result, "{}", self.accounts.to_safe_string_indented());
        let _ = writeln!(&mut result, "CORS origin regex: {}", self.cors_origin_regex);
        result
    }
}

impl Default for LocoServiceConfig {
    fn default() -> Self {
        Self {
            tracing: TracingConfig::local_dev("loco-service"),
            environment: "dev".to_string(),
            http_port: 8080,
            grpc_port: 8081,
            db: DbConfig::default(),
            tokens: TokensConfig::default(),
            login: LoginConfig::default(),
            clusters: ClustersConfig::default(),
            accounts: AccountsConfig::default(),
            cors_origin_regex: "https://*.loco.dev".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokensConfig {
    /// TTL of tokens minted by the OAuth exchange.
    #[serde(with = "humantime_serde")]
    pub login_token_ttl: Duration,
    /// Hard cap on the duration of explicitly issued tokens.
    #[serde(with = "humantime_serde")]
    pub max_token_duration: Duration,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            login_token_ttl: Duration::from_secs(8 * 60 * 60),
            max_token_duration: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl SafeDisplay for TokensConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "login token TTL: {:?}", self.login_token_ttl);
        let _ = writeln!(
            &mut result,
            "max token duration: {:?}",
            self.max_token_duration
        );
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum LoginConfig {
    OAuth2(OAuth2Config),
    Disabled(Empty),
}

impl Default for LoginConfig {
    fn default() -> LoginConfig {
        LoginConfig::OAuth2(OAuth2Config::default())
    }
}

impl SafeDisplay for LoginConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        match self {
            LoginConfig::OAuth2(inner) => {
                let _ = writeln!(&mut result, "OAuth2:");
                let _ = writeln!(&mut result, "{}", inner.to_safe_string_indented());
            }
            LoginConfig::Disabled(_) => {
                let _ = writeln!(&mut result, "disabled");
            }
        }
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OAuth2Config {
    pub github: GitHubOAuth2Config,
    /// One-time states live this long in the in-process cache.
    #[serde(with = "humantime_serde")]
    pub state_ttl: Duration,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            github: GitHubOAuth2Config::default(),
            state_ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl SafeDisplay for OAuth2Config {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "GitHub:");
        let _ = writeln!(&mut result, "{}", self.github.to_safe_string_indented());
        let _ = writeln!(&mut result, "state TTL: {:?}", self.state_ttl);
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitHubOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: url::Url,
}

impl SafeDisplay for GitHubOAuth2Config {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "client id: {}", self.client_id);
        let _ = writeln!(&mut result, "client secret: ****");
        let _ = writeln!(&mut result, "redirect uri: {}", self.redirect_uri);
        result
    }
}

impl Default for GitHubOAuth2Config {
    fn default() -> Self {
        Self {
            client_id: "GITHUB_CLIENT_ID".to_string(),
            client_secret: "GITHUB_CLIENT_SECRET".to_string(),
            redirect_uri: url::Url::parse("http://localhost:8080/oauth/callback/github")
                .expect("default redirect URI parses"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClustersConfig {
    pub target: ClusterTargetConfig,
    /// The fleet registered at startup, keyed by cluster name.
    pub fleet: HashMap<String, ClusterConfig>,
}

impl SafeDisplay for ClustersConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "target:");
        let _ = writeln!(&mut result, "{}", self.target.to_safe_string_indented());
        for (name, cluster) in &self.fleet {
            let _ = writeln!(&mut result, "{name}:");
            let _ = writeln!(&mut result, "{}", cluster.to_safe_string_indented());
        }
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum ClusterTargetConfig {
    Kube(KubeTargetConfig),
    Disabled(Empty),
}

impl Default for ClusterTargetConfig {
    fn default() -> Self {
        ClusterTargetConfig::Kube(KubeTargetConfig::default())
    }
}

impl SafeDisplay for ClusterTargetConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        match self {
            ClusterTargetConfig::Kube(inner) => {
                let _ = writeln!(&mut result, "kube:");
                let _ = writeln!(&mut result, "{}", inner.to_safe_string_indented());
            }
            ClusterTargetConfig::Disabled(_) => {
                let _ = writeln!(&mut result, "disabled");
            }
        }
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KubeTargetConfig {
    /// Namespace the workload controller watches for Application objects.
    pub namespace: String,
}

impl Default for KubeTargetConfig {
    fn default() -> Self {
        Self {
            namespace: "loco-apps".to_string(),
        }
    }
}

impl SafeDisplay for KubeTargetConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "namespace: {}", self.namespace);
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub region: String,
    pub provider: String,
    pub endpoint: String,
    pub is_default: bool,
}

impl SafeDisplay for ClusterConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "region: {}", self.region);
        let _ = writeln!(&mut result, "provider: {}", self.provider);
        let _ = writeln!(&mut result, "endpoint: {}", self.endpoint);
        let _ = writeln!(&mut result, "default: {}", self.is_default);
        result
    }
}

/// Accounts seeded at startup: operators with system scopes and a known
/// token, so a fresh install is reachable before any OAuth login happened.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountsConfig {
    pub accounts: HashMap<String, AccountConfig>,
}

impl SafeDisplay for AccountsConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        for (id, account) in &self.accounts {
            let _ = writeln!(&mut result, "{id}:");
            let _ = writeln!(&mut result, "{}", account.to_safe_string_indented());
        }
        result
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountConfig {
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub token: String,
}

impl SafeDisplay for AccountConfig {
    fn to_safe_string(&self) -> String {
        let mut result = String::new();
        let _ = writeln!(&mut result, "external id: {}", self.external_id);
        let _ = writeln!(&mut result, "name: {}", self.name);
        let _ = writeln!(&mut result, "email: {}", self.email);
        let _ = writeln!(&mut result, "token: ****");
        result
    }
}

pub fn make_config_loader() -> ConfigLoader<LocoServiceConfig> {
    ConfigLoader::new(&PathBuf::from("config/loco-service.toml"))
}

#[cfg(test)]
mod tests {
    use super::make_config_loader;
    use std::env;
    use std::path::PathBuf;

    #[test]
    pub fn config_is_loadable() {
        env::set_current_dir(PathBuf::from(env!("CARGO_MANIFEST_DIR")))
            .expect("Failed to set current directory");

        make_config_loader().load().expect("Failed to load config");
    }
}
