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

use crate::config::GitHubOAuth2Config;
use crate::model::ExternalLogin;
use async_trait::async_trait;
use loco_common::SafeDisplay;
use serde::Deserialize;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_ACCESS_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_USER_URL: &str = "https://api.github.com/user";
const GITHUB_API_EMAILS_URL: &str = "https://api.github.com/user/emails";
const USER_AGENT: &str = concat!("loco-service/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum OAuth2ProviderClientError {
    /// The provider rejected the credential; the caller's problem.
    #[error("OAuth provider rejected the request: {0}")]
    External(String),
    #[error("OAuth provider call failed: {0}")]
    Internal(String),
}

impl SafeDisplay for OAuth2ProviderClientError {
    fn to_safe_string(&self) -> String {
        match self {
            OAuth2ProviderClientError::External(_) => self.to_string(),
            OAuth2ProviderClientError::Internal(_) => {
                "OAuth provider call failed".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for OAuth2ProviderClientError {
    fn from(error: reqwest::Error) -> Self {
        OAuth2ProviderClientError::Internal(error.to_string())
    }
}

/// The outbound half of the identity exchange: authorization URL
/// construction, code-for-token exchange and identity lookup.
#[async_trait]
pub trait OAuth2ProviderClient: Send + Sync {
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<String, OAuth2ProviderClientError>;

    async fn external_login(
        &self,
        access_token: &str,
    ) -> Result<ExternalLogin, OAuth2ProviderClientError>;
}

pub struct GithubOAuth2Client {
    config: GitHubOAuth2Config,
    client: reqwest::Client,
}

impl GithubOAuth2Client {
    pub fn new(config: GitHubOAuth2Config) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    verified: bool,
    primary: bool,
}

#[async_trait]
impl OAuth2ProviderClient for GithubOAuth2Client {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = url::Url::parse(GITHUB_AUTHORIZE_URL).expect("static URL parses");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", "read:user user:email")
            .append_pair("state", state);
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuth2ProviderClientError> {
        let response: AccessTokenResponse = self
            .client
            .post(GITHUB_ACCESS_TOKEN_URL)
            .header(http::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        match response.access_token {
            Some(access_token) => Ok(access_token),
            None => Err(OAuth2ProviderClientError::External(
                response
                    .error_description
                    .unwrap_or_else(|| "code exchange failed".to_string()),
            )),
        }
    }

    async fn external_login(
        &self,
        access_token: &str,
    ) -> Result<ExternalLogin, OAuth2ProviderClientError> {
        let response = self
            .client
            .get(GITHUB_API_USER_URL)
            .bearer_auth(access_token)
            .header(http::header::ACCEPT, "application/vnd.github+json")
            .header(http::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(OAuth2ProviderClientError::External(format!(
                "identity lookup failed with status {}",
                response.status()
            )));
        }
        let user: GithubUser = response.json().await?;

        // The profile email can be unset or unverified; the emails endpoint
        // is authoritative. A failure there degrades to the profile email.
        let mut verified_emails = Vec::new();
        if let Ok(response) = self
            .client
            .get(GITHUB_API_EMAILS_URL)
            .bearer_auth(access_token)
            .header(http::header::ACCEPT, "application/vnd.github+json")
            .header(http::header::USER_AGENT, USER_AGENT)
            .send()
            .await
        {
            if response.status().is_success() {
                if let Ok(mut emails) = response.json::<Vec<GithubEmail>>().await {
                    emails.sort_by_key(|email| !email.primary);
                    verified_emails = emails
                        .into_iter()
                        .filter(|email| email.verified)
                        .map(|email| email.email)
                        .collect();
                }
            }
        }

        let email = verified_emails.first().cloned().or(user.email);
        Ok(ExternalLogin {
            external_id: user.id.to_string(),
            name: user.name.or(Some(user.login)),
            email,
            verified_emails,
        })
    }
}
