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

use super::oauth2_provider_client::{OAuth2ProviderClient, OAuth2ProviderClientError};
use super::state_cache::OAuthStateCache;
use crate::auth::TokenAuthorisation;
use crate::model::{ExternalLogin, UnsafeToken, User};
use crate::repo::user::UserRepo;
use crate::service::token::{TokenService, TokenServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loco_common::repo::RepoError;
use loco_common::SafeDisplay;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// The distinguished exchange outcome: the external identity resolved to
    /// a verified email with no local user behind it. The OAuth endpoints
    /// catch it and provision.
    #[error("No user for verified email")]
    UserNotFound { email: String },
    #[error("No verified email from the OAuth provider for login {0}")]
    NoVerifiedEmail(String),
    #[error("Unknown or expired OAuth state")]
    UnknownState,
    #[error(transparent)]
    Provider(#[from] OAuth2ProviderClientError),
    #[error(transparent)]
    Token(Box<TokenServiceError>),
    #[error(transparent)]
    InternalRepoError(#[from] RepoError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TokenServiceError> for LoginError {
    fn from(value: TokenServiceError) -> Self {
        LoginError::Token(Box::new(value))
    }
}

impl SafeDisplay for LoginError {
    fn to_safe_string(&self) -> String {
        match self {
            LoginError::UserNotFound { .. } => "No user for verified email".to_string(),
            LoginError::NoVerifiedEmail(_) => self.to_string(),
            LoginError::UnknownState => self.to_string(),
            LoginError::Provider(inner) => inner.to_safe_string(),
            LoginError::Token(inner) => inner.to_safe_string(),
            LoginError::InternalRepoError(inner) => inner.to_safe_string(),
            LoginError::Internal(_) => "Internal error".to_string(),
        }
    }
}

/// The `Exchange` half of the TVM: external identity in, local user plus
/// first-party bearer token out.
#[async_trait]
pub trait LoginService: Send + Sync {
    /// Mints a one-time state and the provider authorization URL.
    async fn authorization_url(&self) -> Result<(String, String), LoginError>;

    /// Web flow: validates the one-time state, exchanges the code for a
    /// provider access token, then runs the token exchange.
    async fn exchange_code(
        &self,
        code: &str,
        state: &str,
    ) -> Result<(User, UnsafeToken), LoginError>;

    /// Headless flow: the caller already has a provider access token.
    async fn exchange_token(
        &self,
        access_token: &str,
    ) -> Result<(User, UnsafeToken), LoginError>;

    /// Session details for the bearer: the user and the token expiry.
    async fn details(
        &self,
        auth: &TokenAuthorisation,
    ) -> Result<(User, DateTime<Utc>), LoginError>;
}

pub struct LoginServiceDefault {
    client: Arc<dyn OAuth2ProviderClient>,
    user_repo: Arc<dyn UserRepo>,
    token_service: Arc<dyn TokenService>,
    state_cache: Arc<OAuthStateCache>,
}

impl LoginServiceDefault {
    pub fn new(
        client: Arc<dyn OAuth2ProviderClient>,
        user_repo: Arc<dyn UserRepo>,
        token_service: Arc<dyn TokenService>,
        state_cache: Arc<OAuthStateCache>,
    ) -> Self {
        Self {
            client,
            user_repo,
            token_service,
            state_cache,
        }
    }

    fn verified_email(external_login: &ExternalLogin) -> Result<String, LoginError> {
        external_login
            .verified_emails
            .first()
            .cloned()
            .or_else(|| external_login.email.clone())
            .ok_or_else(|| LoginError::NoVerifiedEmail(external_login.external_id.clone()))
    }

    /// Resolves the external identity to an existing user, or fails with the
    /// distinguished `UserNotFound`.
    async fn existing_user(
        &self,
        external_login: &ExternalLogin,
    ) -> Result<User, LoginError> {
        let email = Self::verified_email(external_login)?;
        match self.user_repo.get_by_email(&email).await? {
            Some(record) => Ok(record.into()),
            None => Err(LoginError::UserNotFound { email }),
        }
    }

    async fn provision(&self, external_login: &ExternalLogin) -> Result<User, LoginError> {
        let email = Self::verified_email(external_login)?;
        let name = external_login
            .name
            .clone()
            .unwrap_or_else(|| external_login.external_id.clone());
        info!(external_id = %external_login.external_id, "provisioning user on first login");
        let record = self
            .user_repo
            .create(&external_login.external_id, &email, &name, None)
            .await?;
        Ok(record.into())
    }

    async fn exchange(&self, access_token: &str) -> Result<(User, UnsafeToken), LoginError> {
        let external_login = self.client.external_login(access_token).await?;
        let user = match self.existing_user(&external_login).await {
            Ok(user) => user,
            Err(LoginError::UserNotFound { .. }) => self.provision(&external_login).await?,
            Err(other) => return Err(other),
        };
        let token = self.token_service.issue_login_token(user.id).await?;
        Ok((user, token))
    }
}

#[async_trait]
impl LoginService for LoginServiceDefault {
    async fn authorization_url(&self) -> Result<(String, String), LoginError> {
        let state = self.state_cache.generate();
        let url = self.client.authorization_url(&state);
        Ok((url, state))
    }

    async fn exchange_code(
        &self,
        code: &str,
        state: &str,
    ) -> Result<(User, UnsafeToken), LoginError> {
        if !self.state_cache.take(state) {
            return Err(LoginError::UnknownState);
        }
        let access_token = self.client.exchange_code(code).await?;
        self.exchange(&access_token).await
    }

    async fn exchange_token(
        &self,
        access_token: &str,
    ) -> Result<(User, UnsafeToken), LoginError> {
        self.exchange(access_token).await
    }

    async fn details(
        &self,
        auth: &TokenAuthorisation,
    ) -> Result<(User, DateTime<Utc>), LoginError> {
        let user_id = auth
            .user_id()
            .ok_or_else(|| LoginError::Internal("bearer is not a user token".to_string()))?;
        let record = self
            .user_repo
            .get(user_id.0)
            .await?
            .ok_or_else(|| LoginError::Internal("bearer user is gone".to_string()))?;
        Ok((record.into(), auth.token.expires_at))
    }
}
