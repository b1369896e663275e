//! Client for the backend gateway that holds the session in an httpOnly
//! refresh cookie.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{check_response, ApiError, REQUEST_TIMEOUT_SECS};
use crate::auth::{AuthError, AuthMechanism, Credential, CredentialCache};
use crate::browser::Navigator;
use crate::clock::Clock;
use crate::models::{TokenPair, UserInfo};
use crate::monitor::RefreshEndpoint;
use crate::storage::Storage;

const REFRESH_PATH: &str = "ids/auth/refresh";
const LOGIN_PATH: &str = "ids/auth/login";
const LOGOUT_PATH: &str = "ids/auth/logout";
const WHOAMI_PATH: &str = "ids/me";

/// Status and body of an application API call, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Gateway client.
/// Clone is cheap and clones share the cookie jar.
#[derive(Clone, Debug)]
pub struct GatewayClient {
    client: Client,
    base_url: Url,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: parse_base(base_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Exchange the refresh cookie for fresh tokens.
    pub async fn refresh(&self) -> Result<TokenPair, ApiError> {
        let url = self.endpoint(REFRESH_PATH)?;
        debug!(%url, "Refreshing gateway session");

        let response = self.client.post(url).send().await?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("refresh: {}", e)))
    }

    /// Profile of the logged-in user.
    pub async fn whoami(&self, token: &str) -> Result<UserInfo, ApiError> {
        let url = self.endpoint(WHOAMI_PATH)?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("whoami: {}", e)))
    }

    /// Call an application API path with the bearer token. Error statuses
    /// are returned as a response, not an error, so they can be shown.
    pub async fn call_api(&self, path: &str, token: &str) -> Result<ApiResponse, ApiError> {
        let url = self.endpoint(path)?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }

    pub fn login_url(&self) -> Result<Url, ApiError> {
        self.endpoint(LOGIN_PATH)
    }

    pub fn logout_url(&self) -> Result<Url, ApiError> {
        self.endpoint(LOGOUT_PATH)
    }
}

impl RefreshEndpoint for GatewayClient {
    async fn refresh(&self) -> Result<TokenPair, ApiError> {
        GatewayClient::refresh(self).await
    }
}

/// Parse a base URL, making sure relative joins land under its path.
pub(crate) fn parse_base(base_url: &str) -> Result<Url, ApiError> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Authentication through the gateway's refresh cookie.
pub struct CookieRefreshMechanism<S, N, C> {
    client: GatewayClient,
    cache: CredentialCache<S>,
    navigator: N,
    clock: C,
}

impl<S: Storage, N: Navigator, C: Clock> CookieRefreshMechanism<S, N, C> {
    pub fn new(client: GatewayClient, cache: CredentialCache<S>, navigator: N, clock: C) -> Self {
        Self {
            client,
            cache,
            navigator,
            clock,
        }
    }

    pub fn client(&self) -> &GatewayClient {
        &self.client
    }
}

impl<S: Storage, N: Navigator, C: Clock> AuthMechanism for CookieRefreshMechanism<S, N, C> {
    fn cached_session(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.cache.load()?)
    }

    async fn silent_renew(&mut self) -> Result<Option<Credential>, AuthError> {
        match self.client.refresh().await {
            Ok(pair) => {
                let credential = Credential::from_pair(&pair, self.clock.now());
                self.cache.store(&credential)?;
                Ok(Some(credential))
            }
            Err(e) if e.is_transport() => Err(e.into()),
            Err(e) => {
                debug!(error = %e, "Gateway has no session");
                self.cache.clear()?;
                Ok(None)
            }
        }
    }

    async fn interactive_login(&mut self) -> Result<(), AuthError> {
        let url = self.client.login_url()?;
        info!("Redirecting to gateway login");
        self.navigator.navigate(url.as_str());
        Ok(())
    }

    async fn sign_out(&mut self) -> Result<(), AuthError> {
        if let Err(e) = self.cache.clear() {
            warn!(error = %e, "Failed to clear cached credential before logout");
        }
        let url = self.client.logout_url()?;
        self.navigator.navigate(url.as_str());
        Ok(())
    }

    fn clear_local(&mut self) -> Result<(), AuthError> {
        Ok(self.cache.clear()?)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        Ok(self.client.whoami(access_token).await?)
    }
}
