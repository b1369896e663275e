//! HTTP clients for the two authentication backends.
//!
//! - `GatewayClient` / `CookieRefreshMechanism`: the backend gateway that
//!   keeps the session in an httpOnly refresh cookie (App B)
//! - `OidcClient` / `OidcMechanism`: the OpenID Connect identity provider
//!   (App A)
//!
//! Both send bearer tokens as `Authorization: Bearer <token>` and map
//! non-success statuses through `ApiError::from_status`.

pub mod error;
pub mod gateway;
pub mod oidc;

pub use error::ApiError;
pub use gateway::{ApiResponse, CookieRefreshMechanism, GatewayClient};
pub use oidc::{OidcClient, OidcMechanism};

/// HTTP request timeout in seconds.
/// Refresh calls sit on the page-load path, so fail fast.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Check if response is successful, returning an error with body if not.
pub(crate) async fn check_response(
    response: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}
