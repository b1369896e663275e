use super::{AuthError, Credential};
use crate::models::UserInfo;

/// An application's own way of establishing a session.
///
/// The identity-provider app and the cookie-gateway app each implement
/// this; the bootstrap and the lifecycle monitors only talk to the trait.
#[allow(async_fn_in_trait)]
pub trait AuthMechanism {
    /// Locally cached session, if any. Cheap; no network.
    fn cached_session(&self) -> Result<Option<Credential>, AuthError>;

    /// Non-interactive renewal. `Ok(None)` means the backend answered and
    /// there is no session; `Err` means the attempt itself failed.
    async fn silent_renew(&mut self) -> Result<Option<Credential>, AuthError>;

    /// Send the user to the interactive login page.
    async fn interactive_login(&mut self) -> Result<(), AuthError>;

    /// Clear local state and send the user to the logout page.
    async fn sign_out(&mut self) -> Result<(), AuthError>;

    /// Clear locally cached credential material without navigating.
    fn clear_local(&mut self) -> Result<(), AuthError>;

    /// Profile of the user the access token belongs to.
    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, AuthError>;
}
