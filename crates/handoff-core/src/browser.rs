//! The parts of the host page the authentication flow drives.
//!
//! A browser host implements these over `window.location` and the DOM; the
//! CLI implements them over stdout.

use crate::auth::Action;

/// Moves the page to another URL. Navigation is fire-and-forget: once
/// called, the current page is expected to go away.
pub trait Navigator {
    fn navigate(&self, url: &str);
}

impl<N: Navigator + ?Sized> Navigator for &N {
    fn navigate(&self, url: &str) {
        (**self).navigate(url)
    }
}

/// Visible authentication state of the page.
pub trait AuthUi {
    fn show_loading(&mut self);
    fn hide_loading(&mut self);
    fn show_authenticated(&mut self);
    /// Login action only.
    fn show_unauthenticated(&mut self);
    fn show_message(&mut self, message: &str);
    fn attach_action(&mut self, action: Action);
}
