//! Terminal stand-ins for the browser page.

use handoff_core::auth::Action;
use handoff_core::browser::{AuthUi, Navigator};

/// Prints the target instead of leaving the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, url: &str) {
        println!("-> {}", url);
    }
}

#[derive(Debug, Default)]
pub struct ConsoleUi {
    loading: bool,
    actions: Vec<Action>,
}

impl ConsoleUi {
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

impl AuthUi for ConsoleUi {
    fn show_loading(&mut self) {
        if !self.loading {
            self.loading = true;
            eprintln!("Checking session...");
        }
    }

    fn hide_loading(&mut self) {
        self.loading = false;
    }

    fn show_authenticated(&mut self) {
        println!("Logged in");
    }

    fn show_unauthenticated(&mut self) {
        println!("Not logged in");
    }

    fn show_message(&mut self, message: &str) {
        println!("{}", message);
    }

    fn attach_action(&mut self, action: Action) {
        self.actions.push(action);
    }
}
