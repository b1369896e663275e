use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two applications taking part in a handoff.
///
/// The wire identifiers are the fixed strings written to
/// `app_transfer_source`; they never change between releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AppId {
    /// Identity-provider backed application
    #[serde(rename = "aceas")]
    AppA,
    /// Cookie/refresh gateway backed application
    #[serde(rename = "cpds")]
    AppB,
}

impl AppId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppId::AppA => "aceas",
            AppId::AppB => "cpds",
        }
    }

    /// Parse a wire identifier. Also accepts the `app-a`/`app-b` aliases
    /// used on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "aceas" | "app-a" | "appa" | "a" => Some(AppId::AppA),
            "cpds" | "app-b" | "appb" | "b" => Some(AppId::AppB),
            _ => None,
        }
    }

    /// The other application. Tokens issued by `self` are only valid when
    /// consumed by `self.peer()`.
    pub fn peer(&self) -> Self {
        match self {
            AppId::AppA => AppId::AppB,
            AppId::AppB => AppId::AppA,
        }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
