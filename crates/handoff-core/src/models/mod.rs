//! Data models shared by both applications.
//!
//! - `AppId`: the two applications taking part in a handoff
//! - `TransferToken`: the one-time handoff value and its metadata
//! - `TokenPair`, `UserInfo`: responses from the authentication backends

pub mod app;
pub mod token;

pub use app::AppId;
pub use token::{TokenPair, TransferToken, UserInfo};
