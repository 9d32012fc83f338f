//! # waypoint-cli
//!
//! Terminal front end for the waypoint agents: triage an email with
//! interactive review, chat with the content manager, inspect or cancel
//! persisted threads.

pub mod commands;
pub mod config;
pub mod logging;
pub mod review;
pub mod session;

pub use config::{ConfigLoader, WaypointConfig};
pub use session::Session;
