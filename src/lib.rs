/// orgiam - member directory and identity service
///
/// Registers member accounts, authenticates them through Google OAuth or
/// long-lived bearer tokens, manages groups, and provisions approved accounts
/// in Google Workspace.

pub mod account;
pub mod api;
pub mod approval;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod providers;
pub mod server;
