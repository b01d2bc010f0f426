//! keyward web server.
//!
//! Signs people in with GitHub or Google, links those identities to platform
//! accounts, and provisions accounts for GitHub organization members and
//! authorized Google Workspace domains.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
