//! Core domain types for keyward.
//!
//! This crate provides the ULID-backed identifier types shared by the
//! account-linking library and the server.

pub mod id;

pub use id::{AccountId, ParseIdError, SessionId};
