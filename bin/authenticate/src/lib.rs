//! portcullis authenticate service.
//!
//! This crate provides the HTTP front door that signs users in with an
//! OpenID Connect provider, persists sessions to the storage service and
//! hands per-route session tokens to the proxied applications.

pub mod app;
pub mod authenticate;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod oidc;
pub mod sessions;
pub mod signature;
pub mod state;
pub mod urls;

#[cfg(test)]
mod testing;
