//! Core types shared across the portcullis authenticate service.
//!
//! This crate provides the identifiers and the `Result` alias used by the
//! crypto, session and service crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SessionId, UserId};
