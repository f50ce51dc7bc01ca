//! Session protocol and collaborator contracts for portcullis.
//!
//! This crate provides:
//! - Session claims (`SessionState`) and identity claims from the IdP
//! - Server-side records (`Session`, `User`, directory records)
//! - The redirect state protocol and the per-route handoff token
//! - Contracts for the storage service, the identity provider and the
//!   directory service, with an in-memory storage backend
//!
//! # Session model
//!
//! A session has two halves. The local artifact is a signed JWT held in a
//! cookie or header; it is a capability only. The server record lives in the
//! storage service and is authoritative: a local artifact whose id no longer
//! resolves to a server record is not a session.
//!
//! # Example
//!
//! ```
//! use portcullis_crypto::{Cipher, generate_key};
//! use portcullis_session::{build_redirect_state, parse_redirect_state};
//! use url::Url;
//!
//! let cookie_cipher = Cipher::new(&generate_key()).expect("32 byte key");
//! let target = Url::parse("https://app.example.com/").expect("valid url");
//!
//! let state = build_redirect_state(&cookie_cipher, &target).expect("build");
//! assert_eq!(parse_redirect_state(&cookie_cipher, &state).expect("parse"), target);
//! ```

pub mod claims;
pub mod databroker;
pub mod directory;
pub mod error;
pub mod oidc;
pub mod provider;
pub mod records;
pub mod redirect_state;
pub mod redirect_url;

// Re-export main types at crate root
pub use claims::{FlattenedClaims, IdentityClaims, SessionState};
pub use databroker::{DataBroker, InMemoryDataBroker, StoredRecord};
pub use directory::{DirectoryClient, DisabledDirectory};
pub use error::{
    DataBrokerError, DirectoryError, IdentityProviderError, RedirectUrlError, StateError,
};
pub use oidc::OidcConfig;
pub use provider::IdentityProvider;
pub use records::{
    DirectoryGroup, DirectoryUser, IdToken, OAuthToken, Record, Session, SessionView, User,
};
pub use redirect_state::{
    build_redirect_state, decrypt_handoff_token, encrypt_handoff_token, parse_redirect_state,
};
pub use redirect_url::{host_with_port, parse_and_validate_url};
