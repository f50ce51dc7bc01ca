//! Error handling foundation for portcullis.
//!
//! Each crate defines its own error enums. Calls that cross a collaborator
//! boundary (storage service, identity provider, directory) wrap those enums
//! in a rootcause `Report` so context survives as the error propagates.

use rootcause::Report;

/// A Result type alias over rootcause's `Report`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
