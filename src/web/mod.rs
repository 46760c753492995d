//! HTTP query API over the mirror store.
//!
//! Enabled with the `api` feature.

#[cfg(feature = "api")]
mod server;

#[cfg(feature = "api")]
pub use server::*;
