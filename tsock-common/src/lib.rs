// tsock-common - Shared types, errors and configuration for the tsock stream client
//
// This crate defines the error taxonomy and the settings shared by the client
// and its tooling.

pub mod config;
pub mod error;
pub mod types;

// Re-export for convenience
pub use config::*;
pub use error::*;
pub use types::*;
