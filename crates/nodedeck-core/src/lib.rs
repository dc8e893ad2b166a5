//! NodeDeck Core - Shared types, validation, configuration, and error handling

pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod validate;

pub use commands::*;
pub use config::*;
pub use constants::*;
pub use error::{Error, ErrorKind, Result};
pub use types::*;
