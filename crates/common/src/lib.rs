//! Common types for the Canva autofill gateway

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
