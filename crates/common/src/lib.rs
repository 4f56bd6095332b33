//! Common types shared by the Bitbucket credential helper crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
