//! Domain types shared across regkit.

pub mod address;
pub mod error;
pub mod manifest;

pub use address::Address;
pub use error::{RegkitError, Result};
pub use manifest::{Artifact, Manifest, SourceEntry};
