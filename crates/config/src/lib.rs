//! Configuration for Cloudinary-backed filesystems.
//!
//! A [`Config`] maps remote names to [`RemoteConfig`]s, loaded from a YAML,
//! TOML or JSON file layered under `CLDFS_`-prefixed environment variables.
//! Each remote also picks the [`Encoding`] its names are escaped with.

mod encoding;
pub mod error;
mod remote;

pub use crate::encoding::{DEFAULT_ENCODING, Encoding, EncodingRule};
pub use crate::remote::{Config, RemoteConfig};
